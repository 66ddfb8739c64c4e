//! In-memory blog metadata: the term graph, the post archive and the views
//! derived from them.
//!
//! Nothing here performs I/O. Callers serialize `sync`, `add_post` and
//! `remove_post` against one store; the watcher does so from a single task.

mod archive;
mod options;
mod store;
mod terms;

pub use archive::*;
pub use options::*;
pub use store::*;
pub use terms::*;
