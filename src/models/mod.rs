//! Data models shared by the loader, the metadata core and the watcher.

mod archive;
mod attachment;
mod blog;
mod post;
mod term;
mod user;

pub use archive::*;
pub use attachment::*;
pub use blog::*;
pub use post::*;
pub use term::*;
pub use user::*;
