//! wplive: live, in-memory view of a WordPress blog's metadata.
//!
//! The [`metadata`] core keeps the term graph, the post archive and derived
//! views; [`db`] loads them from MySQL (or SQLite); [`watcher`] polls for
//! changes and reports them as events.

pub mod config;
pub mod db;
pub mod errors;
pub mod metadata;
pub mod models;
pub mod watcher;
