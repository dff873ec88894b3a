//! Long-running helpers of the command-line front end.

pub mod watcher;
