//! CLI surface.

pub mod args;

pub use args::{AskArgs, Cli, Command, IndexArgs, SessionAction};
