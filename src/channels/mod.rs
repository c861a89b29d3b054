//! Channel backends.
//!
//! - [`talk`]: production backend against the talkgadget gateway
//! - [`dev`]: command-polling backend for the local development server

pub mod dev;
pub mod talk;

/// Join a path prefix and a leaf with exactly one `/` between them
pub(crate) fn join_path(base: &str, leaf: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), leaf)
}
