//! Local accounting of active coding time. Activity signals from an editor keep a session alive;
//! every non idle tick adds time to the current project, day and file type, and the totals are
//! kept in a small JSON file.
//!

pub mod cli;
pub mod host;
pub mod tracker;
pub mod utils;
