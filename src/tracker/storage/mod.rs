//! Storage is organized around [stats_store::StatsStore].
//! The basic idea is:
//!  - The whole history is one structure: project -> day -> total time and time per extension.
//!  - Memory is authoritative, the backend is overwritten with the full structure on persist.
//!  - Writes happen in [persistence::PersistenceModule], away from the ticking loop.

pub mod backend;
pub mod entities;
pub mod persistence;
pub mod stats_store;
