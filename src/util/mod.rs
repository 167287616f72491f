//! Helpers shared by the backends.

pub mod path;
