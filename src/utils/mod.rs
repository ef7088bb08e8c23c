//! Small helpers shared across the envelope types.

pub mod time;
