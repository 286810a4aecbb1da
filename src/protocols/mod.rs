//! Protocol implementations.
//!
//! - `counter`: shared counter with broadcast updates

pub mod counter;
