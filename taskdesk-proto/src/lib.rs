//! Shared wire-level definitions for `TaskDesk`.
//!
//! Everything here is pure data: the task model, canonical identity,
//! response-envelope unwrapping and query parameters. No I/O.

pub mod counts;
pub mod envelope;
pub mod identity;
pub mod query;
pub mod task;
