//! `TaskDesk`: multi-view task cache with optimistic mutation and rollback.
//!
//! - [`api`] — the remote task API boundary and its HTTP and in-memory
//!   implementations
//! - [`cache`] — the task entity cache and its list fetch coordinators
//! - [`optimistic`] — per-item optimistic status change and delete
//! - [`config`] — layered client configuration
//! - [`cli`] — command-line front end

pub mod api;
pub mod cache;
pub mod cli;
pub mod config;
pub mod optimistic;
