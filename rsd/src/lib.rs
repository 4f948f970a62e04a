//! `ReadySetDone` client library.
//!
//! Provides the daemon connection, the client side of publish/subscribe,
//! the task API backends, and the command, sorting and rendering logic
//! used by the `rsd` binary.

pub mod api;
pub mod app;
pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod pubsub;
pub mod render;
pub mod sorting;
