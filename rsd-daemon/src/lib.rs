//! `ReadySetDone` daemon library.
//!
//! Exposes the stores, task service, RPC dispatcher and WebSocket server for
//! use by the `rsdd` binary, by the `rsd` client's local backend, and in
//! tests.

pub mod config;
pub mod context;
pub mod fs;
pub mod pubsub;
pub mod rpc;
pub mod server;
pub mod service;
pub mod store;
