//! HTTP surface and configuration for the conveyor service.
//!
//! The request layer is a thin shell over the queue crate: admission
//! endpoints delegate to the gateway, inspection endpoints read the durable
//! schema, and the demo callback receiver closes the loop for self-testing.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod server;
pub mod state;

pub use config::Config;
pub use server::{router, serve};
pub use state::AppState;
