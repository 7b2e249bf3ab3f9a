//! Event definitions for the infectmoji protocol.
//!
//! Every WebSocket text frame carries one JSON object of the shape
//! `{"event": "<camelCaseName>", "data": <payload>}` in either direction.

mod client;
mod server;

pub use client::*;
pub use server::*;
