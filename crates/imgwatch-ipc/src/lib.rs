//! imgwatch IPC Protocol and Client/Server
//!
//! This crate provides the request/response protocol and the TCP
//! client/server used to query the imgwatch daemon's image index.

mod client;
mod error;
mod protocol;
mod server;

pub use client::IpcClient;
pub use error::IpcError;
pub use protocol::*;
pub use server::{IpcServer, RequestHandler};
