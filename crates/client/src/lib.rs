//! Synchronous client for the arm simulation server.

pub mod sync_client;

pub use sync_client::{SyncSimClient, connect_local, connect_remote};
