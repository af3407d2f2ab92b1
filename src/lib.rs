//! Chat relay server.
//!
//! Clients speak a length-prefixed JSON protocol over TCP: they
//! authenticate, exchange direct messages, join groups (`#name`) and
//! public rooms (`&name`), and receive live roster updates. The server
//! keeps a directory of online sessions, mediates social-graph changes
//! against SQLite, and fans messages out to the right live connections.

pub mod config;
pub mod connection;
pub mod crypto;
pub mod directory;
pub mod frame;
pub mod proto;
pub mod routing;
pub mod server;
pub mod store;
