//! # Transport
//!
//! TCP accept loop and the per-connection I/O task.
//!
//! The accept loop hands each socket to [`connection::handle_connection`],
//! which answers a legacy ping directly or splits the stream into a frame
//! reader and a frame writer. Everything above the frame layer happens in the
//! tick context; these tasks only move bytes and apply the pipeline changes
//! they are told about.

pub mod connection;
pub mod tcp;

pub use tcp::{start_server, start_server_with_shutdown};
