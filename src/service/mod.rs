//! # Outbound Services
//!
//! Clients for the third-party services the login phase depends on.

pub mod session;

pub use session::{IdentityVerifier, SessionService};
