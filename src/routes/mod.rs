//! Router Module Index
//!
//! Splits the routing table by access level so the authentication layer is
//! applied to whole modules rather than individual handlers.

/// Routes open to anonymous clients (read-only).
pub mod public;

/// Routes behind the HTTP Basic authentication layer (all mutations).
pub mod authenticated;
