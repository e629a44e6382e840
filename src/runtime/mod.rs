//! # Runtime Module
//!
//! Runtime components for the Keychain Secret Controller: initialization,
//! the watch loop, its error policy and the metrics/probe server.

pub mod error_policy;
pub mod initialization;
pub mod server;
pub mod watch_loop;

pub use error_policy::*;
pub use initialization::*;
pub use watch_loop::*;
