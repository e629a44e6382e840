//! # Keychain Secret Controller
//!
//! A Kubernetes controller that materializes Keychain secrets into Kubernetes
//! Secrets and keeps them fresh.
//!
//! ## Overview
//!
//! For every `KeychainSecret` resource the controller:
//!
//! 1. **Provisions an identity** - one certificate per namespace, created by a
//!    templated command and stored in the controller namespace
//! 2. **Fetches the secret** - runs a templated command authenticated by that
//!    identity and captures its output
//! 3. **Materializes it** - writes the output to a Secret next to the
//!    `KeychainSecret`, keyed by the Keychain secret name
//! 4. **Rotates it** - re-fetches once `ttl` has elapsed since the last fetch
//!
//! Both commands come from configuration (`GENERATE_CERT_COMMAND`,
//! `GET_SECRET_COMMAND`), see [`config`].

pub mod command;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod runtime;
pub mod store;

pub use crd::*;
