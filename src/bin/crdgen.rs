//! Print the KeychainSecret CustomResourceDefinition as YAML
//!
//! ```sh
//! cargo run --bin crdgen > config/crd/keychainsecret.yaml
//! ```

use anyhow::{Context, Result};
use keychain_secret_controller::KeychainSecret;
use kube::CustomResourceExt;

fn main() -> Result<()> {
    let yaml = serde_yaml::to_string(&KeychainSecret::crd()).context("Failed to serialize CRD")?;
    print!("{yaml}");
    Ok(())
}
