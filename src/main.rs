//! # Keychain Secret Controller
//!
//! Entry point. See the library crate for how reconciliation works.

use anyhow::Result;
use keychain_secret_controller::runtime::initialization::initialize;
use keychain_secret_controller::runtime::watch_loop::run_watch_loop;

#[tokio::main]
async fn main() -> Result<()> {
    let init_result = initialize().await?;

    run_watch_loop(
        init_result.client,
        init_result.reconciler,
        init_result.server_state,
    )
    .await;

    Ok(())
}
