// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::Result;
use fabstir_staking_node::{
    CredentialIndexLedger, HostIdentity, HostWalletStatus, KeystoreStore, MnemonicKeySource,
    NodeConfig,
};
use std::env;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize tracing subscriber for logging
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    println!("🚀 Starting Fabstir Staking Node (credential custody core)...\n");

    let config = NodeConfig::from_env()?;
    std::fs::create_dir_all(&config.data_dir)?;
    println!("🌐 Network: {} (chain id {})", config.network.name, config.network.chain_id);
    println!("📁 Data directory: {}", config.data_dir.display());

    // Host wallet status: degraded states are reported, never fatal
    let host_source = env::var("HOST_MNEMONIC")
        .ok()
        .map(|phrase| MnemonicKeySource::new(&phrase));
    let host = HostIdentity::new(&config.data_dir);
    let derived = match &host_source {
        Some(source) => Some(source.address_at(0)?),
        None => None,
    };
    match host.status(derived)? {
        HostWalletStatus::Ready { address } => {
            println!("✅ Host wallet ready: {:?}", address);
        }
        HostWalletStatus::ReadOnly { stored, derived } => {
            println!(
                "⚠️  Host wallet in READ-ONLY mode: stored {:?}, derived {:?}",
                stored, derived
            );
        }
        HostWalletStatus::Locked => {
            println!("🔒 Host wallet locked: no mnemonic loaded (cannot sign)");
        }
    }

    // Custody inventory
    let ledger = CredentialIndexLedger::open(&config.ledger_path)?;
    println!("📒 Next account index: {}", ledger.next_account_index());
    println!(
        "📒 Last published commitment version: {}",
        ledger.last_published_commitment_version()
    );

    match KeystoreStore::open(&config.keystore_dir) {
        Ok(store) => {
            let count = store.list_stored_public_keys()?.count();
            println!("🔑 Encrypted validator keys on disk: {}", count);
        }
        Err(e) if e.is_degraded_state() => {
            println!("🔒 Keystore locked: {}", e);
        }
        Err(e) => return Err(e.into()),
    }

    println!("\n✅ Custody core ready. Waiting for shutdown signal (ctrl-c)...");
    signal::ctrl_c().await?;
    println!("👋 Shutting down");
    Ok(())
}
