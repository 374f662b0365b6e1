use std::{path::PathBuf, sync::Arc};

use alloy_primitives::Address;
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use client_core::{cards, ConnectOutcome, RecordCard, SortState, TheoremStore};
use ledger_integration::{
    EvmRecordSource, IdentityProvider, RpcIdentityProvider, StaticIdentityProvider,
};
use shared::domain::{Account, SortKey};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SortArg {
    Expiration,
    Reward,
}

impl From<SortArg> for SortKey {
    fn from(value: SortArg) -> Self {
        match value {
            SortArg::Expiration => SortKey::Expiration,
            SortArg::Reward => SortKey::Reward,
        }
    }
}

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value = "board.toml")]
    config: PathBuf,
    #[arg(long)]
    rpc_url: Option<String>,
    #[arg(long)]
    contract: Option<String>,
    /// Use this account instead of asking the node for one.
    #[arg(long)]
    account: Option<String>,
    #[arg(long, value_enum, default_value_t = SortArg::Expiration)]
    sort: SortArg,
    #[arg(long)]
    descending: bool,
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let args = Args::parse();

    let mut settings = config::load_settings(&args.config);
    if let Some(rpc_url) = args.rpc_url {
        settings.rpc_url = rpc_url;
    }
    if let Some(contract) = args.contract {
        settings.contract_address = contract;
    }

    let source = EvmRecordSource::new(&settings.rpc_url, settings.contract()?)?;
    let identity: Arc<dyn IdentityProvider> = match args.account {
        Some(raw) => {
            let address: Address = raw
                .parse()
                .with_context(|| format!("invalid account '{raw}'"))?;
            Arc::new(StaticIdentityProvider::new(Some(Account(address))))
        }
        None => Arc::new(RpcIdentityProvider::new(
            &settings.rpc_url,
            settings.accounts_method.clone(),
        )?),
    };
    let store = TheoremStore::new_with_dependencies(
        Arc::new(source),
        identity,
        settings.store_options(),
    );
    info!(
        "board: starting rpc_url={} contract={}",
        settings.rpc_url, settings.contract_address
    );

    if settings.auto_connect {
        match store.connect().await {
            ConnectOutcome::Connected(account) => println!("Connected as {account}"),
            ConnectOutcome::Cancelled => println!("Connection request was declined."),
            ConnectOutcome::Failed(reason) => warn!("board: connect failed error={reason}"),
        }
    }
    if !store.sync_state().await.is_synced() {
        if let Err(err) = store.refresh().await {
            warn!(
                "board: initial refresh failed code={:?} error={err}",
                err.code()
            );
        }
    }

    let Some(snapshot) = store.snapshot().await else {
        println!("No theorems loaded. Check that the node is reachable and retry.");
        return Ok(());
    };

    let sort = SortState::new(args.sort.into(), !args.descending);
    let rows = cards(&snapshot, sort);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!(
        "[{}] [{}]",
        sort.label(SortKey::Expiration),
        sort.label(SortKey::Reward)
    );
    if rows.is_empty() {
        println!("No theorems to show.");
    }
    for card in &rows {
        print_card(card);
    }

    Ok(())
}

fn print_card(card: &RecordCard) {
    let expires = card
        .expires_on
        .map(|date| date.to_string())
        .unwrap_or_else(|| "none".to_string());
    println!("{}", card.heading);
    println!(
        "  Creator: {}  Reward: {} ETH  Expires: {}",
        card.creator, card.reward, expires
    );
}
