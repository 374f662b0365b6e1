use std::{fs, path::Path, time::Duration};

use alloy_primitives::Address;
use anyhow::Context;
use client_core::StoreOptions;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub rpc_url: String,
    pub contract_address: String,
    pub read_timeout_ms: u64,
    pub fetch_concurrency: usize,
    pub accounts_method: String,
    pub auto_connect: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".into(),
            contract_address: "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512".into(),
            read_timeout_ms: 10_000,
            fetch_concurrency: 1,
            accounts_method: "eth_requestAccounts".into(),
            auto_connect: true,
        }
    }
}

impl Settings {
    pub fn contract(&self) -> anyhow::Result<Address> {
        self.contract_address
            .parse()
            .with_context(|| format!("invalid contract address '{}'", self.contract_address))
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            fetch_concurrency: self.fetch_concurrency.max(1),
        }
    }
}

pub fn load_settings(path: &Path) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        apply_file_overrides(&mut settings, &raw);
    }
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());

    settings
}

fn file_value(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(v) => Some(v.clone()),
        toml::Value::Integer(v) => Some(v.to_string()),
        toml::Value::Boolean(v) => Some(v.to_string()),
        _ => None,
    }
}

fn apply_file_overrides(settings: &mut Settings, raw: &str) {
    let Ok(file_cfg) = toml::from_str::<toml::Table>(raw) else {
        return;
    };
    let get = |key: &str| file_cfg.get(key).and_then(file_value);

    if let Some(v) = get("rpc_url") {
        settings.rpc_url = v;
    }
    if let Some(v) = get("contract_address") {
        settings.contract_address = v;
    }
    if let Some(v) = get("read_timeout_ms").and_then(|v| v.parse().ok()) {
        settings.read_timeout_ms = v;
    }
    if let Some(v) = get("fetch_concurrency").and_then(|v| v.parse().ok()) {
        settings.fetch_concurrency = v;
    }
    if let Some(v) = get("accounts_method") {
        settings.accounts_method = v;
    }
    if let Some(v) = get("auto_connect").and_then(|v| v.parse().ok()) {
        settings.auto_connect = v;
    }
}

fn apply_env_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("BOARD_RPC_URL") {
        settings.rpc_url = v;
    }
    if let Some(v) = lookup("APP__RPC_URL") {
        settings.rpc_url = v;
    }

    if let Some(v) = lookup("APP__CONTRACT_ADDRESS") {
        settings.contract_address = v;
    }

    if let Some(v) = lookup("APP__READ_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
        settings.read_timeout_ms = v;
    }
    if let Some(v) = lookup("APP__FETCH_CONCURRENCY").and_then(|v| v.parse().ok()) {
        settings.fetch_concurrency = v;
    }

    if let Some(v) = lookup("APP__ACCOUNTS_METHOD") {
        settings.accounts_method = v;
    }
    if let Some(v) = lookup("APP__AUTO_CONNECT").and_then(|v| v.parse().ok()) {
        settings.auto_connect = v;
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
