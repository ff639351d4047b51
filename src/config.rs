use crate::gas::GasBuffers;
use anyhow::{anyhow, Context, Result};
use ethers::types::Address;
use serde::Deserialize;
use std::{env, fs, path::Path, time::Duration};

const DEFAULT_RPC_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkProfileRaw {
    pub chain_id: u64,
    pub rpc: String,
    #[serde(default)]
    pub rpc_env_var: Option<String>,
    pub entry_point: String,
    pub factory: String,

    #[serde(default)]
    pub bundler_url: Option<String>,
    #[serde(default)]
    pub paymaster_url: Option<String>,
    #[serde(default)]
    pub policy_id: Option<String>,

    #[serde(default)]
    pub gas_buffers: Option<GasBuffersRaw>,
    #[serde(default)]
    pub rpc_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasBuffersRaw {
    pub pre_verification_gas: u64,
    pub verification_gas_limit: u64,
}

/// Everything the pipeline needs to know about one target network.
#[derive(Debug, Clone)]
pub struct NetworkProfile {
    pub chain_id: u64,
    pub rpc_url: String,
    pub entry_point: Address,
    pub factory: Address,
    pub bundler_url: Option<String>,
    pub paymaster_url: Option<String>,
    pub policy_id: Option<String>,
    pub gas_buffers: GasBuffers,
    pub rpc_timeout: Duration,
}

pub fn load_profile(path: &Path, rpc_override: Option<String>) -> Result<NetworkProfile> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read network profile at {}", path.display()))?;
    parse_profile(&raw, rpc_override)
        .with_context(|| format!("invalid network profile at {}", path.display()))
}

pub fn parse_profile(json: &str, rpc_override: Option<String>) -> Result<NetworkProfile> {
    let raw: NetworkProfileRaw =
        serde_json::from_str(json).context("failed to parse network profile json")?;

    let rpc_url = if let Some(rpc) = rpc_override {
        rpc
    } else if let Some(env_var) = raw.rpc_env_var.clone() {
        env::var(&env_var).unwrap_or(raw.rpc.clone())
    } else {
        raw.rpc.clone()
    };

    let entry_point = parse_addr(&raw.entry_point).context("invalid entryPoint address")?;
    let factory = parse_addr(&raw.factory).context("invalid factory address")?;

    let gas_buffers = raw
        .gas_buffers
        .map(|b| GasBuffers::new(b.pre_verification_gas, b.verification_gas_limit))
        .unwrap_or_default();

    let rpc_timeout = Duration::from_secs(
        raw.rpc_timeout_seconds
            .unwrap_or(DEFAULT_RPC_TIMEOUT_SECS)
            .max(1),
    );

    Ok(NetworkProfile {
        chain_id: raw.chain_id,
        rpc_url,
        entry_point,
        factory,
        bundler_url: raw.bundler_url,
        paymaster_url: raw.paymaster_url,
        policy_id: raw.policy_id,
        gas_buffers,
        rpc_timeout,
    })
}

fn parse_addr(s: &str) -> Result<Address> {
    s.parse::<Address>().map_err(|e| anyhow!("{e}"))
}
