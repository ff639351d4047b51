use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use ethers::prelude::*;
use sponsored_userop::account::{self, Call};
use sponsored_userop::bundler::BundlerClient;
use sponsored_userop::config::{load_profile, NetworkProfile};
use sponsored_userop::encoding::{self, parse_bytes, parse_h256};
use sponsored_userop::gas::apply_fee_multiplier;
use sponsored_userop::hash::user_op_hash;
use sponsored_userop::paymaster::PaymasterClient;
use sponsored_userop::pipeline::{PipelineConfig, SponsoredPipeline};
use sponsored_userop::rpc::HttpTransport;
use sponsored_userop::signer::UserOpSigner;
use sponsored_userop::types::{
    HexUserOperation, UserOperationDraft, UserOperationHandle, UserOperationReceipt,
};
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

// In --json mode stdout carries a single JSON object; human-readable lines go to stderr.
macro_rules! outln {
    ($machine_mode:expr, $($arg:tt)*) => {{
        if $machine_mode {
            eprintln!($($arg)*);
        } else {
            println!($($arg)*);
        }
    }};
}

#[derive(Parser, Debug)]
#[command(name = "sponsored-userop", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the counterfactual smart account address (and deployment status).
    Account(AccountArgs),

    /// Build, sponsor, sign and send a UserOperation for one call.
    Send(SendArgs),

    /// Compute the userOpHash of a UserOperation JSON file offline.
    Hash(HashArgs),

    /// Resolve a userOpHash to the bundle transaction.
    Receipt(ReceiptArgs),
}

#[derive(Args, Debug)]
struct ProfileArgs {
    /// Network profile (chain id, RPC, EntryPoint, factory, gas buffers).
    #[arg(long, default_value = "deployments/sepolia.json")]
    profile: PathBuf,

    /// Override the chain RPC URL (otherwise uses the profile).
    #[arg(long, env = "SPONSORED_USEROP_RPC_URL")]
    rpc: Option<String>,
}

#[derive(Args, Debug)]
struct OwnerArgs {
    /// Smart account owner private key.
    ///
    /// Recommended: set via env var SPONSORED_USEROP_OWNER_PRIVATE_KEY.
    #[arg(long, env = "SPONSORED_USEROP_OWNER_PRIVATE_KEY", hide_env_values = true)]
    owner_private_key: String,

    /// CREATE2 salt for the smart account.
    #[arg(long, default_value_t = 0)]
    salt: u64,
}

#[derive(Args, Debug)]
struct AccountArgs {
    #[command(flatten)]
    profile: ProfileArgs,

    #[command(flatten)]
    owner: OwnerArgs,
}

#[derive(Args, Debug)]
struct SendArgs {
    #[command(flatten)]
    profile: ProfileArgs,

    #[command(flatten)]
    owner: OwnerArgs,

    /// Bundler RPC URL (must support ERC-4337 JSON-RPC methods).
    #[arg(long, env = "SPONSORED_USEROP_BUNDLER_URL")]
    bundler: Option<String>,

    /// Paymaster RPC URL (ERC-7677 paymaster web service).
    #[arg(long, env = "SPONSORED_USEROP_PAYMASTER_URL")]
    paymaster_url: Option<String>,

    /// Gas Manager policy id, forwarded in the paymaster context.
    #[arg(long, env = "SPONSORED_USEROP_POLICY_ID")]
    policy_id: Option<String>,

    /// Optional webhookData to include in paymaster requests.
    #[arg(long, env = "SPONSORED_USEROP_WEBHOOK_DATA")]
    webhook_data: Option<String>,

    /// Call target.
    #[arg(long)]
    to: String,

    /// Call data for the target (0x-prefixed hex).
    #[arg(long, default_value = "0x")]
    data: String,

    /// Wei forwarded with the call (decimal).
    #[arg(long, default_value = "0")]
    value: String,

    /// Gas price multiplier in basis points (e.g. 15000 = 1.5x).
    ///
    /// Applied to maxFeePerGas and maxPriorityFeePerGas.
    #[arg(long, default_value_t = 10000, env = "SPONSORED_USEROP_GAS_MULTIPLIER_BPS")]
    gas_multiplier_bps: u64,

    /// Do not send the UserOperation; only build, sponsor and sign it.
    #[arg(long)]
    dry_run: bool,

    /// Do not wait for the userOp receipt.
    #[arg(long)]
    no_wait: bool,

    /// Max seconds to wait for userOp receipt. Use 0 to disable timeout.
    #[arg(long, default_value_t = 180)]
    max_wait_seconds: u64,

    /// Print a single JSON object to stdout; all other output goes to stderr.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Args, Debug)]
struct HashArgs {
    #[command(flatten)]
    profile: ProfileArgs,

    /// UserOperation JSON (RPC shape, hex fields).
    #[arg(long)]
    op: PathBuf,
}

#[derive(Args, Debug)]
struct ReceiptArgs {
    #[command(flatten)]
    profile: ProfileArgs,

    /// Bundler RPC URL (must support ERC-4337 JSON-RPC methods).
    #[arg(long, env = "SPONSORED_USEROP_BUNDLER_URL")]
    bundler: Option<String>,

    /// userOpHash returned by eth_sendUserOperation.
    #[arg(long)]
    user_op_hash: String,

    /// Max seconds to wait for userOp receipt. Use 0 to disable timeout.
    #[arg(long, default_value_t = 180)]
    max_wait_seconds: u64,

    /// Seconds between receipt polls.
    #[arg(long, default_value_t = 2)]
    poll_seconds: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        // Always write logs to stderr so stdout can be used for script-friendly outputs.
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Command::Account(args) => cmd_account(args).await,
        Command::Send(args) => cmd_send(args).await,
        Command::Hash(args) => cmd_hash(args),
        Command::Receipt(args) => cmd_receipt(args).await,
    }
}

async fn connect(profile: &NetworkProfile) -> Result<Provider<Http>> {
    let provider = Provider::<Http>::try_from(profile.rpc_url.as_str())?
        .interval(Duration::from_millis(350));

    let chain_id = provider.get_chainid().await?.as_u64();
    if chain_id != profile.chain_id {
        return Err(anyhow!(
            "chainId mismatch: profile has {}, RPC returned {}",
            profile.chain_id,
            chain_id
        ));
    }
    Ok(provider)
}

fn load_owner(args: &OwnerArgs, chain_id: u64) -> Result<LocalWallet> {
    let wallet = LocalWallet::from_str(&args.owner_private_key)
        .context("invalid owner private key")?
        .with_chain_id(chain_id);
    Ok(wallet)
}

fn wait_timeout(max_wait_seconds: u64) -> Duration {
    if max_wait_seconds == 0 {
        Duration::MAX
    } else {
        Duration::from_secs(max_wait_seconds)
    }
}

fn require_url(flag: Option<String>, profile: &Option<String>, what: &str) -> Result<String> {
    flag.or_else(|| profile.clone()).ok_or_else(|| {
        anyhow!("missing {what} URL (pass the flag, set the env var, or add it to the profile)")
    })
}

async fn cmd_account(args: AccountArgs) -> Result<()> {
    let profile = load_profile(&args.profile.profile, args.profile.rpc.clone())?;
    let provider = connect(&profile).await?;
    let wallet = load_owner(&args.owner, profile.chain_id)?;
    let owner = Signer::address(&wallet);

    let client = Arc::new(provider);
    let (smart_account, deployed) = account::compute_account_address(
        client,
        profile.factory,
        owner,
        U256::from(args.owner.salt),
    )
    .await?;

    println!("chainId:        {}", profile.chain_id);
    println!("entryPoint:     {}", profile.entry_point);
    println!("factory:        {}", profile.factory);
    println!("owner:          {}", owner);
    println!("smartAccount:   {}", smart_account);
    println!("isDeployed:     {}", deployed);

    Ok(())
}

async fn cmd_send(args: SendArgs) -> Result<()> {
    let machine_mode = args.json;
    let profile = load_profile(&args.profile.profile, args.profile.rpc.clone())?;
    let provider = connect(&profile).await?;
    let wallet = load_owner(&args.owner, profile.chain_id)?;
    let owner = Signer::address(&wallet);
    let client = Arc::new(provider.clone());

    let salt = U256::from(args.owner.salt);
    let (smart_account, deployed) =
        account::compute_account_address(client.clone(), profile.factory, owner, salt).await?;
    outln!(
        machine_mode,
        "smartAccount: {} (deployed={})",
        smart_account,
        deployed
    );

    let call = Call {
        to: Address::from_str(&args.to).context("invalid --to address")?,
        value: U256::from_dec_str(&args.value)
            .with_context(|| format!("invalid --value (expected integer): {}", args.value))?,
        data: parse_bytes("--data", &args.data)?,
    };

    let nonce = account::fetch_nonce(client.clone(), profile.entry_point, smart_account).await?;
    let init_code = account::build_init_code(profile.factory, owner, salt, deployed)?;

    // Fee data (fallback to gas price for providers without EIP-1559 helpers).
    let gas_price = provider
        .get_gas_price()
        .await
        .context("failed to fetch gas price")?;
    let max_fee_per_gas = apply_fee_multiplier(gas_price, args.gas_multiplier_bps);
    let max_priority_fee_per_gas = max_fee_per_gas;
    if args.gas_multiplier_bps != 10_000 {
        tracing::info!(
            "gas multiplier applied: {} bps (maxFeePerGas={}, maxPriorityFeePerGas={})",
            args.gas_multiplier_bps,
            max_fee_per_gas,
            max_priority_fee_per_gas
        );
    }

    let request = account::build_request(
        smart_account,
        nonce,
        init_code,
        &call,
        max_fee_per_gas,
        max_priority_fee_per_gas,
    )?;

    let bundler_url = require_url(args.bundler.clone(), &profile.bundler_url, "bundler")?;
    let paymaster_url = require_url(args.paymaster_url.clone(), &profile.paymaster_url, "paymaster")?;

    let bundler = BundlerClient::new(
        HttpTransport::new(bundler_url, profile.rpc_timeout)?,
        profile.entry_point,
        profile.rpc_timeout,
    );
    let paymaster = PaymasterClient::new(
        HttpTransport::new(paymaster_url, profile.rpc_timeout)?,
        profile.entry_point,
        profile.chain_id,
        profile.rpc_timeout,
    )
    .with_policy(
        args.policy_id.clone().or_else(|| profile.policy_id.clone()),
        args.webhook_data.clone(),
    );

    let signer: &dyn UserOpSigner = &wallet;
    let pipeline = SponsoredPipeline::new(
        PipelineConfig {
            gas_buffers: profile.gas_buffers,
            receipt_poll_interval: Duration::from_millis(1500),
        },
        &paymaster,
        &bundler,
        signer,
    )?;

    let signed = pipeline.build(&request).await?;
    let op_json = HexUserOperation::from(signed.operation());
    outln!(
        machine_mode,
        "\nUserOperation (final):\n{}",
        serde_json::to_string_pretty(&op_json)?
    );

    if args.dry_run {
        outln!(machine_mode, "\n--dry-run set: not sending user operation.");
        if machine_mode {
            print_json(&smart_account, &op_json, None, None)?;
        }
        return Ok(());
    }

    let handle = pipeline.submit(&signed).await?;
    outln!(machine_mode, "\nuserOpHash: {}", handle);

    if args.no_wait {
        outln!(machine_mode, "--no-wait set: not waiting for receipt.");
        if machine_mode {
            print_json(&smart_account, &op_json, Some(handle), None)?;
        }
        return Ok(());
    }

    let receipt = pipeline
        .wait_for_transaction(handle, wait_timeout(args.max_wait_seconds))
        .await
        .context("failed waiting for userOp receipt")?;

    print_receipt(machine_mode, &receipt);
    if machine_mode {
        print_json(&smart_account, &op_json, Some(handle), Some(&receipt))?;
    }

    Ok(())
}

fn cmd_hash(args: HashArgs) -> Result<()> {
    let profile = load_profile(&args.profile.profile, args.profile.rpc.clone())?;
    let raw = fs::read_to_string(&args.op)
        .with_context(|| format!("failed to read {}", args.op.display()))?;
    let wire: HexUserOperation = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", args.op.display()))?;

    let op = UserOperationDraft::try_from(&wire)?.complete()?;
    let hash = user_op_hash(&op, profile.entry_point, profile.chain_id);
    println!("{}", encoding::fmt_h256(hash));
    Ok(())
}

async fn cmd_receipt(args: ReceiptArgs) -> Result<()> {
    let profile = load_profile(&args.profile.profile, args.profile.rpc.clone())?;
    let bundler_url = require_url(args.bundler.clone(), &profile.bundler_url, "bundler")?;
    let bundler = BundlerClient::new(
        HttpTransport::new(bundler_url, profile.rpc_timeout)?,
        profile.entry_point,
        profile.rpc_timeout,
    );

    let handle = UserOperationHandle(parse_h256("--user-op-hash", &args.user_op_hash)?);
    let receipt = bundler
        .wait_for_transaction(
            handle,
            wait_timeout(args.max_wait_seconds),
            Duration::from_secs(args.poll_seconds.max(1)),
        )
        .await?;

    print_receipt(false, &receipt);
    Ok(())
}

fn print_receipt(machine_mode: bool, receipt: &UserOperationReceipt) {
    outln!(
        machine_mode,
        "\ntransactionHash: {}",
        encoding::fmt_h256(receipt.transaction_hash)
    );
    outln!(machine_mode, "success:         {}", receipt.success);
    if let Some(cost) = receipt.actual_gas_cost {
        outln!(machine_mode, "actualGasCost:   {}", cost);
    }
}

fn print_json(
    smart_account: &Address,
    op: &HexUserOperation,
    handle: Option<UserOperationHandle>,
    receipt: Option<&UserOperationReceipt>,
) -> Result<()> {
    let out = serde_json::json!({
        "smartAccount": encoding::fmt_address(*smart_account),
        "userOperation": op,
        "userOpHash": handle.map(|h| h.to_string()),
        "transactionHash": receipt.map(|r| encoding::fmt_h256(r.transaction_hash)),
        "success": receipt.map(|r| r.success),
    });
    println!("{}", out);
    Ok(())
}
