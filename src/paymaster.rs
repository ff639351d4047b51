use crate::encoding::{self, parse_bytes};
use crate::error::{Error, Result};
use crate::rpc::{with_deadline, RpcError, RpcTransport};
use crate::types::{
    BufferedOperation, HexUserOperation, SponsoredOperation, UserOperation, UserOperationDraft,
};
use ethers::types::{Address, Bytes, U256};
use serde_json::Value;
use std::time::Duration;

/// Minimal ERC-7677 paymaster web service client.
///
/// Implements `pm_getPaymasterStubData` (placeholder data so gas estimation accounts for
/// paymaster verification) and `pm_getPaymasterData` (the real sponsorship).
#[derive(Debug, Clone)]
pub struct PaymasterClient<T> {
    transport: T,
    entry_point: Address,
    chain_id: u64,
    policy_id: Option<String>,
    webhook_data: Option<String>,
    timeout: Duration,
}

impl<T: RpcTransport> PaymasterClient<T> {
    pub fn new(transport: T, entry_point: Address, chain_id: u64, timeout: Duration) -> Self {
        Self {
            transport,
            entry_point,
            chain_id,
            policy_id: None,
            webhook_data: None,
            timeout,
        }
    }

    pub fn entry_point(&self) -> Address {
        self.entry_point
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn with_policy(mut self, policy_id: Option<String>, webhook_data: Option<String>) -> Self {
        self.policy_id = policy_id;
        self.webhook_data = webhook_data;
        self
    }

    /// Stub `paymasterAndData` for estimation only. Never sign over it.
    pub async fn get_paymaster_stub_data(&self, draft: &UserOperationDraft) -> Result<Bytes> {
        let res = self
            .rpc("pm_getPaymasterStubData", HexUserOperation::from(draft))
            .await?;
        parse_v06_paymaster_and_data(&res)
    }

    /// Asks the paymaster to sponsor the exact, already-buffered gas values and attaches
    /// the returned `paymasterAndData` verbatim.
    pub async fn sponsor(&self, op: BufferedOperation) -> Result<SponsoredOperation> {
        let mut op: UserOperation = op.0.complete()?;
        op.paymaster_and_data = Bytes::new();
        op.signature = Bytes::new();

        tracing::info!(
            sender = %encoding::fmt_address(op.sender),
            verification_gas_limit = %op.verification_gas_limit,
            pre_verification_gas = %op.pre_verification_gas,
            "requesting paymaster sponsorship (pm_getPaymasterData)"
        );

        let res = self
            .rpc("pm_getPaymasterData", HexUserOperation::from(&op))
            .await?;
        op.paymaster_and_data = parse_v06_paymaster_and_data(&res)?;

        Ok(SponsoredOperation(op))
    }

    async fn rpc(&self, method: &str, user_op: HexUserOperation) -> Result<Value> {
        let params = build_params(
            user_op,
            self.entry_point,
            self.chain_id,
            self.policy_id.as_deref(),
            self.webhook_data.as_deref(),
        );

        with_deadline(method, self.timeout, self.transport.request(method, params))
            .await
            .map_err(|e| match e {
                RpcError::Response { code, message } => {
                    Error::SponsorshipDenied(format!("{method}: {message} (code {code})"))
                }
                RpcError::Transport(msg) => Error::TransportFailure(format!("{method}: {msg}")),
            })
    }
}

#[cfg(test)]
impl PaymasterClient<crate::testing::FakeTransport> {
    pub(crate) fn transport_calls(&self, method: &str) -> Vec<Value> {
        self.transport.calls_to(method)
    }
}

fn build_params(
    user_op: HexUserOperation,
    entry_point: Address,
    chain_id: u64,
    policy_id: Option<&str>,
    webhook_data: Option<&str>,
) -> Value {
    let mut ctx = serde_json::Map::new();
    if let Some(pid) = policy_id {
        ctx.insert("policyId".to_string(), Value::String(pid.to_string()));
    }
    if let Some(wd) = webhook_data {
        // context is free-form; Alchemy Gas Manager expects `webhookData`.
        ctx.insert("webhookData".to_string(), Value::String(wd.to_string()));
    }

    serde_json::json!([
        user_op,
        encoding::fmt_address(entry_point),
        encoding::fmt_u256(U256::from(chain_id)),
        Value::Object(ctx)
    ])
}

fn parse_v06_paymaster_and_data(result: &Value) -> Result<Bytes> {
    // ERC-7677 puts v0.6 data at the top level:
    //   { "paymasterAndData": "0x..." }
    // Alchemy currently returns a wrapped object:
    //   { "entrypointV06Response": { "paymasterAndData": "0x..." }, "entrypointV07Response": { ... } }
    let s = result
        .get("paymasterAndData")
        .or_else(|| {
            result
                .get("entrypointV06Response")
                .or_else(|| result.get("entryPointV06Response"))
                .and_then(|v06| v06.get("paymasterAndData"))
        })
        .and_then(Value::as_str)
        .ok_or_else(|| {
            Error::SponsorshipDenied(format!("paymaster response carried no paymasterAndData: {result}"))
        })?;

    let bytes = parse_bytes("paymasterAndData", s)?;

    // The first 20 bytes are the paymaster contract address.
    if bytes.len() < 20 {
        return Err(Error::SponsorshipDenied(format!(
            "paymasterAndData too short ({} bytes)",
            bytes.len()
        )));
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gas::{apply_buffers, GasBuffers};
    use crate::testing::FakeTransport;
    use serde_json::json;

    const PM_DATA: &str = "0x1111111111111111111111111111111111111111deadbeef";

    fn expected_bytes() -> Bytes {
        let mut v = vec![0x11; 20];
        v.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        Bytes::from(v)
    }

    fn buffered() -> BufferedOperation {
        apply_buffers(
            UserOperationDraft {
                sender: Address::repeat_byte(0xaa),
                call_data: Bytes::from(vec![0x12, 0x49, 0xc5, 0x8b]),
                call_gas_limit: Some(U256::from(100_000u64)),
                verification_gas_limit: Some(U256::from(70_000u64)),
                pre_verification_gas: Some(U256::from(50_000u64)),
                max_fee_per_gas: Some(U256::from(1_500_000_000u64)),
                max_priority_fee_per_gas: Some(U256::from(1_000_000_000u64)),
                ..Default::default()
            },
            &GasBuffers::default(),
        )
    }

    fn client(t: FakeTransport) -> PaymasterClient<FakeTransport> {
        PaymasterClient::new(
            t,
            Address::repeat_byte(0xee),
            11155111,
            Duration::from_secs(5),
        )
        .with_policy(Some("policy-1".into()), None)
    }

    #[test]
    fn parse_paymaster_and_data_top_level() {
        let res = json!({ "paymasterAndData": PM_DATA });
        assert_eq!(parse_v06_paymaster_and_data(&res).unwrap(), expected_bytes());
    }

    #[test]
    fn parse_paymaster_and_data_nested_entrypoint_v06() {
        let res = json!({ "entrypointV06Response": { "paymasterAndData": PM_DATA } });
        assert_eq!(parse_v06_paymaster_and_data(&res).unwrap(), expected_bytes());

        let res = json!({ "entryPointV06Response": { "paymasterAndData": PM_DATA } });
        assert_eq!(parse_v06_paymaster_and_data(&res).unwrap(), expected_bytes());
    }

    #[test]
    fn parse_paymaster_and_data_missing_fields() {
        let res = json!({ "entrypointV07Response": { "paymasterAndData": PM_DATA } });
        assert!(matches!(
            parse_v06_paymaster_and_data(&res),
            Err(Error::SponsorshipDenied(_))
        ));
    }

    #[test]
    fn parse_paymaster_and_data_rejects_empty_and_bad_hex() {
        let res = json!({ "paymasterAndData": "0x" });
        assert!(matches!(
            parse_v06_paymaster_and_data(&res),
            Err(Error::SponsorshipDenied(_))
        ));

        let res = json!({ "paymasterAndData": "deadbeef" });
        assert!(matches!(
            parse_v06_paymaster_and_data(&res),
            Err(Error::InvalidEncoding { .. })
        ));
    }

    #[test]
    fn params_carry_entry_point_chain_and_context() {
        let params = build_params(
            HexUserOperation::default(),
            Address::repeat_byte(0xee),
            11155111,
            Some("policy-1"),
            Some("hook"),
        );
        assert_eq!(params[1], json!(format!("0x{}", "ee".repeat(20))));
        assert_eq!(params[2], json!("0xaa36a7"));
        assert_eq!(params[3], json!({ "policyId": "policy-1", "webhookData": "hook" }));
    }

    #[tokio::test]
    async fn sponsor_sends_post_buffer_gas_and_attaches_data() {
        let t = FakeTransport::new().respond("pm_getPaymasterData", Ok(json!({ "paymasterAndData": PM_DATA })));
        let pm = client(t);

        let sponsored = pm.sponsor(buffered()).await.unwrap();
        assert_eq!(sponsored.operation().paymaster_and_data, expected_bytes());

        let calls = pm.transport.calls_to("pm_getPaymasterData");
        assert_eq!(calls.len(), 1);
        let op = &calls[0][0];
        assert_eq!(op["preVerificationGas"], json!("0xcd78"));
        assert_eq!(op["verificationGasLimit"], json!("0x14ff0"));
        assert_eq!(op["paymasterAndData"], json!("0x"));
    }

    #[tokio::test]
    async fn rpc_error_is_sponsorship_denied() {
        let t = FakeTransport::new().respond(
            "pm_getPaymasterData",
            Err(RpcError::Response {
                code: -32000,
                message: "policy limit reached".into(),
            }),
        );
        let err = client(t).sponsor(buffered()).await.unwrap_err();
        assert!(matches!(err, Error::SponsorshipDenied(ref m) if m.contains("policy limit")));
    }

    #[tokio::test]
    async fn transport_error_is_transport_failure() {
        let t = FakeTransport::new().respond(
            "pm_getPaymasterData",
            Err(RpcError::Transport("connection refused".into())),
        );
        let err = client(t).sponsor(buffered()).await.unwrap_err();
        assert!(matches!(err, Error::TransportFailure(_)));
    }

    #[tokio::test]
    async fn missing_fees_never_reach_the_paymaster() {
        let mut draft = buffered().0;
        draft.max_fee_per_gas = None;
        let t = FakeTransport::new();
        let pm = client(t);
        let err = pm.sponsor(BufferedOperation(draft)).await.unwrap_err();
        assert!(matches!(err, Error::IncompleteOperation("maxFeePerGas")));
        assert!(pm.transport.calls().is_empty());
    }
}
