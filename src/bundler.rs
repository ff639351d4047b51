use crate::encoding::{fmt_address, fmt_h256, parse_h256, parse_u256_quantity};
use crate::error::{Error, Result};
use crate::rpc::{with_deadline, RpcError, RpcTransport};
use crate::types::{
    HexUserOperation, SignedOperation, UserOperationDraft, UserOperationHandle,
    UserOperationReceipt,
};
use ethers::types::{Address, Bytes, U256};
use serde_json::Value;
use std::time::{Duration, Instant};

/// Placeholder signature used only for `eth_estimateUserOperationGas`.
///
/// Well-formed 65-byte ECDSA signature that recovers to some address, so account
/// validation runs its normal path instead of reverting on malformed input.
pub const DUMMY_SIGNATURE: [u8; 65] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xf0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x7a, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa,
    0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa,
    0xaa, 0xaa, 0xaa, 0xaa, 0x1c,
];

#[derive(Debug, Clone)]
pub struct BundlerClient<T> {
    transport: T,
    entry_point: Address,
    timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasEstimates {
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
}

impl<T: RpcTransport> BundlerClient<T> {
    pub fn new(transport: T, entry_point: Address, timeout: Duration) -> Self {
        Self {
            transport,
            entry_point,
            timeout,
        }
    }

    pub fn entry_point(&self) -> Address {
        self.entry_point
    }

    /// Estimates the three gas fields. The draft is sent with [`DUMMY_SIGNATURE`].
    pub async fn estimate_user_operation_gas(
        &self,
        draft: &UserOperationDraft,
    ) -> Result<GasEstimates> {
        let mut draft = draft.clone();
        draft.signature = Bytes::from(DUMMY_SIGNATURE.to_vec());

        let params = serde_json::json!([
            HexUserOperation::from(&draft),
            fmt_address(self.entry_point)
        ]);
        let res = self
            .rpc("eth_estimateUserOperationGas", params)
            .await
            .map_err(|e| match e {
                // the bundler simulated the operation and it reverted
                RpcError::Response { code, message } => Error::SubmissionRejected {
                    code,
                    reason: message,
                },
                RpcError::Transport(msg) => {
                    Error::TransportFailure(format!("eth_estimateUserOperationGas: {msg}"))
                }
            })?;

        Ok(GasEstimates {
            call_gas_limit: parse_u256_field(&res, "callGasLimit")?,
            verification_gas_limit: parse_u256_field(&res, "verificationGasLimit")?,
            pre_verification_gas: parse_u256_field(&res, "preVerificationGas")?,
        })
    }

    /// Submits a signed operation and returns the bundler's handle for it.
    pub async fn send_user_operation(&self, op: &SignedOperation) -> Result<UserOperationHandle> {
        let params = serde_json::json!([
            HexUserOperation::from(op.operation()),
            fmt_address(self.entry_point)
        ]);
        let res = self
            .rpc("eth_sendUserOperation", params)
            .await
            .map_err(|e| match e {
                RpcError::Response { code, message } => Error::SubmissionRejected {
                    code,
                    reason: message,
                },
                RpcError::Transport(msg) => {
                    Error::TransportFailure(format!("eth_sendUserOperation: {msg}"))
                }
            })?;

        let handle = parse_userop_hash(&res)?;
        if handle.0 != op.hash() {
            // Bundlers compute the same hash; a mismatch means a different entry point or chain.
            tracing::warn!(
                expected = %fmt_h256(op.hash()),
                returned = %handle,
                "bundler returned a different userOpHash"
            );
        }
        Ok(handle)
    }

    /// One receipt lookup. `None` means not included yet.
    pub async fn get_user_operation_receipt(
        &self,
        handle: UserOperationHandle,
    ) -> Result<Option<UserOperationReceipt>> {
        self.receipt_within(handle, self.timeout).await
    }

    async fn receipt_within(
        &self,
        handle: UserOperationHandle,
        deadline: Duration,
    ) -> Result<Option<UserOperationReceipt>> {
        let method = "eth_getUserOperationReceipt";
        let params = serde_json::json!([fmt_h256(handle.0)]);
        let res = with_deadline(method, deadline, self.transport.request(method, params))
            .await
            .map_err(|e| Error::TransportFailure(format!("{method}: {e}")))?;

        if res.is_null() {
            return Ok(None);
        }
        parse_receipt(handle, &res).map(Some)
    }

    /// Poll for a receipt until `timeout`, returning the bundle transaction hash.
    ///
    /// Dropping the returned future stops polling.
    pub async fn wait_for_transaction(
        &self,
        handle: UserOperationHandle,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<UserOperationReceipt> {
        let start = Instant::now();
        loop {
            // a hung poll must not outlive the caller's deadline
            let remaining = timeout.saturating_sub(start.elapsed());
            match self.receipt_within(handle, self.timeout.min(remaining)).await {
                Ok(Some(receipt)) => {
                    tracing::info!(
                        user_op_hash = %handle,
                        transaction_hash = %fmt_h256(receipt.transaction_hash),
                        success = receipt.success,
                        "user operation included"
                    );
                    return Ok(receipt);
                }
                Ok(None) => {}
                Err(e) => {
                    // transient errors are common on free-tier bundlers; keep polling
                    tracing::warn!(error = %e, "bundler receipt poll error");
                }
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(Error::ConfirmationTimeout {
                    handle: handle.to_string(),
                    waited_secs: elapsed.as_secs(),
                });
            }

            tokio::time::sleep(poll_interval.min(timeout - elapsed)).await;
        }
    }

    async fn rpc(&self, method: &str, params: Value) -> std::result::Result<Value, RpcError> {
        with_deadline(method, self.timeout, self.transport.request(method, params)).await
    }
}

#[cfg(test)]
impl BundlerClient<crate::testing::FakeTransport> {
    pub(crate) fn transport_calls(&self, method: &str) -> Vec<Value> {
        self.transport.calls_to(method)
    }
}

fn parse_u256_field(v: &Value, key: &str) -> Result<U256> {
    let s = v
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::TransportFailure(format!("missing or invalid field {key}")))?;
    parse_u256_quantity(key, s)
}

fn parse_userop_hash(res: &Value) -> Result<UserOperationHandle> {
    // Most bundlers return the userOpHash directly as a JSON string.
    // Alchemy's docs (and sometimes responses) wrap it in an object: { "result": "0x..." }.
    let hash_str = res
        .as_str()
        .or_else(|| res.get("result").and_then(Value::as_str))
        .or_else(|| res.get("userOpHash").and_then(Value::as_str))
        .or_else(|| res.get("userOperationHash").and_then(Value::as_str))
        .ok_or_else(|| {
            Error::TransportFailure(format!(
                "unexpected eth_sendUserOperation result shape (expected string or {{result: ...}}): {res}"
            ))
        })?;

    Ok(UserOperationHandle(parse_h256("userOpHash", hash_str)?))
}

fn parse_receipt(handle: UserOperationHandle, res: &Value) -> Result<UserOperationReceipt> {
    // transactionHash lives under `receipt`; some bundlers also echo it at the top level.
    let tx_hash = res
        .get("receipt")
        .and_then(|r| r.get("transactionHash"))
        .or_else(|| res.get("transactionHash"))
        .and_then(Value::as_str)
        .ok_or_else(|| {
            Error::TransportFailure(format!("receipt for {handle} has no transactionHash"))
        })?;

    let success = res
        .get("success")
        .and_then(Value::as_bool)
        .ok_or_else(|| {
            Error::TransportFailure(format!("receipt for {handle} has no success flag"))
        })?;

    let opt_u256 = |key: &str, v: Option<&Value>| -> Result<Option<U256>> {
        v.and_then(Value::as_str)
            .map(|s| parse_u256_quantity(key, s))
            .transpose()
    };

    Ok(UserOperationReceipt {
        user_op_hash: handle.0,
        success,
        actual_gas_cost: opt_u256("actualGasCost", res.get("actualGasCost"))?,
        transaction_hash: parse_h256("transactionHash", tx_hash)?,
        block_number: opt_u256(
            "blockNumber",
            res.get("receipt").and_then(|r| r.get("blockNumber")),
        )?,
    })
}
