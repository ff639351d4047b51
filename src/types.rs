use crate::encoding::HexInput;
use ethers::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};

/// ERC-4337 UserOperation (EntryPoint v0.6 layout).
///
/// Note: EntryPoint v0.7 uses a *different* packed struct layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserOperation {
    pub sender: Address,
    pub nonce: U256,
    pub init_code: Bytes,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub paymaster_and_data: Bytes,
    pub signature: Bytes,
}

/// An operation whose gas and fee fields may still be unknown.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserOperationDraft {
    pub sender: Address,
    pub nonce: U256,
    pub init_code: Bytes,
    pub call_data: Bytes,
    pub call_gas_limit: Option<U256>,
    pub verification_gas_limit: Option<U256>,
    pub pre_verification_gas: Option<U256>,
    pub max_fee_per_gas: Option<U256>,
    pub max_priority_fee_per_gas: Option<U256>,
    pub paymaster_and_data: Bytes,
    pub signature: Bytes,
}

impl UserOperationDraft {
    /// Promotes the draft to a complete operation, failing on the first missing field.
    pub fn complete(self) -> crate::Result<UserOperation> {
        use crate::Error::IncompleteOperation;

        Ok(UserOperation {
            sender: self.sender,
            nonce: self.nonce,
            init_code: self.init_code,
            call_data: self.call_data,
            call_gas_limit: self
                .call_gas_limit
                .ok_or(IncompleteOperation("callGasLimit"))?,
            verification_gas_limit: self
                .verification_gas_limit
                .ok_or(IncompleteOperation("verificationGasLimit"))?,
            pre_verification_gas: self
                .pre_verification_gas
                .ok_or(IncompleteOperation("preVerificationGas"))?,
            max_fee_per_gas: self
                .max_fee_per_gas
                .ok_or(IncompleteOperation("maxFeePerGas"))?,
            max_priority_fee_per_gas: self
                .max_priority_fee_per_gas
                .ok_or(IncompleteOperation("maxPriorityFeePerGas"))?,
            paymaster_and_data: self.paymaster_and_data,
            signature: self.signature,
        })
    }

    /// Fee fields are never estimated, so they must come with the request.
    pub fn require_fees(&self) -> crate::Result<()> {
        if self.max_fee_per_gas.is_none() {
            return Err(crate::Error::IncompleteOperation("maxFeePerGas"));
        }
        if self.max_priority_fee_per_gas.is_none() {
            return Err(crate::Error::IncompleteOperation("maxPriorityFeePerGas"));
        }
        Ok(())
    }

    pub fn gas_is_complete(&self) -> bool {
        self.call_gas_limit.is_some()
            && self.verification_gas_limit.is_some()
            && self.pre_verification_gas.is_some()
    }
}

/// Raw transaction intent, before normalization.
///
/// `paymasterAndData` and `signature` are deliberately absent: both are produced by the
/// pipeline and never accepted from the caller.
#[derive(Clone, Debug, Default)]
pub struct UserOperationRequest {
    pub sender: Option<HexInput>,
    pub nonce: Option<HexInput>,
    pub init_code: Option<HexInput>,
    pub call_data: Option<HexInput>,
    pub call_gas_limit: Option<HexInput>,
    pub verification_gas_limit: Option<HexInput>,
    pub pre_verification_gas: Option<HexInput>,
    pub max_fee_per_gas: Option<HexInput>,
    pub max_priority_fee_per_gas: Option<HexInput>,
}

/// JSON-RPC wire shape of a user operation: every present field is canonical hex.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HexUserOperation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_gas_limit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_gas_limit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_verification_gas: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_and_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Draft whose verification gas fields carry the safety buffers.
///
/// Only [`crate::gas::apply_buffers`] creates one, and nothing buffers it again.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferedOperation(pub(crate) UserOperationDraft);

impl BufferedOperation {
    pub fn draft(&self) -> &UserOperationDraft {
        &self.0
    }
}

/// Complete operation carrying paymaster data the paymaster produced for these exact
/// gas values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SponsoredOperation(pub(crate) UserOperation);

impl SponsoredOperation {
    pub fn operation(&self) -> &UserOperation {
        &self.0
    }
}

/// Signed operation, frozen. Any change would invalidate `signature`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedOperation {
    pub(crate) op: UserOperation,
    pub(crate) hash: H256,
}

impl SignedOperation {
    pub fn operation(&self) -> &UserOperation {
        &self.op
    }

    /// The digest that was signed.
    pub fn hash(&self) -> H256 {
        self.hash
    }
}

/// Opaque handle returned by `eth_sendUserOperation` (the userOpHash, not a tx hash).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserOperationHandle(pub H256);

impl std::fmt::Display for UserOperationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", crate::encoding::fmt_h256(self.0))
    }
}

/// Subset of `eth_getUserOperationReceipt` this crate relies on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserOperationReceipt {
    pub user_op_hash: H256,
    pub success: bool,
    pub actual_gas_cost: Option<U256>,
    pub transaction_hash: H256,
    pub block_number: Option<U256>,
}
