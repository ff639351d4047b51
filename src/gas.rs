use crate::types::{BufferedOperation, UserOperationDraft};
use ethers::types::U256;

/// Fixed margins added on top of bundler gas estimates.
///
/// The values are tuned to one paymaster / EntryPoint pair; changing them changes what the
/// paymaster is asked to sponsor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GasBuffers {
    pub pre_verification_gas: U256,
    pub verification_gas_limit: U256,
}

impl GasBuffers {
    pub fn new(pre_verification_gas: u64, verification_gas_limit: u64) -> Self {
        Self {
            pre_verification_gas: U256::from(pre_verification_gas),
            verification_gas_limit: U256::from(verification_gas_limit),
        }
    }
}

impl Default for GasBuffers {
    fn default() -> Self {
        Self::new(2_600, 16_000)
    }
}

/// Adds the buffers to `preVerificationGas` and `verificationGasLimit`.
///
/// Absent fields stay absent: a missing estimate must not turn into `0 + buffer`.
pub fn apply_buffers(draft: UserOperationDraft, buffers: &GasBuffers) -> BufferedOperation {
    let pre_verification_gas = draft
        .pre_verification_gas
        .map(|g| g.saturating_add(buffers.pre_verification_gas));
    let verification_gas_limit = draft
        .verification_gas_limit
        .map(|g| g.saturating_add(buffers.verification_gas_limit));

    tracing::debug!(
        ?pre_verification_gas,
        ?verification_gas_limit,
        "applied gas buffers"
    );

    BufferedOperation(UserOperationDraft {
        pre_verification_gas,
        verification_gas_limit,
        ..draft
    })
}

/// Scales a gas price by a multiplier in basis points (10_000 = 1.0x).
pub fn apply_fee_multiplier(gas_price: U256, bps: u64) -> U256 {
    let bps = bps.max(1);
    gas_price.saturating_mul(U256::from(bps)) / U256::from(10_000u64)
}
