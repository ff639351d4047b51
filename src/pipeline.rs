//! The two operations callers use: build a sponsored, signed operation from a request,
//! and submit it (then optionally resolve the handle to a transaction).

use crate::bundler::BundlerClient;
use crate::encoding::{self, normalize_request};
use crate::error::{Error, Result};
use crate::gas::{apply_buffers, GasBuffers};
use crate::paymaster::PaymasterClient;
use crate::rpc::RpcTransport;
use crate::signer::{sign_operation, UserOpSigner};
use crate::types::{
    SignedOperation, UserOperationDraft, UserOperationHandle, UserOperationReceipt,
    UserOperationRequest,
};
use ethers::types::Bytes;
use std::time::Duration;

/// Pipeline policy. The entry point and chain id come from the clients.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub gas_buffers: GasBuffers,
    pub receipt_poll_interval: Duration,
}

pub struct SponsoredPipeline<'a, P, B> {
    config: PipelineConfig,
    paymaster: &'a PaymasterClient<P>,
    bundler: &'a BundlerClient<B>,
    signer: &'a dyn UserOpSigner,
}

impl<'a, P: RpcTransport, B: RpcTransport> SponsoredPipeline<'a, P, B> {
    pub fn new(
        config: PipelineConfig,
        paymaster: &'a PaymasterClient<P>,
        bundler: &'a BundlerClient<B>,
        signer: &'a dyn UserOpSigner,
    ) -> Result<Self> {
        if paymaster.entry_point() != bundler.entry_point() {
            return Err(Error::Misconfigured(format!(
                "paymaster targets entry point {}, bundler targets {}",
                encoding::fmt_address(paymaster.entry_point()),
                encoding::fmt_address(bundler.entry_point())
            )));
        }
        Ok(Self {
            config,
            paymaster,
            bundler,
            signer,
        })
    }

    /// normalize -> estimate (if needed) -> buffer -> sponsor -> hash + sign.
    pub async fn build(&self, request: &UserOperationRequest) -> Result<SignedOperation> {
        let wire = normalize_request(request)?;
        let draft = UserOperationDraft::try_from(&wire)?;
        draft.require_fees()?;
        let draft = self.estimate_missing_gas(draft).await?;

        let buffered = apply_buffers(draft, &self.config.gas_buffers);
        let sponsored = self.paymaster.sponsor(buffered).await?;

        sign_operation(
            sponsored,
            self.signer,
            self.paymaster.entry_point(),
            self.paymaster.chain_id(),
        )
        .await
    }

    pub async fn submit(&self, op: &SignedOperation) -> Result<UserOperationHandle> {
        let handle = self.bundler.send_user_operation(op).await?;
        tracing::info!(user_op_hash = %handle, "user operation submitted");
        Ok(handle)
    }

    /// Resolves `handle` to its receipt, or `ConfirmationTimeout` after `timeout`.
    pub async fn wait_for_transaction(
        &self,
        handle: UserOperationHandle,
        timeout: Duration,
    ) -> Result<UserOperationReceipt> {
        self.bundler
            .wait_for_transaction(handle, timeout, self.config.receipt_poll_interval)
            .await
    }

    /// Fills only the gas fields the request left out, estimating with stub paymaster data
    /// so paymaster verification is priced in. The stub is dropped before sponsorship.
    async fn estimate_missing_gas(&self, draft: UserOperationDraft) -> Result<UserOperationDraft> {
        if draft.gas_is_complete() {
            return Ok(draft);
        }

        let mut probe = draft.clone();
        probe.paymaster_and_data = self.paymaster.get_paymaster_stub_data(&probe).await?;
        let est = self.bundler.estimate_user_operation_gas(&probe).await?;

        tracing::info!(
            call_gas_limit = %est.call_gas_limit,
            verification_gas_limit = %est.verification_gas_limit,
            pre_verification_gas = %est.pre_verification_gas,
            "bundler gas estimate"
        );

        Ok(UserOperationDraft {
            call_gas_limit: draft.call_gas_limit.or(Some(est.call_gas_limit)),
            verification_gas_limit: draft
                .verification_gas_limit
                .or(Some(est.verification_gas_limit)),
            pre_verification_gas: draft
                .pre_verification_gas
                .or(Some(est.pre_verification_gas)),
            paymaster_and_data: Bytes::new(),
            ..draft
        })
    }
}
