use crate::error::{Error, Result};
use crate::hash::user_op_hash;
use crate::types::{SignedOperation, SponsoredOperation};
use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Bytes, H256};

/// Signing capability bound to the account's authorized key.
#[async_trait]
pub trait UserOpSigner: Send + Sync {
    fn address(&self) -> Address;

    /// Signs exactly `digest`; any message framing is the key holder's convention.
    async fn sign_digest(&self, digest: H256) -> Result<Bytes>;
}

/// SimpleAccount owners sign the userOpHash as an EIP-191 personal message.
#[async_trait]
impl UserOpSigner for LocalWallet {
    fn address(&self) -> Address {
        Signer::address(self)
    }

    async fn sign_digest(&self, digest: H256) -> Result<Bytes> {
        let sig = self
            .sign_message(digest.as_bytes())
            .await
            .map_err(|e| Error::Signing(format!("failed to sign userOpHash: {e}")))?;
        Ok(Bytes::from(sig.to_vec()))
    }
}

/// Hashes the sponsored operation once and attaches the owner's signature over that hash.
pub async fn sign_operation(
    op: SponsoredOperation,
    signer: &dyn UserOpSigner,
    entry_point: Address,
    chain_id: u64,
) -> Result<SignedOperation> {
    let mut op = op.0;
    let hash = user_op_hash(&op, entry_point, chain_id);

    tracing::info!(
        user_op_hash = %crate::encoding::fmt_h256(hash),
        signer = %crate::encoding::fmt_address(signer.address()),
        "signing user operation"
    );

    let signature = signer.sign_digest(hash).await?;
    if signature.is_empty() {
        return Err(Error::Signing("signer returned an empty signature".to_string()));
    }
    op.signature = signature;

    Ok(SignedOperation { op, hash })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSigner;
    use crate::types::UserOperation;
    use ethers::types::{Signature, U256};
    use std::str::FromStr;

    fn sponsored() -> SponsoredOperation {
        SponsoredOperation(UserOperation {
            sender: Address::repeat_byte(0xaa),
            nonce: U256::zero(),
            init_code: Bytes::new(),
            call_data: Bytes::from(vec![0x12, 0x49, 0xc5, 0x8b]),
            call_gas_limit: U256::from(100_000u64),
            verification_gas_limit: U256::from(86_000u64),
            pre_verification_gas: U256::from(52_600u64),
            max_fee_per_gas: U256::from(1_500_000_000u64),
            max_priority_fee_per_gas: U256::from(1_000_000_000u64),
            paymaster_and_data: Bytes::from(vec![0x11; 24]),
            signature: Bytes::new(),
        })
    }

    #[tokio::test]
    async fn signs_the_exact_operation_hash() {
        let signer = FakeSigner::new();
        let entry_point = Address::repeat_byte(0xee);
        let expected = user_op_hash(sponsored().operation(), entry_point, 1);

        let signed = sign_operation(sponsored(), &signer, entry_point, 1)
            .await
            .unwrap();

        assert_eq!(signed.hash(), expected);
        assert_eq!(*signer.signed.lock().unwrap(), vec![expected]);
        assert_eq!(signed.operation().signature.len(), 65);
        // signing leaves every hashed field alone
        assert_eq!(user_op_hash(signed.operation(), entry_point, 1), expected);
    }

    #[tokio::test]
    async fn local_wallet_signature_recovers_to_owner() {
        let wallet = LocalWallet::from_str(
            "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318",
        )
        .unwrap();
        let digest = user_op_hash(sponsored().operation(), Address::repeat_byte(0xee), 1);

        let raw = wallet.sign_digest(digest).await.unwrap();
        assert_eq!(raw.len(), 65);

        let sig = Signature::try_from(raw.as_ref()).unwrap();
        let recovered = sig.recover(digest.as_bytes()).unwrap();
        assert_eq!(recovered, UserOpSigner::address(&wallet));
    }
}
