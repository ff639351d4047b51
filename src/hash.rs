//! EntryPoint v0.6 `getUserOpHash`, computed locally.
//!
//! `initCode`, `callData` and `paymasterAndData` are keccak'd into `bytes32` slots so the
//! packed tuple stays fixed-width. The signature is never part of the hash.

use crate::types::UserOperation;
use ethers::abi::{encode, Token};
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::keccak256;

/// ABI-encodes the ten signed fields, variable-length ones pre-hashed.
pub fn pack(op: &UserOperation) -> Bytes {
    let encoded = encode(&[
        Token::Address(op.sender),
        Token::Uint(op.nonce),
        Token::FixedBytes(keccak256(&op.init_code).to_vec()),
        Token::FixedBytes(keccak256(&op.call_data).to_vec()),
        Token::Uint(op.call_gas_limit),
        Token::Uint(op.verification_gas_limit),
        Token::Uint(op.pre_verification_gas),
        Token::Uint(op.max_fee_per_gas),
        Token::Uint(op.max_priority_fee_per_gas),
        Token::FixedBytes(keccak256(&op.paymaster_and_data).to_vec()),
    ]);

    Bytes::from(encoded)
}

/// `keccak256(abi.encode(keccak256(pack(op)), entryPoint, chainId))`.
pub fn user_op_hash(op: &UserOperation, entry_point: Address, chain_id: u64) -> H256 {
    let inner = keccak256(pack(op));
    let outer = encode(&[
        Token::FixedBytes(inner.to_vec()),
        Token::Address(entry_point),
        Token::Uint(U256::from(chain_id)),
    ]);
    H256::from(keccak256(outer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    const ENTRY_POINT_V06: &str = "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789";
    const SEPOLIA: u64 = 11155111;

    fn entry_point() -> Address {
        Address::from_str(ENTRY_POINT_V06).unwrap()
    }

    fn vector_op() -> UserOperation {
        let mut pm = vec![0x11; 20];
        pm.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        UserOperation {
            sender: Address::repeat_byte(0xaa),
            nonce: U256::zero(),
            init_code: Bytes::new(),
            // mint()
            call_data: Bytes::from(vec![0x12, 0x49, 0xc5, 0x8b]),
            call_gas_limit: U256::from(100_000u64),
            verification_gas_limit: U256::from(86_000u64),
            pre_verification_gas: U256::from(52_600u64),
            max_fee_per_gas: U256::from(1_500_000_000u64),
            max_priority_fee_per_gas: U256::from(1_000_000_000u64),
            paymaster_and_data: Bytes::from(pm),
            signature: Bytes::new(),
        }
    }

    fn h(s: &str) -> H256 {
        H256::from_str(s).unwrap()
    }

    #[test]
    fn packed_layout_is_ten_words_with_hashed_slots() {
        let op = vector_op();
        let packed = pack(&op);
        assert_eq!(packed.len(), 320);

        // address is left-padded
        assert_eq!(&packed[..12], &[0u8; 12]);
        assert_eq!(&packed[12..32], op.sender.as_bytes());
        assert_eq!(
            H256::from_slice(&packed[64..96]),
            h("0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470")
        );
        assert_eq!(
            H256::from_slice(&packed[96..128]),
            h("0x54b40988fe52669e3fba3174b32b0417999066dd7fd9c35ad1682c99d0df8b2d")
        );
        assert_eq!(
            H256::from_slice(&packed[288..320]),
            h("0x4fd7127fec0f07eb29d95e88a1bfc4be49dbbb1cc83c8f8f71176ad6b98308c2")
        );
    }

    #[test]
    fn known_vector() {
        let op = vector_op();
        assert_eq!(
            H256::from(keccak256(pack(&op))),
            h("0xd9226ab5689f791a50d91f6c80ce5580cc4e3431b26335fc99ea0038d37746ae")
        );
        assert_eq!(
            user_op_hash(&op, entry_point(), SEPOLIA),
            h("0xac1f0afd4335a4732b12ae1b9ea5ffb5e97da85b75e03ce190063896a84e623b")
        );
    }

    #[test]
    fn hash_is_bound_to_chain_and_entry_point() {
        let op = vector_op();
        assert_eq!(
            user_op_hash(&op, entry_point(), 1),
            h("0x1af9f27bfd3f0a42e9214911e77672d88fa7211a6917c1f7876792f255debdf3")
        );
        assert_ne!(
            user_op_hash(&op, entry_point(), SEPOLIA),
            user_op_hash(&op, Address::repeat_byte(0x01), SEPOLIA)
        );
    }

    #[test]
    fn hash_is_deterministic_and_ignores_signature() {
        let op = vector_op();
        let mut signed = op.clone();
        signed.signature = Bytes::from(vec![0x5a; 65]);
        assert_eq!(
            user_op_hash(&op, entry_point(), SEPOLIA),
            user_op_hash(&op.clone(), entry_point(), SEPOLIA)
        );
        assert_eq!(
            user_op_hash(&op, entry_point(), SEPOLIA),
            user_op_hash(&signed, entry_point(), SEPOLIA)
        );
    }

    #[test]
    fn every_signed_field_changes_the_hash() {
        let base = vector_op();
        let base_hash = user_op_hash(&base, entry_point(), SEPOLIA);

        let flip = |b: &Bytes| {
            let mut v = b.to_vec();
            if v.is_empty() {
                v.push(0x01);
            } else {
                v[0] ^= 0x01;
            }
            Bytes::from(v)
        };
        let bump = |v: U256| v + U256::one();

        type Mutation = Box<dyn Fn(&mut UserOperation)>;
        fn m(f: impl Fn(&mut UserOperation) + 'static) -> Mutation {
            Box::new(f)
        }

        let mutations: Vec<(&str, Mutation)> = vec![
            ("sender", m(|op| op.sender = Address::repeat_byte(0xab))),
            ("nonce", m(move |op| op.nonce = bump(op.nonce))),
            ("initCode", m(move |op| op.init_code = flip(&op.init_code))),
            ("callData", m(move |op| op.call_data = flip(&op.call_data))),
            ("callGasLimit", m(move |op| op.call_gas_limit = bump(op.call_gas_limit))),
            (
                "verificationGasLimit",
                m(move |op| op.verification_gas_limit = bump(op.verification_gas_limit)),
            ),
            (
                "preVerificationGas",
                m(move |op| op.pre_verification_gas = bump(op.pre_verification_gas)),
            ),
            ("maxFeePerGas", m(move |op| op.max_fee_per_gas = bump(op.max_fee_per_gas))),
            (
                "maxPriorityFeePerGas",
                m(move |op| op.max_priority_fee_per_gas = bump(op.max_priority_fee_per_gas)),
            ),
            (
                "paymasterAndData",
                m(move |op| op.paymaster_and_data = flip(&op.paymaster_and_data)),
            ),
        ];

        for (name, mutate) in mutations {
            let mut op = base.clone();
            mutate(&mut op);
            assert_ne!(
                user_op_hash(&op, entry_point(), SEPOLIA),
                base_hash,
                "{name} is not bound into the hash"
            );
        }
    }
}
