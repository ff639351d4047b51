//! Canonical hex handling.
//!
//! Everything that leaves this crate over JSON-RPC is a `0x`-prefixed hex string. Values
//! arrive in mixed shapes (raw bytes, big integers, strings that may or may not be hex), so
//! they are funneled through [`to_hex`] first and parsed back into typed values with the
//! `parse_*` helpers.

use crate::error::{Error, Result};
use crate::types::{HexUserOperation, UserOperation, UserOperationDraft, UserOperationRequest};
use ethers::types::{Address, Bytes, H256, U256};

/// A value of not-yet-known representation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HexInput {
    /// A string that must already be `0x`-prefixed hex.
    Hex(String),
    /// A string explicitly tagged as a base-10 integer.
    Decimal(String),
    Bytes(Vec<u8>),
    Int(U256),
}

impl From<U256> for HexInput {
    fn from(v: U256) -> Self {
        HexInput::Int(v)
    }
}

impl From<u64> for HexInput {
    fn from(v: u64) -> Self {
        HexInput::Int(U256::from(v))
    }
}

impl From<Vec<u8>> for HexInput {
    fn from(v: Vec<u8>) -> Self {
        HexInput::Bytes(v)
    }
}

impl From<Bytes> for HexInput {
    fn from(v: Bytes) -> Self {
        HexInput::Bytes(v.to_vec())
    }
}

impl From<Address> for HexInput {
    fn from(v: Address) -> Self {
        HexInput::Bytes(v.as_bytes().to_vec())
    }
}

impl From<&str> for HexInput {
    fn from(v: &str) -> Self {
        HexInput::Hex(v.to_string())
    }
}

/// True when `s` is `0x` followed by zero or more hex digits.
pub fn is_hex(s: &str) -> bool {
    match s.strip_prefix("0x") {
        Some(digits) => digits.bytes().all(|b| b.is_ascii_hexdigit()),
        None => false,
    }
}

/// Canonicalizes `value` to a `0x`-prefixed hex string.
///
/// Absent stays absent. Strings that are already hex come back untouched so leading zeros
/// survive; strings that are not hex are rejected rather than reinterpreted.
pub fn to_hex(field: &str, value: Option<&HexInput>) -> Result<Option<String>> {
    let Some(value) = value else {
        return Ok(None);
    };

    let out = match value {
        HexInput::Hex(s) => {
            if !is_hex(s) {
                return Err(Error::encoding(field, format!("not a hex string: {s:?}")));
            }
            s.clone()
        }
        HexInput::Decimal(s) => {
            let v = U256::from_dec_str(s.trim())
                .map_err(|e| Error::encoding(field, format!("bad decimal {s:?}: {e}")))?;
            fmt_u256(v)
        }
        HexInput::Bytes(b) => format!("0x{}", hex::encode(b)),
        HexInput::Int(v) => fmt_u256(*v),
    };

    Ok(Some(out))
}

pub fn fmt_address(addr: Address) -> String {
    format!("0x{}", hex::encode(addr.as_bytes()))
}

pub fn fmt_h256(h: H256) -> String {
    format!("0x{}", hex::encode(h.as_bytes()))
}

/// JSON-RPC "quantity" encoding.
pub fn fmt_u256(v: U256) -> String {
    if v.is_zero() {
        "0x0".to_string()
    } else {
        format!("0x{:x}", v)
    }
}

pub fn fmt_bytes(b: &Bytes) -> String {
    format!("0x{}", hex::encode(b.as_ref()))
}

fn strip_hex<'a>(field: &str, s: &'a str) -> Result<&'a str> {
    if !is_hex(s) {
        return Err(Error::encoding(field, format!("not a hex string: {s:?}")));
    }
    Ok(&s[2..])
}

pub fn parse_u256_quantity(field: &str, s: &str) -> Result<U256> {
    let digits = strip_hex(field, s)?;
    if digits.is_empty() {
        return Ok(U256::zero());
    }
    if digits.len() > 64 {
        return Err(Error::encoding(field, "quantity wider than 256 bits"));
    }
    U256::from_str_radix(digits, 16).map_err(|e| Error::encoding(field, e))
}

pub fn parse_bytes(field: &str, s: &str) -> Result<Bytes> {
    let digits = strip_hex(field, s)?;
    let bytes = hex::decode(digits).map_err(|e| Error::encoding(field, e))?;
    Ok(Bytes::from(bytes))
}

pub fn parse_address(field: &str, s: &str) -> Result<Address> {
    let bytes = parse_bytes(field, s)?;
    if bytes.len() != 20 {
        return Err(Error::encoding(
            field,
            format!("expected 20-byte address, got {} bytes", bytes.len()),
        ));
    }
    Ok(Address::from_slice(&bytes))
}

pub fn parse_h256(field: &str, s: &str) -> Result<H256> {
    let bytes = parse_bytes(field, s)?;
    if bytes.len() != 32 {
        return Err(Error::encoding(
            field,
            format!("expected 32-byte hex, got {} bytes", bytes.len()),
        ));
    }
    Ok(H256::from_slice(&bytes))
}

/// Normalizer stage: canonicalizes every field of a raw request.
pub fn normalize_request(req: &UserOperationRequest) -> Result<HexUserOperation> {
    Ok(HexUserOperation {
        sender: to_hex("sender", req.sender.as_ref())?,
        nonce: to_hex("nonce", req.nonce.as_ref())?,
        init_code: to_hex("initCode", req.init_code.as_ref())?,
        call_data: to_hex("callData", req.call_data.as_ref())?,
        call_gas_limit: to_hex("callGasLimit", req.call_gas_limit.as_ref())?,
        verification_gas_limit: to_hex(
            "verificationGasLimit",
            req.verification_gas_limit.as_ref(),
        )?,
        pre_verification_gas: to_hex("preVerificationGas", req.pre_verification_gas.as_ref())?,
        max_fee_per_gas: to_hex("maxFeePerGas", req.max_fee_per_gas.as_ref())?,
        max_priority_fee_per_gas: to_hex(
            "maxPriorityFeePerGas",
            req.max_priority_fee_per_gas.as_ref(),
        )?,
        paymaster_and_data: None,
        signature: None,
    })
}

impl From<&UserOperation> for HexUserOperation {
    fn from(op: &UserOperation) -> Self {
        Self {
            sender: Some(fmt_address(op.sender)),
            nonce: Some(fmt_u256(op.nonce)),
            init_code: Some(fmt_bytes(&op.init_code)),
            call_data: Some(fmt_bytes(&op.call_data)),
            call_gas_limit: Some(fmt_u256(op.call_gas_limit)),
            verification_gas_limit: Some(fmt_u256(op.verification_gas_limit)),
            pre_verification_gas: Some(fmt_u256(op.pre_verification_gas)),
            max_fee_per_gas: Some(fmt_u256(op.max_fee_per_gas)),
            max_priority_fee_per_gas: Some(fmt_u256(op.max_priority_fee_per_gas)),
            paymaster_and_data: Some(fmt_bytes(&op.paymaster_and_data)),
            signature: Some(fmt_bytes(&op.signature)),
        }
    }
}

impl From<&UserOperationDraft> for HexUserOperation {
    fn from(op: &UserOperationDraft) -> Self {
        Self {
            sender: Some(fmt_address(op.sender)),
            nonce: Some(fmt_u256(op.nonce)),
            init_code: Some(fmt_bytes(&op.init_code)),
            call_data: Some(fmt_bytes(&op.call_data)),
            call_gas_limit: op.call_gas_limit.map(fmt_u256),
            verification_gas_limit: op.verification_gas_limit.map(fmt_u256),
            pre_verification_gas: op.pre_verification_gas.map(fmt_u256),
            max_fee_per_gas: op.max_fee_per_gas.map(fmt_u256),
            max_priority_fee_per_gas: op.max_priority_fee_per_gas.map(fmt_u256),
            paymaster_and_data: Some(fmt_bytes(&op.paymaster_and_data)),
            signature: Some(fmt_bytes(&op.signature)),
        }
    }
}

impl TryFrom<&HexUserOperation> for UserOperationDraft {
    type Error = Error;

    fn try_from(op: &HexUserOperation) -> Result<Self> {
        let opt_u256 = |field: &str, v: &Option<String>| -> Result<Option<U256>> {
            v.as_deref()
                .map(|s| parse_u256_quantity(field, s))
                .transpose()
        };
        let bytes_or_empty = |field: &str, v: &Option<String>| -> Result<Bytes> {
            match v.as_deref() {
                Some(s) => parse_bytes(field, s),
                None => Ok(Bytes::new()),
            }
        };

        let sender = op
            .sender
            .as_deref()
            .ok_or(Error::IncompleteOperation("sender"))?;
        let nonce = op
            .nonce
            .as_deref()
            .ok_or(Error::IncompleteOperation("nonce"))?;
        let call_data = op
            .call_data
            .as_deref()
            .ok_or(Error::IncompleteOperation("callData"))?;

        Ok(Self {
            sender: parse_address("sender", sender)?,
            nonce: parse_u256_quantity("nonce", nonce)?,
            init_code: bytes_or_empty("initCode", &op.init_code)?,
            call_data: parse_bytes("callData", call_data)?,
            call_gas_limit: opt_u256("callGasLimit", &op.call_gas_limit)?,
            verification_gas_limit: opt_u256("verificationGasLimit", &op.verification_gas_limit)?,
            pre_verification_gas: opt_u256("preVerificationGas", &op.pre_verification_gas)?,
            max_fee_per_gas: opt_u256("maxFeePerGas", &op.max_fee_per_gas)?,
            max_priority_fee_per_gas: opt_u256(
                "maxPriorityFeePerGas",
                &op.max_priority_fee_per_gas,
            )?,
            paymaster_and_data: bytes_or_empty("paymasterAndData", &op.paymaster_and_data)?,
            signature: bytes_or_empty("signature", &op.signature)?,
        })
    }
}
