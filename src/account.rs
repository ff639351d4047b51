//! SimpleAccount / SimpleAccountFactory helpers used to turn a plain call into a
//! [`UserOperationRequest`].

use crate::encoding::HexInput;
use crate::types::UserOperationRequest;
use anyhow::{Context, Result};
use ethers::abi::{AbiParser, Token};
use ethers::contract::Contract;
use ethers::providers::Middleware;
use ethers::types::{Address, Bytes, U256};
use std::sync::Arc;

/// A call the smart account should make.
#[derive(Clone, Debug, Default)]
pub struct Call {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

/// `SimpleAccount.execute(address dest, uint256 value, bytes func)` calldata.
pub fn encode_execute(call: &Call) -> Result<Bytes> {
    let execute = AbiParser::default()
        .parse_function("function execute(address dest, uint256 value, bytes func)")?;
    let data = execute.encode_input(&[
        Token::Address(call.to),
        Token::Uint(call.value),
        Token::Bytes(call.data.to_vec()),
    ])?;
    Ok(Bytes::from(data))
}

/// `factory ++ createAccount(owner, salt)`; empty once the account exists.
pub fn build_init_code(factory: Address, owner: Address, salt: U256, deployed: bool) -> Result<Bytes> {
    if deployed {
        return Ok(Bytes::new());
    }
    let create = AbiParser::default()
        .parse_function("function createAccount(address owner, uint256 salt) returns (address)")?;
    let create_calldata = create.encode_input(&[Token::Address(owner), Token::Uint(salt)])?;

    let mut v = Vec::with_capacity(20 + create_calldata.len());
    v.extend_from_slice(factory.as_bytes());
    v.extend_from_slice(&create_calldata);
    Ok(Bytes::from(v))
}

/// Counterfactual account address and whether code is already deployed there.
pub async fn compute_account_address<M: Middleware + 'static>(
    client: Arc<M>,
    factory: Address,
    owner: Address,
    salt: U256,
) -> Result<(Address, bool)> {
    let factory_abi = AbiParser::default()
        .parse(&["function getAddress(address owner, uint256 salt) view returns (address)"])?;
    let factory = Contract::new(factory, factory_abi, client.clone());

    let account: Address = factory
        .method("getAddress", (owner, salt))?
        .call()
        .await
        .context("factory.getAddress failed")?;

    let code = client
        .get_code(account, None)
        .await
        .context("eth_getCode failed")?;

    Ok((account, !code.as_ref().is_empty()))
}

/// EntryPoint nonce for key 0.
pub async fn fetch_nonce<M: Middleware + 'static>(
    client: Arc<M>,
    entry_point: Address,
    account: Address,
) -> Result<U256> {
    let entry_point_abi = AbiParser::default()
        .parse(&["function getNonce(address sender, uint192 key) view returns (uint256)"])?;
    let entry_point = Contract::new(entry_point, entry_point_abi, client);

    let nonce: U256 = entry_point
        .method("getNonce", (account, U256::zero()))?
        .call()
        .await
        .context("entryPoint.getNonce failed")?;
    Ok(nonce)
}

/// Assembles the raw request for `call`. Gas fields are left for the bundler to estimate.
pub fn build_request(
    account: Address,
    nonce: U256,
    init_code: Bytes,
    call: &Call,
    max_fee_per_gas: U256,
    max_priority_fee_per_gas: U256,
) -> Result<UserOperationRequest> {
    Ok(UserOperationRequest {
        sender: Some(HexInput::from(account)),
        nonce: Some(HexInput::from(nonce)),
        init_code: Some(HexInput::from(init_code)),
        call_data: Some(HexInput::from(encode_execute(call)?)),
        max_fee_per_gas: Some(HexInput::from(max_fee_per_gas)),
        max_priority_fee_per_gas: Some(HexInput::from(max_priority_fee_per_gas)),
        ..Default::default()
    })
}
