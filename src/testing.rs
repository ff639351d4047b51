//! Fakes shared by the unit tests.

use crate::rpc::{RpcError, RpcTransport};
use crate::signer::UserOpSigner;
use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Transport that replays scripted responses per method and records every call.
#[derive(Default)]
pub struct FakeTransport {
    responses: Mutex<HashMap<String, VecDeque<Result<Value, RpcError>>>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response for `method`. The last queued response is repeated once the
    /// queue would otherwise run dry.
    pub fn respond(self, method: &str, res: Result<Value, RpcError>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .entry(method.to_string())
            .or_default()
            .push_back(res);
        self
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, method: &str) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter(|(m, _)| m == method)
            .map(|(_, p)| p)
            .collect()
    }
}

#[async_trait]
impl RpcTransport for FakeTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), params));

        let mut responses = self.responses.lock().unwrap();
        let queue = responses
            .get_mut(method)
            .ok_or_else(|| RpcError::Transport(format!("no scripted response for {method}")))?;
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue
                .front()
                .cloned()
                .unwrap_or_else(|| Err(RpcError::Transport("empty script".into())))
        }
    }
}

/// Signer that returns a fixed 65-byte signature and counts invocations.
pub struct FakeSigner {
    pub address: Address,
    pub signed: Mutex<Vec<H256>>,
    invocations: AtomicUsize,
}

impl FakeSigner {
    pub fn new() -> Self {
        Self {
            address: Address::repeat_byte(0x0b),
            signed: Mutex::new(Vec::new()),
            invocations: AtomicUsize::new(0),
        }
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UserOpSigner for FakeSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign_digest(&self, digest: H256) -> crate::Result<Bytes> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        self.signed.lock().unwrap().push(digest);
        Ok(Bytes::from(vec![0x5a; 65]))
    }
}

/// Transport whose every call takes `delay` before answering `null`.
pub struct SlowTransport {
    delay: std::time::Duration,
}

impl SlowTransport {
    pub fn new(delay: std::time::Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl RpcTransport for SlowTransport {
    async fn request(&self, _method: &str, _params: Value) -> Result<Value, RpcError> {
        tokio::time::sleep(self.delay).await;
        Ok(Value::Null)
    }
}
