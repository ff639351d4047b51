use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

/// Failure talking to a JSON-RPC endpoint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    /// The endpoint answered with a JSON-RPC `error` object.
    #[error("RPC error {code}: {message}")]
    Response { code: i64, message: String },

    /// The request never produced a usable JSON-RPC response.
    #[error("{0}")]
    Transport(String),
}

impl RpcError {
    fn from_error_object(err: &Value) -> Self {
        RpcError::Response {
            code: err.get("code").and_then(Value::as_i64).unwrap_or(0),
            message: err
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string()),
        }
    }
}

/// Sends one JSON-RPC call and hands back its `result`.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError>;
}

#[async_trait]
impl<T: RpcTransport + ?Sized> RpcTransport for std::sync::Arc<T> {
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        (**self).request(method, params).await
    }
}

/// JSON-RPC 2.0 over HTTP POST.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    url: String,
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new(url: String, timeout: Duration) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { url, http })
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let req = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        tracing::debug!(%method, url = %self.url, "json-rpc request");

        let resp = self
            .http
            .post(&self.url)
            .json(&req)
            .send()
            .await
            .map_err(|e| RpcError::Transport(format!("POST {} failed: {e}", self.url)))?;

        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .map_err(|e| RpcError::Transport(format!("failed to decode JSON: {e}")))?;

        // Some providers pair a 4xx/5xx with a well-formed error object.
        if let Some(err) = body.get("error") {
            return Err(RpcError::from_error_object(err));
        }

        if !status.is_success() {
            return Err(RpcError::Transport(format!("HTTP {}: {}", status, body)));
        }

        body.get("result")
            .cloned()
            .ok_or_else(|| RpcError::Transport("missing result field".to_string()))
    }
}

/// Runs `fut`, converting an elapsed deadline into a transport failure.
pub(crate) async fn with_deadline<T, F>(
    what: &str,
    deadline: Duration,
    fut: F,
) -> Result<T, RpcError>
where
    F: Future<Output = Result<T, RpcError>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(res) => res,
        Err(_) => Err(RpcError::Transport(format!(
            "{what} timed out after {:?}",
            deadline
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_object_keeps_code_and_message() {
        let err = RpcError::from_error_object(&json!({ "code": -32500, "message": "AA21 didn't pay prefund" }));
        assert_eq!(
            err,
            RpcError::Response {
                code: -32500,
                message: "AA21 didn't pay prefund".into()
            }
        );
    }

    #[test]
    fn error_object_without_message_is_stringified() {
        let err = RpcError::from_error_object(&json!({ "reason": "nope" }));
        match err {
            RpcError::Response { code, message } => {
                assert_eq!(code, 0);
                assert!(message.contains("nope"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn deadline_turns_into_transport_error() {
        let res: Result<(), RpcError> = with_deadline("slow call", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(res, Err(RpcError::Transport(msg)) if msg.contains("slow call")));
    }
}
