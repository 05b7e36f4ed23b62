//! Read access to contract state.
//!
//! `ChainReader` is the narrow interface the gateways read through.
//! `TonCenterClient` implements it over the toncenter v2 HTTP API.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use ton_ser::Address;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("node returned an error: {0}")]
    Node(String),
    #[error("get method '{method}' exited with code {exit_code}")]
    ExitCode { method: String, exit_code: i32 },
    #[error("contract {0} is not deployed")]
    NotDeployed(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Argument of a get method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackArg {
    Int(i128),
}

/// Raw response of a get method. Stack items are kept as JSON and
/// classified by `stack::StackEntry::classify`, since their shape depends on
/// the node client.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodResponse {
    pub stack: Vec<Value>,
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountStatus {
    Active,
    Uninitialized,
    Frozen,
    Nonexistent,
}

impl AccountStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "active" => AccountStatus::Active,
            "frozen" => AccountStatus::Frozen,
            "uninit" | "uninitialized" => AccountStatus::Uninitialized,
            _ => AccountStatus::Nonexistent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractState {
    pub status: AccountStatus,
    /// nanotons
    pub balance: u128,
}

impl ContractState {
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn run_method(
        &self,
        address: &Address,
        method: &str,
        args: &[StackArg],
    ) -> Result<MethodResponse, ChainError>;

    async fn contract_state(&self, address: &Address) -> Result<ContractState, ChainError>;
}

/// Run a get method and turn a non-zero exit code into an error.
pub async fn run_checked<C: ChainReader + ?Sized>(
    chain: &C,
    address: &Address,
    method: &str,
    args: &[StackArg],
) -> Result<Vec<Value>, ChainError> {
    let response = chain.run_method(address, method, args).await?;
    match response.exit_code {
        Some(code) if code != 0 && code != 1 => Err(ChainError::ExitCode {
            method: method.to_string(),
            exit_code: code,
        }),
        _ => Ok(response.stack),
    }
}

/* toncenter ***************************************************************** */

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunGetMethodResult {
    #[serde(default)]
    stack: Vec<Value>,
    exit_code: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct AddressInformation {
    #[serde(default)]
    balance: Value,
    state: String,
}

#[derive(Clone)]
pub struct TonCenterClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl TonCenterClient {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Result<Self, ChainError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ChainError::Transport(e.to_string()))?;
        Ok(TonCenterClient {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("X-API-Key", key),
            None => builder,
        }
    }

    async fn unwrap_envelope<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<T, ChainError> {
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;
        let envelope: Envelope<T> = serde_json::from_str(&text).map_err(|e| {
            if status.is_success() {
                ChainError::Malformed(e.to_string())
            } else {
                ChainError::Node(format!("{}: {}", status, text))
            }
        })?;
        match (envelope.ok, envelope.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(ChainError::Node(
                envelope
                    .error
                    .unwrap_or_else(|| format!("request failed with status {}", status)),
            )),
        }
    }
}

fn encode_arg(arg: &StackArg) -> Value {
    match arg {
        StackArg::Int(v) if *v < 0 => json!(["num", format!("-{:#x}", v.unsigned_abs())]),
        StackArg::Int(v) => json!(["num", format!("{:#x}", v)]),
    }
}

#[async_trait]
impl ChainReader for TonCenterClient {
    async fn run_method(
        &self,
        address: &Address,
        method: &str,
        args: &[StackArg],
    ) -> Result<MethodResponse, ChainError> {
        let body = json!({
            "address": address.to_string(),
            "method": method,
            "stack": args.iter().map(encode_arg).collect::<Vec<_>>(),
        });
        tracing::debug!(target: "chain", %address, method, "runGetMethod");
        let response = self
            .request(self.http.post(format!("{}/runGetMethod", self.endpoint)))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;
        let result: RunGetMethodResult = Self::unwrap_envelope(response).await?;
        Ok(MethodResponse {
            stack: result.stack,
            exit_code: result.exit_code,
        })
    }

    async fn contract_state(&self, address: &Address) -> Result<ContractState, ChainError> {
        let response = self
            .request(self.http.get(format!("{}/getAddressInformation", self.endpoint)))
            .query(&[("address", address.to_string())])
            .send()
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;
        let info: AddressInformation = Self::unwrap_envelope(response).await?;
        let balance = match &info.balance {
            Value::String(s) => s.parse().unwrap_or(0),
            Value::Number(n) => n.as_u64().unwrap_or(0) as u128,
            _ => 0,
        };
        Ok(ContractState {
            status: AccountStatus::parse(&info.state),
            balance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::GET, Method::POST, MockServer};

    fn address() -> Address {
        format!("0:{}", "11".repeat(32)).parse().unwrap()
    }

    #[tokio::test]
    async fn run_method_posts_arguments() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/runGetMethod")
                    .header("x-api-key", "secret")
                    .json_body_partial(r#"{"method":"getPollOptions","stack":[["num","0x5"]]}"#);
                then.status(200).json_body(json!({
                    "ok": true,
                    "result": {"gas_used": 100, "exit_code": 0, "stack": [["num", "0x2"]]}
                }));
            })
            .await;

        let client = TonCenterClient::new(server.base_url(), Some("secret".to_string())).unwrap();
        let response = client
            .run_method(&address(), "getPollOptions", &[StackArg::Int(5)])
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(response.exit_code, Some(0));
        assert_eq!(response.stack, vec![json!(["num", "0x2"])]);
    }

    #[tokio::test]
    async fn node_error_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/runGetMethod");
                then.status(500)
                    .json_body(json!({"ok": false, "error": "LITE_SERVER_UNKNOWN", "code": 500}));
            })
            .await;
        let client = TonCenterClient::new(server.base_url(), None).unwrap();
        let err = client
            .run_method(&address(), "getPollCount", &[])
            .await
            .unwrap_err();
        assert_eq!(err, ChainError::Node("LITE_SERVER_UNKNOWN".to_string()));
    }

    #[tokio::test]
    async fn contract_state_parses_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/getAddressInformation");
                then.status(200).json_body(json!({
                    "ok": true,
                    "result": {"balance": "1500000000", "state": "active"}
                }));
            })
            .await;
        let client = TonCenterClient::new(server.base_url(), None).unwrap();
        let state = client.contract_state(&address()).await.unwrap();
        assert!(state.is_active());
        assert_eq!(state.balance, 1_500_000_000);
    }

    #[test]
    fn negative_arguments_are_hex_encoded() {
        assert_eq!(encode_arg(&StackArg::Int(-31)), json!(["num", "-0x1f"]));
    }
}
