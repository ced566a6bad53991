use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tokio::time::{Duration, sleep};
use tracing::instrument;

use crate::core::error::{ConfigError, Error};

const AUTH_ATTEMPTS: u32 = 3;
const CALL_ATTEMPTS: u32 = 2;
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Client for the upstream ERP's JSON-RPC interface. Holds one session
/// handle; the handle goes stale asynchronously and is only detected when a
/// call faults, so `call` re-authenticates on session faults and retries.
#[derive(Clone)]
pub(crate) struct Client {
    client: reqwest::Client,
    endpoint: String,
    database: String,
    account: String,
    secret: String,
    // Serializes re-authentication so concurrent callers cannot race to
    // replace the handle.
    session: Arc<Mutex<Option<i64>>>,
    session_fault: Regex,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.endpoint)
            .field("database", &self.database)
            .field("account", &self.account)
            .finish()
    }
}

impl Client {
    pub(crate) fn new(
        endpoint: &str,
        database: &str,
        account: &str,
        secret: &str,
    ) -> Result<Self, ConfigError> {
        let client = reqwest::ClientBuilder::new().build()?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            database: database.to_string(),
            account: account.to_string(),
            secret: secret.to_string(),
            session: Arc::new(Mutex::new(None)),
            session_fault: Regex::new(r"(?i)session expired|access denied|invalid session")?,
        })
    }

    pub(crate) async fn session(&self) -> Option<i64> {
        *self.session.lock().await
    }

    /// Authenticates against the upstream, retrying transient failures with
    /// a fixed pause between attempts. The session lock is held for the
    /// whole exchange, so concurrent re-authentications collapse into one.
    #[instrument(skip(self), fields(endpoint = %self.endpoint, account = %self.account))]
    pub(crate) async fn authenticate(&self) -> Result<i64, Error> {
        let mut session = self.session.lock().await;

        let mut last_error = String::new();

        for attempt in 1..=AUTH_ATTEMPTS {
            tracing::debug!("authenticating ({}/{})", attempt, AUTH_ATTEMPTS);

            match self
                .rpc(
                    "common",
                    "authenticate",
                    json!([self.database, self.account, self.secret, {}]),
                )
                .await
            {
                Ok(Value::Number(uid)) if uid.as_i64().is_some_and(|uid| uid > 0) => {
                    let uid = uid.as_i64().unwrap();
                    *session = Some(uid);
                    tracing::info!(uid, "authenticated with upstream");
                    return Ok(uid);
                }
                // `false` means the upstream rejected the credentials.
                Ok(_) => last_error = "upstream rejected the configured credentials".to_string(),
                Err(e) => last_error = e.to_string(),
            }

            tracing::warn!(
                "authentication attempt {}/{} failed: {}",
                attempt,
                AUTH_ATTEMPTS,
                last_error
            );

            if attempt < AUTH_ATTEMPTS {
                sleep(RETRY_DELAY).await;
            }
        }

        *session = None;
        tracing::error!(
            "authentication failed after {} attempts: {}",
            AUTH_ATTEMPTS,
            last_error
        );

        Err(Error::UpstreamAuth(last_error))
    }

    /// Executes `method` on `model`. Authenticates first when no session is
    /// held; on a fault matching the session-expiry pattern, forces one
    /// re-authentication before the single retry.
    #[instrument(skip(self, args, kwargs))]
    pub(crate) async fn call(
        &self,
        model: &str,
        method: &str,
        args: Value,
        kwargs: Value,
    ) -> Result<Value, Error> {
        let mut last_error = String::new();

        for attempt in 1..=CALL_ATTEMPTS {
            let uid = match self.session().await {
                Some(uid) => uid,
                None => self.authenticate().await?,
            };

            match self
                .rpc(
                    "object",
                    "execute_kw",
                    json!([
                        self.database,
                        uid,
                        self.secret,
                        model,
                        method,
                        args,
                        kwargs
                    ]),
                )
                .await
            {
                Ok(result) => return Ok(result),
                Err(e) => {
                    last_error = e.to_string();
                    tracing::warn!(
                        model,
                        method,
                        "call attempt {}/{} failed: {}",
                        attempt,
                        CALL_ATTEMPTS,
                        last_error
                    );

                    if self.session_fault.is_match(&last_error) {
                        if let Err(e) = self.authenticate().await {
                            tracing::error!("re-authentication failed: {}", e);
                        }
                    }

                    if attempt < CALL_ATTEMPTS {
                        sleep(RETRY_DELAY).await;
                    }
                }
            }
        }

        tracing::error!(
            model,
            method,
            "call failed after {} attempts: {}",
            CALL_ATTEMPTS,
            last_error
        );

        Err(Error::UpstreamCall {
            model: model.to_string(),
            method: method.to_string(),
            message: last_error,
        })
    }

    async fn rpc(&self, service: &str, method: &str, args: Value) -> Result<Value, Error> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            method: "call",
            params: RpcParams {
                service,
                method,
                args,
            },
            id: 1,
        };

        let response: RpcResponse = self
            .client
            .post(format!("{}/jsonrpc", self.endpoint))
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(fault) = response.error {
            return Err(Error::Upstream(fault.into_message()));
        }

        Ok(response.result.unwrap_or(Value::Null))
    }
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'a str,
    method: &'a str,
    params: RpcParams<'a>,
    id: u32,
}

#[derive(Serialize)]
struct RpcParams<'a> {
    service: &'a str,
    method: &'a str,
    args: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcFault>,
}

/// Faults arrive with free-text messages; the detailed one lives under
/// `data.message` when present.
#[derive(Deserialize)]
struct RpcFault {
    message: Option<String>,
    data: Option<RpcFaultData>,
}

#[derive(Deserialize)]
struct RpcFaultData {
    message: Option<String>,
}

impl RpcFault {
    fn into_message(self) -> String {
        self.data
            .and_then(|data| data.message)
            .or(self.message)
            .unwrap_or_else(|| "unknown upstream fault".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct MockUpstream {
        auth_calls: AtomicU32,
        auth_failures: u32,
        execute_calls: AtomicU32,
        execute_failures: u32,
        execute_fault: &'static str,
    }

    async fn handler(
        State(mock): State<Arc<MockUpstream>>,
        Json(request): Json<Value>,
    ) -> Json<Value> {
        let service = request["params"]["service"].as_str().unwrap_or_default();

        match service {
            "common" => {
                let seen = mock.auth_calls.fetch_add(1, Ordering::SeqCst);
                if seen < mock.auth_failures {
                    Json(json!({
                        "jsonrpc": "2.0",
                        "id": 1,
                        "error": {"message": "odoo server error", "data": {"message": "connection refused"}}
                    }))
                } else {
                    Json(json!({"jsonrpc": "2.0", "id": 1, "result": 7}))
                }
            }
            _ => {
                let seen = mock.execute_calls.fetch_add(1, Ordering::SeqCst);
                if seen < mock.execute_failures {
                    Json(json!({
                        "jsonrpc": "2.0",
                        "id": 1,
                        "error": {"message": mock.execute_fault}
                    }))
                } else {
                    Json(json!({"jsonrpc": "2.0", "id": 1, "result": [{"id": 1, "name": "ok"}]}))
                }
            }
        }
    }

    async fn spawn_upstream(mock: Arc<MockUpstream>) -> String {
        let app = Router::new()
            .route("/jsonrpc", post(handler))
            .with_state(mock);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        format!("http://{}", addr)
    }

    fn client_for(endpoint: &str) -> Client {
        Client::new(endpoint, "test-db", "svc", "svc-key").unwrap()
    }

    #[tokio::test]
    async fn authenticate_recovers_within_three_attempts() {
        let mock = Arc::new(MockUpstream {
            auth_failures: 2,
            ..Default::default()
        });
        let client = client_for(&spawn_upstream(mock.clone()).await);

        let uid = client.authenticate().await.unwrap();

        assert_eq!(uid, 7);
        assert_eq!(client.session().await, Some(7));
        assert_eq!(mock.auth_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn authenticate_gives_up_after_three_attempts() {
        let mock = Arc::new(MockUpstream {
            auth_failures: 10,
            ..Default::default()
        });
        let client = client_for(&spawn_upstream(mock.clone()).await);

        let result = client.authenticate().await;

        assert!(matches!(result, Err(Error::UpstreamAuth(_))));
        assert_eq!(client.session().await, None);
        assert_eq!(mock.auth_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn call_authenticates_on_demand_and_returns_result() {
        let mock = Arc::new(MockUpstream::default());
        let client = client_for(&spawn_upstream(mock.clone()).await);

        let result = client
            .call("res.partner", "search_read", json!([[]]), json!({}))
            .await
            .unwrap();

        assert_eq!(result[0]["name"], "ok");
        assert_eq!(mock.auth_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn session_fault_forces_reauthentication_before_retry() {
        let mock = Arc::new(MockUpstream {
            execute_failures: 1,
            execute_fault: "Odoo Session Expired",
            ..Default::default()
        });
        let client = client_for(&spawn_upstream(mock.clone()).await);

        let result = client
            .call("res.partner", "read", json!([[1]]), json!({}))
            .await
            .unwrap();

        assert_eq!(result[0]["id"], 1);
        // Initial on-demand authentication plus the forced one.
        assert_eq!(mock.auth_calls.load(Ordering::SeqCst), 2);
        assert_eq!(mock.execute_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn call_surfaces_model_and_method_after_exhaustion() {
        let mock = Arc::new(MockUpstream {
            execute_failures: 10,
            execute_fault: "unrelated fault",
            ..Default::default()
        });
        let client = client_for(&spawn_upstream(mock.clone()).await);

        let result = client
            .call("stock.picking", "write", json!([[3]]), json!({}))
            .await;

        match result {
            Err(Error::UpstreamCall {
                model,
                method,
                message,
            }) => {
                assert_eq!(model, "stock.picking");
                assert_eq!(method, "write");
                assert!(message.contains("unrelated fault"));
            }
            other => panic!("expected UpstreamCall, got {:?}", other),
        }
        assert_eq!(mock.execute_calls.load(Ordering::SeqCst), 2);
    }
}
