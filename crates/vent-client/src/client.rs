//! Vent HTTP client implementation.

use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::ClientError;
use crate::types::{
    ActiveSession, ApiErrorResponse, Cancellation, Checkout, CreateSubscriptionRequest,
    CreatedRoom, Plan, RoomInfo, ServerConfig, SetupRequest, SetupResponse, StartedSession,
    UsageStatus,
};

/// Vent API client.
///
/// Holds the caller's access token. Every call except
/// [`create_subscription`](Self::create_subscription) is safe to repeat and is
/// retried on transient failures.
#[derive(Debug, Clone)]
pub struct VentClient {
    client: Client,
    base_url: String,
    token: String,
    max_attempts: u32,
    retry_backoff: Duration,
}

/// Whether a request may be sent again after a transient failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retry {
    Yes,
    No,
}

impl VentClient {
    /// Create a new vent client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the vent API (e.g., `"https://api.vent.example"`)
    /// * `token` - The user's access token from the identity provider
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Configuration` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_options(base_url, token, ClientOptions::default())
    }

    /// Create a new vent client with custom options.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Configuration` if the HTTP client cannot be built.
    pub fn with_options(
        base_url: impl Into<String>,
        token: impl Into<String>,
        options: ClientOptions,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            .build()
            .map_err(|e| ClientError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            max_attempts: options.max_attempts.max(1),
            retry_backoff: Duration::from_millis(options.retry_backoff_ms),
        })
    }

    /// Replace the access token, e.g. after the identity provider refreshed it.
    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = token.into();
    }

    // ========================================================================
    // Server
    // ========================================================================

    /// Check that the backend is reachable.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ServerOffline` if it is not.
    pub async fn ping(&self) -> Result<(), ClientError> {
        self.execute(Method::GET, "/ping", None, Retry::Yes, false)
            .await
            .map(drop)
    }

    /// Public client configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn server_config(&self) -> Result<ServerConfig, ClientError> {
        let response = self
            .execute(Method::GET, "/config", None, Retry::Yes, false)
            .await?;
        Ok(response.json().await?)
    }

    // ========================================================================
    // Users and rooms
    // ========================================================================

    /// Resolve the caller's room, creating the user and room on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn room(&self) -> Result<RoomInfo, ClientError> {
        self.request(Method::GET, "/api/users/room", None, Retry::Yes)
            .await
    }

    /// Create the caller's room. Returns the existing room if there is one.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn create_room(&self) -> Result<CreatedRoom, ClientError> {
        self.request(Method::POST, "/api/rooms/create", None, Retry::Yes)
            .await
    }

    /// Complete onboarding.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn setup(&self, request: &SetupRequest) -> Result<SetupResponse, ClientError> {
        let body = serde_json::to_value(request)?;
        self.request(Method::POST, "/api/users/setup", Some(body), Retry::Yes)
            .await
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    /// Start a session, or resume the open one.
    ///
    /// # Errors
    ///
    /// - `ClientError::QuotaExceeded` if no sessions are left.
    /// - `ClientError::ServerOffline` if the backend or media server stays unavailable.
    pub async fn start_session(&self) -> Result<StartedSession, ClientError> {
        self.request(Method::POST, "/api/sessions/start", None, Retry::Yes)
            .await
    }

    /// End a session. Ending a session that already ended succeeds.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` if the session does not exist or is not the
    /// caller's.
    pub async fn end_session(&self, session_id: &str) -> Result<(), ClientError> {
        let path = format!("/api/sessions/{session_id}/end");
        self.execute(Method::POST, &path, None, Retry::Yes, true)
            .await
            .map(drop)
    }

    /// The caller's open sessions.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn active_sessions(&self) -> Result<Vec<ActiveSession>, ClientError> {
        self.request(Method::GET, "/api/sessions/active", None, Retry::Yes)
            .await
    }

    // ========================================================================
    // Plans and payments
    // ========================================================================

    /// Available plans, cheapest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn plans(&self) -> Result<Vec<Plan>, ClientError> {
        self.request(Method::GET, "/api/plans", None, Retry::Yes)
            .await
    }

    /// The caller's usage status.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn usage(&self) -> Result<UsageStatus, ClientError> {
        self.request(Method::GET, "/api/payments/usage", None, Retry::Yes)
            .await
    }

    /// Start checkout for a plan.
    ///
    /// Not retried: a request that timed out may still have created the
    /// subscription. Check [`usage`](Self::usage) before trying again.
    ///
    /// # Errors
    ///
    /// - `ClientError::Conflict` if the caller already has a live subscription.
    /// - `ClientError::ServerOffline` if the backend is unavailable.
    pub async fn create_subscription(
        &self,
        request: &CreateSubscriptionRequest,
    ) -> Result<Checkout, ClientError> {
        let body = serde_json::to_value(request)?;
        self.request(
            Method::POST,
            "/api/payments/create-subscription",
            Some(body),
            Retry::No,
        )
        .await
    }

    /// Cancel the subscription at the end of the current period.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` if there is nothing to cancel.
    pub async fn cancel_subscription(&self) -> Result<Cancellation, ClientError> {
        self.request(
            Method::POST,
            "/api/payments/cancel-subscription",
            None,
            Retry::Yes,
        )
        .await
    }

    // ========================================================================
    // Transport
    // ========================================================================

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        retry: Retry,
    ) -> Result<T, ClientError> {
        let response = self.execute(method, path, body, retry, true).await?;
        Ok(response.json().await?)
    }

    /// Send a request, retrying transient failures with exponential backoff.
    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        retry: Retry,
        authenticated: bool,
    ) -> Result<reqwest::Response, ClientError> {
        let url = format!("{}{path}", self.base_url);
        let attempts = match retry {
            Retry::Yes => self.max_attempts,
            Retry::No => 1,
        };
        let mut backoff = self.retry_backoff;

        for attempt in 1..=attempts {
            let mut request = self.client.request(method.clone(), &url);
            if authenticated {
                request = request.bearer_auth(&self.token);
            }
            if let Some(body) = &body {
                request = request.json(body);
            }

            match request.send().await {
                Ok(response) if is_transient(response.status()) => {
                    tracing::debug!(
                        path = %path,
                        status = %response.status(),
                        attempt,
                        "Transient response from server"
                    );
                }
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => return Err(Self::error_from(response).await),
                Err(e) if e.is_connect() || e.is_timeout() => {
                    tracing::debug!(path = %path, error = %e, attempt, "Server unreachable");
                }
                Err(e) => return Err(e.into()),
            }

            if attempt < attempts {
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
        }

        tracing::warn!(path = %path, attempts, "Server offline");
        Err(ClientError::ServerOffline { attempts })
    }

    /// Convert an error response into a typed error.
    async fn error_from(response: reqwest::Response) -> ClientError {
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            return ClientError::Unauthorized;
        }

        let Ok(api_error) = response.json::<ApiErrorResponse>().await else {
            return ClientError::Api {
                code: "unknown".to_string(),
                message: format!("HTTP {status}"),
                status: status.as_u16(),
            };
        };

        let error = api_error.error;
        match (status, error.code.as_str()) {
            (_, "quota_exceeded") => {
                let details = error.details.as_ref();
                ClientError::QuotaExceeded {
                    remaining: details
                        .and_then(|d| d.get("remaining"))
                        .and_then(serde_json::Value::as_i64)
                        .unwrap_or(0),
                    status: details
                        .and_then(|d| d.get("status"))
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or("unknown")
                        .to_string(),
                }
            }
            (StatusCode::NOT_FOUND, _) => ClientError::NotFound(error.message),
            (StatusCode::CONFLICT, _) => ClientError::Conflict(error.message),
            _ => ClientError::Api {
                code: error.code,
                message: error.message,
                status: status.as_u16(),
            },
        }
    }
}

/// 503 and 504 mean "try again"; 502 carries a payment gateway rejection.
fn is_transient(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    )
}

/// Client options for customization.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Request timeout in seconds (default: 8).
    pub timeout_seconds: u64,
    /// Attempts per retryable call, including the first (default: 3).
    pub max_attempts: u32,
    /// Delay before the first retry, doubled for each further one (default: 500ms).
    pub retry_backoff_ms: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_seconds: 8,
            max_attempts: 3,
            retry_backoff_ms: 500,
        }
    }
}
