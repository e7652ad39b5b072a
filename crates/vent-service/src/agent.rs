//! Conversation agent dispatch.
//!
//! A running session has the AI agent in its room. The ledger dispatches the agent
//! when a session starts or resumes and releases it when the session closes.
//! LiveKit keeps the dispatch records, so any instance can release an agent
//! another instance dispatched.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use vent_core::VentError;

use crate::media::{server_token, MediaError, VideoGrant};

/// Lifetime of the server tokens used for dispatch calls.
const SERVER_TOKEN_TTL_SECONDS: i64 = 60;

/// Errors from the agent dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// API credentials are missing.
    #[error("agent dispatch credentials not configured")]
    NotConfigured,

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The dispatch API returned an error.
    #[error("agent dispatch API error ({status}): {message}")]
    Api {
        /// HTTP status.
        status: u16,
        /// Error message.
        message: String,
    },

    /// The server token could not be signed.
    #[error("token signing failed: {0}")]
    Signing(String),
}

impl From<MediaError> for AgentError {
    fn from(err: MediaError) -> Self {
        Self::Signing(err.to_string())
    }
}

impl From<AgentError> for VentError {
    fn from(err: AgentError) -> Self {
        // Without its agent a session is useless; every failure is retryable.
        Self::Unavailable(err.to_string())
    }
}

/// An agent dispatched into a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDispatch {
    /// Dispatch ID.
    #[serde(default)]
    pub id: String,
    /// Name the agent worker registered with.
    #[serde(default, alias = "agentName")]
    pub agent_name: String,
    /// Room the agent was dispatched to.
    #[serde(default)]
    pub room: String,
}

/// Places the conversation agent in media rooms.
#[async_trait]
pub trait AgentDispatcher: Send + Sync {
    /// Make sure the agent is dispatched to `room_name`. Calling it again for a
    /// room that already has the agent returns the existing dispatch.
    ///
    /// # Errors
    ///
    /// Returns an `AgentError` if the dispatch cannot be confirmed.
    async fn dispatch(&self, room_name: &str) -> Result<AgentDispatch, AgentError>;

    /// Remove the agent from `room_name`. Returns how many dispatches were removed.
    ///
    /// # Errors
    ///
    /// Returns an `AgentError` if the dispatch API cannot be reached.
    async fn release(&self, room_name: &str) -> Result<usize, AgentError>;
}

// ============================================================================
// LiveKit
// ============================================================================

#[derive(Debug, Serialize)]
struct CreateDispatchRequest<'a> {
    agent_name: &'a str,
    room: &'a str,
}

#[derive(Debug, Serialize)]
struct ListDispatchRequest<'a> {
    room: &'a str,
}

#[derive(Debug, Deserialize)]
struct ListDispatchResponse {
    #[serde(default, alias = "agentDispatches")]
    agent_dispatches: Vec<AgentDispatch>,
}

#[derive(Debug, Serialize)]
struct DeleteDispatchRequest<'a> {
    dispatch_id: &'a str,
    room: &'a str,
}

#[derive(Debug, Deserialize)]
struct TwirpError {
    #[serde(default)]
    msg: String,
}

/// Agent dispatcher backed by LiveKit's `AgentDispatchService`.
#[derive(Debug, Clone)]
pub struct LiveKitAgentDispatcher {
    client: Client,
    api_url: String,
    agent_name: String,
    credentials: Option<(String, String)>,
}

impl LiveKitAgentDispatcher {
    /// Create a dispatcher. Without credentials every call fails as unavailable.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        api_url: &str,
        agent_name: impl Into<String>,
        api_key: Option<String>,
        api_secret: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AgentError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            agent_name: agent_name.into(),
            credentials: api_key.zip(api_secret),
        })
    }

    /// Agent worker name dispatched into rooms.
    #[must_use]
    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    async fn call<B, T>(&self, method: &str, room_name: &str, body: &B) -> Result<T, AgentError>
    where
        B: Serialize + Sync,
        T: serde::de::DeserializeOwned,
    {
        let (api_key, api_secret) = self.credentials.as_ref().ok_or(AgentError::NotConfigured)?;
        let token = server_token(
            api_key,
            api_secret,
            VideoGrant::room_admin(room_name),
            chrono::Duration::seconds(SERVER_TOKEN_TTL_SECONDS),
        )?;

        let response = self
            .client
            .post(format!(
                "{}/twirp/livekit.AgentDispatchService/{method}",
                self.api_url
            ))
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let message = response
            .json::<TwirpError>()
            .await
            .map_or_else(|_| format!("HTTP {status}"), |e| e.msg);
        Err(AgentError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn list(&self, room_name: &str) -> Result<Vec<AgentDispatch>, AgentError> {
        let listed: ListDispatchResponse = self
            .call("ListDispatch", room_name, &ListDispatchRequest { room: room_name })
            .await?;
        Ok(listed
            .agent_dispatches
            .into_iter()
            .filter(|d| d.agent_name == self.agent_name)
            .collect())
    }
}

#[async_trait]
impl AgentDispatcher for LiveKitAgentDispatcher {
    async fn dispatch(&self, room_name: &str) -> Result<AgentDispatch, AgentError> {
        if let Some(existing) = self.list(room_name).await?.into_iter().next() {
            tracing::debug!(room_name = %room_name, dispatch_id = %existing.id, "Agent already dispatched");
            return Ok(existing);
        }

        let dispatch: AgentDispatch = self
            .call(
                "CreateDispatch",
                room_name,
                &CreateDispatchRequest {
                    agent_name: &self.agent_name,
                    room: room_name,
                },
            )
            .await?;
        tracing::info!(room_name = %room_name, dispatch_id = %dispatch.id, "Agent dispatched");
        Ok(dispatch)
    }

    async fn release(&self, room_name: &str) -> Result<usize, AgentError> {
        let dispatches = self.list(room_name).await?;
        for dispatch in &dispatches {
            let _: AgentDispatch = self
                .call(
                    "DeleteDispatch",
                    room_name,
                    &DeleteDispatchRequest {
                        dispatch_id: &dispatch.id,
                        room: room_name,
                    },
                )
                .await?;
            tracing::info!(room_name = %room_name, dispatch_id = %dispatch.id, "Agent released");
        }
        Ok(dispatches.len())
    }
}
