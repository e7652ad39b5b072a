//! Media access tokens and media-server webhooks.
//!
//! Access tokens are LiveKit JWTs scoped to one room and one identity. Tokens are
//! minted only after the session ledger has opened (or resumed) a session and carry
//! nothing the ledger did not validate.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use vent_core::{UserId, VentError};

use crate::crypto::{constant_time_eq, sha256_base64};

/// Errors from the media access issuer.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    /// API credentials are missing.
    #[error("media server credentials not configured")]
    NotConfigured,

    /// The token could not be signed.
    #[error("token signing failed: {0}")]
    Signing(String),

    /// The media server could not be reached.
    #[error("media server unavailable: {0}")]
    Unavailable(String),

    /// A webhook failed verification.
    #[error("invalid webhook signature")]
    InvalidSignature,

    /// A webhook body could not be parsed.
    #[error("invalid webhook payload: {0}")]
    InvalidPayload(String),
}

impl From<MediaError> for VentError {
    fn from(err: MediaError) -> Self {
        // Every issuing failure is retryable from the caller's point of view.
        Self::Unavailable(err.to_string())
    }
}

/// A minted media access grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaGrant {
    /// Signed access token.
    pub token: String,
    /// Media server URL to connect to.
    pub url: String,
    /// Token expiry.
    pub expires_at: DateTime<Utc>,
}

/// Issues short-lived media-server access tokens.
#[async_trait]
pub trait MediaIssuer: Send + Sync {
    /// Mint a token for `user_id` scoped to `room_name`.
    ///
    /// # Errors
    ///
    /// Returns a `MediaError` if the token cannot be issued; callers treat every
    /// failure as retryable.
    async fn issue_token(&self, user_id: &UserId, room_name: &str)
        -> Result<MediaGrant, MediaError>;

    /// Media server URL handed to clients.
    fn server_url(&self) -> &str;
}

// ============================================================================
// LiveKit
// ============================================================================

/// Video grant of a LiveKit access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoGrant {
    /// May join the room.
    #[serde(rename = "roomJoin", skip_serializing_if = "Option::is_none")]
    pub room_join: Option<bool>,
    /// Room the grant is scoped to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    /// May publish tracks.
    #[serde(rename = "canPublish", skip_serializing_if = "Option::is_none")]
    pub can_publish: Option<bool>,
    /// May subscribe to tracks.
    #[serde(rename = "canSubscribe", skip_serializing_if = "Option::is_none")]
    pub can_subscribe: Option<bool>,
    /// May publish data messages.
    #[serde(rename = "canPublishData", skip_serializing_if = "Option::is_none")]
    pub can_publish_data: Option<bool>,
    /// May administer the room (server API calls).
    #[serde(rename = "roomAdmin", skip_serializing_if = "Option::is_none")]
    pub room_admin: Option<bool>,
}

impl VideoGrant {
    /// Grant for server API calls against one room.
    #[must_use]
    pub fn room_admin(room_name: &str) -> Self {
        Self {
            room_join: None,
            room: Some(room_name.to_string()),
            can_publish: None,
            can_subscribe: None,
            can_publish_data: None,
            room_admin: Some(true),
        }
    }
}

/// Claims of a LiveKit access token.
#[derive(Debug, Serialize, Deserialize)]
pub struct LiveKitClaims {
    /// Expiry (seconds since epoch).
    pub exp: i64,
    /// Not before (seconds since epoch).
    pub nbf: i64,
    /// API key.
    pub iss: String,
    /// Participant identity.
    pub sub: String,
    /// Participant display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Room permissions.
    pub video: VideoGrant,
}

/// LiveKit access token issuer.
#[derive(Debug, Clone)]
pub struct LiveKitIssuer {
    url: String,
    credentials: Option<(String, String)>,
    ttl: Duration,
}

impl LiveKitIssuer {
    /// Create an issuer. Without credentials every issue attempt fails as unavailable.
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        api_key: Option<String>,
        api_secret: Option<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            url: url.into(),
            credentials: api_key.zip(api_secret),
            ttl,
        }
    }

    fn sign(&self, user_id: &UserId, room_name: &str) -> Result<MediaGrant, MediaError> {
        let (api_key, api_secret) = self.credentials.as_ref().ok_or(MediaError::NotConfigured)?;

        let now = Utc::now();
        let ttl = chrono::Duration::from_std(self.ttl)
            .map_err(|e| MediaError::Signing(e.to_string()))?;
        let expires_at = now + ttl;

        let claims = LiveKitClaims {
            exp: expires_at.timestamp(),
            nbf: now.timestamp(),
            iss: api_key.clone(),
            sub: user_id.to_string(),
            name: None,
            video: VideoGrant {
                room_join: Some(true),
                room: Some(room_name.to_string()),
                can_publish: Some(true),
                can_subscribe: Some(true),
                can_publish_data: Some(true),
                room_admin: None,
            },
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(api_secret.as_bytes()),
        )
        .map_err(|e| MediaError::Signing(e.to_string()))?;

        Ok(MediaGrant {
            token,
            url: self.url.clone(),
            expires_at,
        })
    }
}

#[async_trait]
impl MediaIssuer for LiveKitIssuer {
    async fn issue_token(
        &self,
        user_id: &UserId,
        room_name: &str,
    ) -> Result<MediaGrant, MediaError> {
        self.sign(user_id, room_name)
    }

    fn server_url(&self) -> &str {
        &self.url
    }
}

/// Sign a short-lived server token for LiveKit API calls.
pub(crate) fn server_token(
    api_key: &str,
    api_secret: &str,
    grant: VideoGrant,
    ttl: chrono::Duration,
) -> Result<String, MediaError> {
    let now = Utc::now();
    let claims = LiveKitClaims {
        exp: (now + ttl).timestamp(),
        nbf: now.timestamp(),
        iss: api_key.to_string(),
        sub: "vent-service".to_string(),
        name: None,
        video: grant,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(api_secret.as_bytes()),
    )
    .map_err(|e| MediaError::Signing(e.to_string()))
}

// ============================================================================
// Webhooks
// ============================================================================

/// Parsed LiveKit webhook event.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    /// Event name (`room_started`, `room_finished`, ...).
    pub event: String,
    /// Room the event concerns.
    #[serde(default)]
    pub room: Option<WebhookRoom>,
    /// Event ID.
    #[serde(default)]
    pub id: Option<String>,
}

/// Room section of a webhook event.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookRoom {
    /// Room name.
    #[serde(default)]
    pub name: Option<String>,
    /// Server-assigned room SID.
    #[serde(default)]
    pub sid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WebhookClaims {
    iss: String,
    sha256: String,
}

/// Verifies LiveKit webhook signatures.
///
/// LiveKit sends a JWT in the `Authorization` header, signed with the API secret,
/// whose `sha256` claim is the base64 SHA-256 of the body.
#[derive(Debug, Clone)]
pub struct WebhookVerifier {
    api_key: String,
    api_secret: String,
}

impl WebhookVerifier {
    /// Create a verifier for the given API credentials.
    #[must_use]
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    /// Verify the signature and parse the event.
    ///
    /// # Errors
    ///
    /// Returns `MediaError::InvalidSignature` if the token or digest does not match,
    /// `MediaError::InvalidPayload` if the body is not an event.
    pub fn verify(&self, body: &str, authorization: &str) -> Result<WebhookEvent, MediaError> {
        let token = authorization
            .strip_prefix("Bearer ")
            .unwrap_or(authorization);

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "iss"]);

        let claims = decode::<WebhookClaims>(
            token,
            &DecodingKey::from_secret(self.api_secret.as_bytes()),
            &validation,
        )
        .map_err(|_| MediaError::InvalidSignature)?
        .claims;

        let digest = sha256_base64(body.as_bytes());
        if claims.iss != self.api_key || !constant_time_eq(&claims.sha256, &digest) {
            return Err(MediaError::InvalidSignature);
        }

        parse_webhook_event(body)
    }
}

/// Parse a webhook body without verification.
///
/// # Errors
///
/// Returns `MediaError::InvalidPayload` if the body is not an event.
pub fn parse_webhook_event(body: &str) -> Result<WebhookEvent, MediaError> {
    serde_json::from_str(body).map_err(|e| MediaError::InvalidPayload(e.to_string()))
}
