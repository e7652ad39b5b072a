//! Application state.

use std::sync::Arc;
use std::time::Duration;

use vent_store::Store;

use crate::agent::{AgentDispatcher, AgentError, LiveKitAgentDispatcher};
use crate::billing::SubscriptionService;
use crate::config::ServiceConfig;
use crate::gateway::RazorpayClient;
use crate::ledger::SessionLedger;
use crate::media::{LiveKitIssuer, MediaIssuer, WebhookVerifier};
use crate::meter::UsageMeter;
use crate::rooms::RoomRegistry;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// User and room resolution.
    pub rooms: RoomRegistry,

    /// Quota checks and usage.
    pub meter: UsageMeter,

    /// Session start/end and reaping.
    pub ledger: SessionLedger,

    /// Subscription lifecycle.
    pub billing: SubscriptionService,

    /// Media access token issuer.
    pub media: Arc<dyn MediaIssuer>,

    /// Conversation agent dispatcher.
    pub agents: Arc<dyn AgentDispatcher>,

    /// Media-server webhook verifier (optional).
    pub media_webhooks: Option<WebhookVerifier>,

    /// Razorpay client (optional).
    pub gateway: Option<Arc<RazorpayClient>>,
}

impl AppState {
    /// Create application state with the LiveKit issuer and agent dispatcher
    /// from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the agent dispatch client cannot be built.
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Result<Self, AgentError> {
        if config.livekit_api_key.is_some() && config.livekit_api_secret.is_some() {
            tracing::info!(
                livekit_url = %config.livekit_url,
                agent_name = %config.agent_name,
                "LiveKit integration enabled"
            );
        } else {
            tracing::warn!("LiveKit not configured - session starts will fail as unavailable");
        }

        let media = Arc::new(LiveKitIssuer::new(
            config.livekit_url.clone(),
            config.livekit_api_key.clone(),
            config.livekit_api_secret.clone(),
            Duration::from_secs(config.livekit_token_ttl_seconds),
        ));
        let agents = Arc::new(LiveKitAgentDispatcher::new(
            &config.livekit_api_url(),
            config.agent_name.clone(),
            config.livekit_api_key.clone(),
            config.livekit_api_secret.clone(),
            Duration::from_secs(config.request_timeout_seconds),
        )?);
        Ok(Self::with_providers(store, config, media, agents))
    }

    /// Create application state with custom media and agent providers.
    #[must_use]
    pub fn with_providers(
        store: Arc<dyn Store>,
        config: ServiceConfig,
        media: Arc<dyn MediaIssuer>,
        agents: Arc<dyn AgentDispatcher>,
    ) -> Self {
        let gateway = config
            .razorpay_key_id
            .as_ref()
            .zip(config.razorpay_key_secret.as_ref())
            .and_then(|(key_id, key_secret)| {
                match RazorpayClient::new(&config.razorpay_base_url, key_id, key_secret) {
                    Ok(client) => {
                        tracing::info!("Razorpay integration enabled");
                        Some(Arc::new(client))
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to create Razorpay client");
                        None
                    }
                }
            });

        if gateway.is_none() {
            tracing::warn!("Razorpay not configured - subscriptions will not be available");
        }

        let media_webhooks = config
            .livekit_api_key
            .as_ref()
            .zip(config.livekit_api_secret.as_ref())
            .map(|(key, secret)| WebhookVerifier::new(key.clone(), secret.clone()));

        let timeout = config.store_timeout();
        let max_session = config.max_session_duration();

        let rooms = RoomRegistry::new(store.clone(), timeout);
        let meter = UsageMeter::new(store.clone(), timeout, config.quota_policy(), max_session);
        let ledger = SessionLedger::new(
            store.clone(),
            timeout,
            rooms.clone(),
            meter.clone(),
            media.clone(),
            agents.clone(),
        );
        let billing =
            SubscriptionService::new(store.clone(), timeout, gateway.clone(), config.grace_period());

        Self {
            store,
            config,
            rooms,
            meter,
            ledger,
            billing,
            media,
            agents,
            media_webhooks,
            gateway,
        }
    }

    /// Check if Razorpay is configured.
    #[must_use]
    pub fn has_gateway(&self) -> bool {
        self.gateway.is_some()
    }
}
