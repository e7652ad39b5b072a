//! Razorpay API client implementation.

use reqwest::{Client, StatusCode};
use std::time::Duration;

use vent_core::VentError;

use super::types::{
    CancelSubscription, CreateCustomer, CreateSubscription, Customer, GatewaySubscription, Notes,
    RazorpayErrorResponse,
};

/// Billing cycles requested for a new subscription (ten years of monthly cycles).
const SUBSCRIPTION_TOTAL_COUNT: u32 = 120;

/// Error type for Razorpay operations.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Razorpay returned an error.
    #[error("Razorpay API error ({status}): {code} - {message}")]
    Api {
        /// HTTP status.
        status: u16,
        /// Error code.
        code: String,
        /// Error description.
        message: String,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid webhook signature.
    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<GatewayError> for VentError {
    fn from(err: GatewayError) -> Self {
        match &err {
            GatewayError::Http(e) if e.is_timeout() || e.is_connect() => {
                Self::Unavailable(err.to_string())
            }
            GatewayError::Api { status, .. } if *status >= 500 => {
                Self::Unavailable(err.to_string())
            }
            _ => Self::ExternalService {
                service: "razorpay".into(),
                message: err.to_string(),
            },
        }
    }
}

/// Razorpay API client.
#[derive(Debug, Clone)]
pub struct RazorpayClient {
    client: Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl RazorpayClient {
    /// Create a new Razorpay client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - API base URL (`https://api.razorpay.com/v1`)
    /// * `key_id` - API key ID (`rzp_test_...` or `rzp_live_...`)
    /// * `key_secret` - API key secret
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Configuration` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| GatewayError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key_id: key_id.into(),
            key_secret: key_secret.into(),
        })
    }

    /// Public key ID, handed to the checkout widget.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Create a customer, or return the existing one with the same email.
    pub async fn create_customer(
        &self,
        user_id: &str,
        email: Option<&str>,
        name: Option<&str>,
    ) -> Result<Customer, GatewayError> {
        let body = CreateCustomer {
            name,
            email,
            fail_existing: "0",
            notes: Notes { user_id },
        };

        let response = self
            .client
            .post(format!("{}/customers", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Create a subscription for a gateway plan.
    pub async fn create_subscription(
        &self,
        user_id: &str,
        gateway_plan_id: &str,
        customer_id: Option<&str>,
    ) -> Result<GatewaySubscription, GatewayError> {
        let body = CreateSubscription {
            plan_id: gateway_plan_id,
            total_count: SUBSCRIPTION_TOTAL_COUNT,
            customer_id,
            customer_notify: 1,
            notes: Notes { user_id },
        };

        tracing::debug!(
            user_id = %user_id,
            gateway_plan_id = %gateway_plan_id,
            "Creating Razorpay subscription"
        );

        let response = self
            .client
            .post(format!("{}/subscriptions", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Cancel a subscription, either immediately or at the end of the current cycle.
    pub async fn cancel_subscription(
        &self,
        subscription_id: &str,
        at_cycle_end: bool,
    ) -> Result<GatewaySubscription, GatewayError> {
        let response = self
            .client
            .post(format!(
                "{}/subscriptions/{}/cancel",
                self.base_url, subscription_id
            ))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&CancelSubscription {
                cancel_at_cycle_end: u8::from(at_cycle_end),
            })
            .send()
            .await?;

        self.handle_response(response).await
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        let error_body: Result<RazorpayErrorResponse, _> = response.json().await;

        match error_body {
            Ok(body) => Err(GatewayError::Api {
                status: status.as_u16(),
                code: body.error.code,
                message: body.error.description,
            }),
            Err(_) => Err(GatewayError::Api {
                status: status.as_u16(),
                code: "unknown".to_string(),
                message: format!("HTTP {status}"),
            }),
        }
    }
}

/// Whether a gateway error means the referenced object does not exist.
#[must_use]
pub fn is_not_found(err: &GatewayError) -> bool {
    matches!(err, GatewayError::Api { status, .. } if *status == StatusCode::NOT_FOUND.as_u16())
}
