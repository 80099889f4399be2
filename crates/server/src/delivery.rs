//! Outbound SMS delivery through the salon's point-of-sale web portal. The
//! portal expects a multipart form and an authenticated session cookie; it
//! answers with the message id it assigned.

use async_trait::async_trait;
use reqwest::multipart::Form;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use barkline_core::config::DeliveryConfig;
use barkline_core::domain::ClientId;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("delivery transport failed: {0}")]
    Transport(String),
    #[error("delivery rejected the message: {0}")]
    Rejected(String),
    #[error("delivery session token is not configured")]
    MissingCredentials,
}

#[derive(Clone, Debug)]
pub struct OutboundSms {
    pub phone: String,
    pub body: String,
    pub client_id: Option<ClientId>,
}

/// Sends one SMS. Returns the message id the portal assigned, when it reports
/// one.
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    async fn send(&self, sms: &OutboundSms) -> Result<Option<i64>, DeliveryError>;
}

pub struct PortalDeliveryClient {
    client: Client,
    base_url: String,
    session_token: Option<SecretString>,
}

impl PortalDeliveryClient {
    pub fn from_config(config: &DeliveryConfig) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| DeliveryError::Transport(error.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            session_token: config.session_token.clone(),
        })
    }

    fn session_token(&self) -> Result<&str, DeliveryError> {
        self.session_token
            .as_ref()
            .map(|token| token.expose_secret())
            .ok_or(DeliveryError::MissingCredentials)
    }
}

#[async_trait]
impl DeliveryClient for PortalDeliveryClient {
    async fn send(&self, sms: &OutboundSms) -> Result<Option<i64>, DeliveryError> {
        let client_id = sms.client_id.map(|id| id.0).unwrap_or(0);
        let form = Form::new()
            .text("phoneNumber", sms.phone.clone())
            .text("Message", sms.body.clone())
            .text("MediaLinks", String::new())
            .text("ClientId", client_id.to_string())
            .text("MessageId", "0");

        let response = self
            .client
            .post(format!("{}/SMS/SMSSendFromFront", self.base_url))
            .header("Cookie", self.session_token()?)
            .header("X-Requested-With", "XMLHttpRequest")
            .multipart(form)
            .send()
            .await
            .map_err(|error| DeliveryError::Transport(error.to_string()))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|error| DeliveryError::Transport(error.to_string()))?;

        if !status.is_success() {
            return Err(DeliveryError::Rejected(format!("portal returned {status}")));
        }
        if payload.get("success").and_then(Value::as_bool) == Some(false) {
            let detail = payload
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unspecified portal error");
            return Err(DeliveryError::Rejected(detail.to_string()));
        }

        let message_id = payload.get("message_id").and_then(Value::as_i64);
        info!(
            event_name = "delivery.sms.sent",
            phone = %sms.phone,
            message_id = message_id.unwrap_or(0),
            "outbound sms delivered"
        );
        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use barkline_core::config::DeliveryConfig;

    use super::{DeliveryError, PortalDeliveryClient};

    #[test]
    fn missing_session_token_is_a_credential_error() {
        let config = DeliveryConfig {
            base_url: "https://pos.example.com/".to_string(),
            session_token: None,
            timeout_secs: 15,
        };
        let client = PortalDeliveryClient::from_config(&config).unwrap();
        assert!(matches!(client.session_token(), Err(DeliveryError::MissingCredentials)));
        assert_eq!(client.base_url, "https://pos.example.com");
    }

    #[test]
    fn configured_token_is_exposed_for_the_cookie_header() {
        let config = DeliveryConfig {
            base_url: "https://pos.example.com".to_string(),
            session_token: Some("session=abc123".to_string().into()),
            timeout_secs: 15,
        };
        let client = PortalDeliveryClient::from_config(&config).unwrap();
        assert_eq!(client.session_token().unwrap(), "session=abc123");
    }
}
