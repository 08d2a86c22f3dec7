use async_trait::async_trait;
use ocn_types::ContactIdentifier;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("delivery channel failure: {0}")]
    Channel(String),
}

/// Outbound delivery seam for OTP codes and claim links.
///
/// Real email/SMS transports live outside the network core; the bundled
/// implementations log or capture instead.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    async fn send_otp(&self, to: &ContactIdentifier, code: &str) -> Result<(), DeliveryError>;
    async fn send_claim_link(&self, to: &ContactIdentifier, url: &str) -> Result<(), DeliveryError>;
}

/// Default channel: structured log lines only.
#[derive(Debug, Default)]
pub struct TracingDelivery;

#[async_trait]
impl DeliveryChannel for TracingDelivery {
    async fn send_otp(&self, to: &ContactIdentifier, code: &str) -> Result<(), DeliveryError> {
        tracing::info!(
            method_type = %to.method_type,
            value = %to.value,
            code,
            "dispatching OTP code"
        );
        Ok(())
    }

    async fn send_claim_link(&self, to: &ContactIdentifier, url: &str) -> Result<(), DeliveryError> {
        tracing::info!(
            method_type = %to.method_type,
            value = %to.value,
            url,
            "dispatching claim link"
        );
        Ok(())
    }
}

/// Capturing channel used by tests to observe dispatched messages.
#[derive(Debug, Default)]
pub struct CaptureDelivery {
    pub otps: Mutex<Vec<(ContactIdentifier, String)>>,
    pub claim_links: Mutex<Vec<(ContactIdentifier, String)>>,
}

impl CaptureDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_otp(&self) -> Option<String> {
        self.otps
            .lock()
            .ok()
            .and_then(|v| v.last().map(|(_, code)| code.clone()))
    }

    pub fn last_claim_link(&self) -> Option<String> {
        self.claim_links
            .lock()
            .ok()
            .and_then(|v| v.last().map(|(_, url)| url.clone()))
    }
}

#[async_trait]
impl DeliveryChannel for CaptureDelivery {
    async fn send_otp(&self, to: &ContactIdentifier, code: &str) -> Result<(), DeliveryError> {
        self.otps
            .lock()
            .map_err(|_| DeliveryError::Channel("capture lock poisoned".into()))?
            .push((to.clone(), code.to_string()));
        Ok(())
    }

    async fn send_claim_link(&self, to: &ContactIdentifier, url: &str) -> Result<(), DeliveryError> {
        self.claim_links
            .lock()
            .map_err(|_| DeliveryError::Channel("capture lock poisoned".into()))?
            .push((to.clone(), url.to_string()));
        Ok(())
    }
}
