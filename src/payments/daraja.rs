use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::gateway::PaymentGateway;
use crate::payments::types::{AccessCredential, PushAck, PushRequest};
use crate::payments::utils::{GatewayHttpClient, RequestAuth};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
pub struct DarajaConfig {
    pub shortcode: String,
    pub passkey: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub oauth_url: String,
    pub stk_push_url: String,
    pub callback_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for DarajaConfig {
    fn default() -> Self {
        Self {
            shortcode: String::new(),
            passkey: String::new(),
            consumer_key: String::new(),
            consumer_secret: String::new(),
            oauth_url:
                "https://sandbox.safaricom.co.ke/oauth/v1/generate?grant_type=client_credentials"
                    .to_string(),
            stk_push_url: "https://sandbox.safaricom.co.ke/mpesa/stkpush/v1/processrequest"
                .to_string(),
            callback_url: String::new(),
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

impl DarajaConfig {
    pub fn from_env() -> PaymentResult<Self> {
        let defaults = Self::default();
        let config = Self {
            shortcode: std::env::var("MPESA_SHORTCODE").unwrap_or_default(),
            passkey: std::env::var("MPESA_PASSKEY").unwrap_or_default(),
            consumer_key: std::env::var("MPESA_CONSUMER_KEY").unwrap_or_default(),
            consumer_secret: std::env::var("MPESA_CONSUMER_SECRET").unwrap_or_default(),
            oauth_url: std::env::var("MPESA_OAUTH_URL").unwrap_or(defaults.oauth_url),
            stk_push_url: std::env::var("MPESA_STK_PUSH_URL").unwrap_or(defaults.stk_push_url),
            callback_url: std::env::var("MPESA_CALLBACK_URL").unwrap_or_default(),
            timeout_secs: std::env::var("MPESA_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30),
            max_retries: std::env::var("MPESA_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(3),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PaymentResult<()> {
        if self.shortcode.is_empty()
            || self.passkey.is_empty()
            || self.consumer_key.is_empty()
            || self.consumer_secret.is_empty()
        {
            return Err(PaymentError::Validation {
                message:
                    "MPESA_SHORTCODE, MPESA_PASSKEY, MPESA_CONSUMER_KEY and MPESA_CONSUMER_SECRET are required"
                        .to_string(),
                field: Some("mpesa".to_string()),
            });
        }
        if self.callback_url.is_empty() {
            return Err(PaymentError::Validation {
                message: "MPESA_CALLBACK_URL is required".to_string(),
                field: Some("MPESA_CALLBACK_URL".to_string()),
            });
        }
        Ok(())
    }
}

pub struct DarajaClient {
    config: DarajaConfig,
    http: GatewayHttpClient,
}

impl DarajaClient {
    pub fn new(config: DarajaConfig) -> PaymentResult<Self> {
        let http =
            GatewayHttpClient::new(Duration::from_secs(config.timeout_secs), config.max_retries)?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> PaymentResult<Self> {
        Self::new(DarajaConfig::from_env()?)
    }

    /// Fetches a fresh bearer credential from the identity endpoint. No
    /// caching: each push pays one extra round trip, acceptable at portal
    /// request volumes.
    async fn obtain_access_credential(&self) -> PaymentResult<AccessCredential> {
        self.http
            .request_json::<AccessCredential>(
                reqwest::Method::GET,
                &self.config.oauth_url,
                RequestAuth::Basic {
                    username: &self.config.consumer_key,
                    password: &self.config.consumer_secret,
                },
                None,
                true,
            )
            .await
            .map_err(|e| match e {
                PaymentError::PushFailed { message, .. } => {
                    PaymentError::UpstreamAuth { message }
                }
                other => other,
            })
    }

    /// Daraja password transform: base64(shortcode + passkey + timestamp).
    fn password(&self, timestamp: &str) -> String {
        BASE64.encode(format!(
            "{}{}{}",
            self.config.shortcode, self.config.passkey, timestamp
        ))
    }
}

#[async_trait]
impl PaymentGateway for DarajaClient {
    async fn request_push(&self, request: PushRequest) -> PaymentResult<PushAck> {
        request.validate()?;

        let credential = self.obtain_access_credential().await?;
        let timestamp = chrono::Utc::now().format("%Y%m%d%H%M%S").to_string();
        let password = self.password(&timestamp);

        let payload = serde_json::json!({
            "BusinessShortCode": self.config.shortcode,
            "Password": password,
            "Timestamp": timestamp,
            "TransactionType": "CustomerPayBillOnline",
            "Amount": request.amount.to_string(),
            "PartyA": request.phone_number,
            "PartyB": self.config.shortcode,
            "PhoneNumber": request.phone_number,
            "CallBackURL": self.config.callback_url,
            "AccountReference": request.reference,
            "TransactionDesc": request.description,
        });

        let raw: DarajaPushResponse = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.config.stk_push_url,
                RequestAuth::Bearer(&credential.access_token),
                Some(&payload),
                false,
            )
            .await?;

        if raw.response_code != "0" {
            return Err(PaymentError::PushFailed {
                message: raw
                    .response_description
                    .unwrap_or_else(|| format!("provider response code {}", raw.response_code)),
                provider_payload: None,
            });
        }

        info!(
            reference = %request.reference,
            checkout_request_id = %raw.checkout_request_id,
            "payment push accepted by provider"
        );

        Ok(PushAck {
            merchant_request_id: raw.merchant_request_id,
            checkout_request_id: raw.checkout_request_id,
            response_description: raw.response_description,
        })
    }
}

#[derive(Debug, Deserialize)]
struct DarajaPushResponse {
    #[serde(rename = "MerchantRequestID")]
    merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: String,
    #[serde(rename = "ResponseCode")]
    response_code: String,
    #[serde(rename = "ResponseDescription", default)]
    response_description: Option<String>,
}
