use crate::payments::error::{PaymentError, PaymentResult};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::warn;

/// Credentials attached to an outbound provider request.
#[derive(Clone, Copy)]
pub enum RequestAuth<'a> {
    Bearer(&'a str),
    Basic { username: &'a str, password: &'a str },
}

#[derive(Clone)]
pub struct GatewayHttpClient {
    client: Client,
    timeout: Duration,
    max_retries: u32,
}

impl GatewayHttpClient {
    pub fn new(timeout: Duration, max_retries: u32) -> PaymentResult<Self> {
        let client =
            Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| PaymentError::Network {
                    message: format!("failed to initialize HTTP client: {}", e),
                })?;

        Ok(Self {
            client,
            timeout,
            max_retries,
        })
    }

    /// Sends a JSON request and decodes the response body. Only `retryable`
    /// requests are retried on transient failures; a payment push must pass
    /// `false` since a resubmitted push prompts the subscriber a second time.
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        url: &str,
        auth: RequestAuth<'_>,
        body: Option<&JsonValue>,
        retryable: bool,
    ) -> PaymentResult<T> {
        let retries = if retryable { self.max_retries } else { 0 };
        let mut last_error = None;

        for attempt in 0..=retries {
            let mut request = self.client.request(method.clone(), url);
            request = request.timeout(self.timeout);

            request = match auth {
                RequestAuth::Bearer(token) => request.bearer_auth(token),
                RequestAuth::Basic { username, password } => {
                    request.basic_auth(username, Some(password))
                }
            };
            if let Some(payload) = body {
                request = request.json(payload);
            }

            let response = request
                .send()
                .await
                .map_err(|e| PaymentError::Network {
                    message: format!("provider request failed: {}", e),
                });

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    if status.is_success() {
                        return serde_json::from_str::<T>(&text).map_err(|e| {
                            PaymentError::PushFailed {
                                message: format!("invalid provider JSON response: {}", e),
                                provider_payload: None,
                            }
                        });
                    }

                    if status.is_server_error() && attempt < retries {
                        warn!(
                            status = %status,
                            attempt = attempt + 1,
                            "provider server error, retrying"
                        );
                        tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                        continue;
                    }

                    return Err(PaymentError::PushFailed {
                        message: format!("HTTP {}: {}", status, text),
                        provider_payload: serde_json::from_str(&text).ok(),
                    });
                }
                Err(e) => {
                    last_error = Some(e);
                    if attempt < retries {
                        tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                        continue;
                    }
                }
            }
        }

        Err(last_error.unwrap_or(PaymentError::Network {
            message: "provider request failed".to_string(),
        }))
    }
}
