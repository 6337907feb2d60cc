use std::net::IpAddr;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use rsa::RsaPublicKey;

/// Wraps a `reqwest::Client` with the two send-side behaviors the original
/// composes as chained `http.RoundTripper`s: encrypt the body under the
/// configured public key, then stamp `X-Real-IP` with the agent's own
/// address. Reqwest has no round-tripper abstraction, so both steps happen
/// here instead, in the same order the Go client applies them.
pub struct Transport {
    client: Client,
    public_key: Option<RsaPublicKey>,
    local_ip: IpAddr,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("encrypting body: {0}")]
    Encrypt(#[from] crate::crypto::CryptoError),

    #[error("server responded {0}")]
    NonOk(StatusCode),
}

impl Transport {
    pub fn new(timeout: Duration, public_key: Option<RsaPublicKey>, local_ip: IpAddr) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builder never fails with this configuration");
        Self {
            client,
            public_key,
            local_ip,
        }
    }

    pub async fn post(
        &self,
        url: &str,
        body: Vec<u8>,
        content_type: &'static str,
    ) -> Result<(), TransportError> {
        let body = match &self.public_key {
            Some(key) => crate::crypto::encrypt(key, &body)?,
            None => body,
        };

        let response = self
            .client
            .post(url)
            .header("Content-Type", content_type)
            .header("X-Real-IP", self.local_ip.to_string())
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TransportError::NonOk(response.status()));
        }

        Ok(())
    }
}
