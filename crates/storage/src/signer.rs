use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use trustlink_core::session::SessionProvider;

use crate::error::StorageError;
use crate::reference::ObjectLocation;

/// Issues time-limited signed URLs for stored objects.
///
/// `Ok(None)` means the service answered but did not include a URL.
#[async_trait]
pub trait UrlSigner: Send + Sync {
    async fn create_signed_url(
        &self,
        location: &ObjectLocation,
        expires_in: Duration,
    ) -> Result<Option<String>, StorageError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignRequest {
    expires_in: u64,
}

#[derive(Deserialize)]
struct SignResponse {
    #[serde(rename = "signedURL", alias = "signedUrl", default)]
    signed_url: Option<String>,
}

/// Client for the storage service's signing endpoint.
pub struct StorageClient {
    client: reqwest::Client,
    storage_url: String,
    anon_key: String,
    session: Arc<dyn SessionProvider>,
}

impl StorageClient {
    pub fn new(
        client: reqwest::Client,
        storage_url: String,
        anon_key: String,
        session: Arc<dyn SessionProvider>,
    ) -> Self {
        Self {
            client,
            storage_url,
            anon_key,
            session,
        }
    }

    fn absolute(&self, signed: String) -> String {
        if signed.starts_with("http://") || signed.starts_with("https://") {
            signed
        } else {
            format!("{}{}", self.storage_url, signed)
        }
    }
}

#[async_trait]
impl UrlSigner for StorageClient {
    async fn create_signed_url(
        &self,
        location: &ObjectLocation,
        expires_in: Duration,
    ) -> Result<Option<String>, StorageError> {
        let url = format!(
            "{}/object/sign/{}/{}",
            self.storage_url, location.bucket, location.path
        );
        let token = self
            .session
            .access_token()
            .await
            .unwrap_or_else(|| self.anon_key.clone());

        let resp = self
            .client
            .post(&url)
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .json(&SignRequest {
                expires_in: expires_in.as_secs(),
            })
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(StorageError::Status { status, body });
        }

        let body: SignResponse = resp.json().await?;
        debug!(
            bucket = %location.bucket,
            path = %location.path,
            expires_in = expires_in.as_secs(),
            signed = body.signed_url.is_some(),
            "signing request answered"
        );
        Ok(body
            .signed_url
            .filter(|s| !s.is_empty())
            .map(|signed| self.absolute(signed)))
    }
}
