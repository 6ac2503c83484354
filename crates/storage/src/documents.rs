//! Invoice PDF download with server-side regeneration.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use trustlink_core::session::SessionProvider;

use crate::resolver::{SignedUrlResolver, LONG_LIVED_LIFETIME};

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("No active session")]
    NoSession,
    #[error("failed to regenerate invoice {invoice_id} (HTTP {status}): {body}")]
    Regeneration {
        invoice_id: String,
        status: u16,
        body: String,
    },
    #[error("no file URL in response")]
    MissingFileUrl,
    #[error("failed to fetch PDF from storage")]
    Fetch { status: Option<u16> },
    #[error("download request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegenerateRequest<'a> {
    invoice_id: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegenerateResponse {
    #[serde(default)]
    file_url: Option<String>,
}

pub fn invoice_file_name(invoice_number: &str) -> String {
    format!("invoice-{}.pdf", invoice_number)
}

pub struct InvoiceDownloader {
    client: reqwest::Client,
    resolver: Arc<SignedUrlResolver>,
    session: Arc<dyn SessionProvider>,
    regenerate_url: String,
    anon_key: String,
}

impl InvoiceDownloader {
    pub fn new(
        client: reqwest::Client,
        resolver: Arc<SignedUrlResolver>,
        session: Arc<dyn SessionProvider>,
        regenerate_url: String,
        anon_key: String,
    ) -> Self {
        Self {
            client,
            resolver,
            session,
            regenerate_url,
            anon_key,
        }
    }

    /// Fetches the invoice PDF from its stored URL, regenerating it when the
    /// stored copy is missing or unreachable.
    pub async fn download_invoice(
        &self,
        invoice_id: &str,
        stored_url: Option<&str>,
        invoice_number: Option<&str>,
    ) -> Result<Vec<u8>, DownloadError> {
        let number = invoice_number.unwrap_or(invoice_id);

        if let Some(stored) = stored_url.filter(|u| !u.is_empty()) {
            let url = self.resolver.resolve(stored, LONG_LIVED_LIFETIME).await;
            match self.client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    let bytes = resp.bytes().await?;
                    info!(%invoice_id, %number, size = bytes.len(), "invoice downloaded");
                    return Ok(bytes.to_vec());
                }
                Ok(resp) => {
                    warn!(
                        %invoice_id,
                        status = resp.status().as_u16(),
                        "stored invoice unavailable, regenerating"
                    );
                }
                Err(err) => {
                    warn!(%invoice_id, error = %err, "stored invoice fetch failed, regenerating");
                }
            }
        } else {
            info!(%invoice_id, "invoice has no stored file, regenerating");
        }

        let fresh = self.regenerate(invoice_id).await?;
        let resp = self.client.get(&fresh).send().await?;
        if !resp.status().is_success() {
            return Err(DownloadError::Fetch {
                status: Some(resp.status().as_u16()),
            });
        }
        let bytes = resp.bytes().await?;
        info!(%invoice_id, %number, size = bytes.len(), "regenerated invoice downloaded");
        Ok(bytes.to_vec())
    }

    /// Asks the server to render the invoice again and returns the new file URL.
    pub async fn regenerate(&self, invoice_id: &str) -> Result<String, DownloadError> {
        let token = self
            .session
            .access_token()
            .await
            .ok_or(DownloadError::NoSession)?;

        let resp = self
            .client
            .post(&self.regenerate_url)
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .json(&RegenerateRequest { invoice_id })
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(DownloadError::Regeneration {
                invoice_id: invoice_id.to_string(),
                status,
                body,
            });
        }

        let body: RegenerateResponse = resp.json().await?;
        body.file_url
            .filter(|u| !u.is_empty())
            .ok_or(DownloadError::MissingFileUrl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_platform::{FakePlatform, PDF_PREFIX};
    use crate::signer::StorageClient;
    use trustlink_core::session::StaticSession;

    fn downloader(platform: &FakePlatform, token: Option<&str>) -> InvoiceDownloader {
        let session: Arc<dyn SessionProvider> =
            Arc::new(StaticSession::new(token.map(str::to_string)));
        let signer = StorageClient::new(
            reqwest::Client::new(),
            platform.storage_url(),
            "anon_key".to_string(),
            Arc::clone(&session),
        );
        InvoiceDownloader::new(
            reqwest::Client::new(),
            Arc::new(SignedUrlResolver::new(Arc::new(signer))),
            session,
            platform.regenerate_url(),
            "anon_key".to_string(),
        )
    }

    fn pdf(name: &str) -> Vec<u8> {
        let mut body = PDF_PREFIX.to_vec();
        body.extend_from_slice(name.as_bytes());
        body
    }

    fn regenerations(platform: &FakePlatform) -> usize {
        platform
            .hits()
            .iter()
            .filter(|h| h.starts_with("POST /functions/v1/"))
            .count()
    }

    #[test]
    fn test_invoice_file_name() {
        assert_eq!(invoice_file_name("INV-2024-0007"), "invoice-INV-2024-0007.pdf");
    }

    #[tokio::test]
    async fn test_stored_url_is_signed_and_fetched() {
        let platform = FakePlatform::start().await;
        let downloader = downloader(&platform, Some("user_jwt"));
        let stored = platform.public_url("invoices", "inv_1.pdf");

        let bytes = downloader
            .download_invoice("inv_1", Some(&stored), Some("INV-1"))
            .await
            .unwrap();

        assert_eq!(bytes, pdf("inv_1.pdf"));
        assert_eq!(
            platform.hits(),
            vec![
                "POST /storage/v1/object/sign/invoices/inv_1.pdf".to_string(),
                "GET /storage/v1/object/sign/invoices/inv_1.pdf".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_stale_stored_url_triggers_one_regeneration() {
        let platform = FakePlatform::start().await;
        let downloader = downloader(&platform, Some("user_jwt"));
        let stored = platform.public_url("invoices", "missing-old.pdf");

        let bytes = downloader
            .download_invoice("inv_2", Some(&stored), Some("INV-2"))
            .await
            .unwrap();

        assert_eq!(bytes, pdf("inv_2.pdf"));
        assert_eq!(regenerations(&platform), 1);
        assert_eq!(
            platform.hits().last().map(String::as_str),
            Some("GET /storage/v1/object/sign/invoices/inv_2.pdf")
        );
    }

    #[tokio::test]
    async fn test_missing_stored_url_regenerates_with_bearer_token() {
        let platform = FakePlatform::start().await;
        let downloader = downloader(&platform, Some("user_jwt"));

        let bytes = downloader.download_invoice("inv_3", None, None).await.unwrap();

        assert_eq!(bytes, pdf("inv_3.pdf"));
        assert_eq!(platform.hits()[0], "POST /functions/v1/generate-invoice-pdf");
        assert_eq!(regenerations(&platform), 1);
    }

    #[tokio::test]
    async fn test_no_session_fails_without_network() {
        let platform = FakePlatform::start().await;
        let downloader = downloader(&platform, None);

        let err = downloader.download_invoice("inv_4", None, None).await.unwrap_err();

        assert!(matches!(err, DownloadError::NoSession));
        assert_eq!(err.to_string(), "No active session");
        assert!(platform.hits().is_empty());
    }

    #[tokio::test]
    async fn test_regeneration_error_carries_response_text() {
        let platform = FakePlatform::start().await;
        let downloader = downloader(&platform, Some("user_jwt"));

        let err = downloader.download_invoice("inv_bad", None, None).await.unwrap_err();

        match err {
            DownloadError::Regeneration { status, body, .. } => {
                assert_eq!(status, 500);
                assert_eq!(body, "template render failed");
            }
            other => panic!("expected regeneration error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_regeneration_without_file_url() {
        let platform = FakePlatform::start().await;
        let downloader = downloader(&platform, Some("user_jwt"));

        let err = downloader.download_invoice("inv_nourl", None, None).await.unwrap_err();

        assert!(matches!(err, DownloadError::MissingFileUrl));
        assert_eq!(err.to_string(), "no file URL in response");
    }

    #[tokio::test]
    async fn test_fresh_url_not_found() {
        let platform = FakePlatform::start().await;
        let downloader = downloader(&platform, Some("user_jwt"));

        let err = downloader.download_invoice("inv_gone", None, None).await.unwrap_err();

        assert!(matches!(err, DownloadError::Fetch { status: Some(404) }));
        assert_eq!(err.to_string(), "failed to fetch PDF from storage");
    }
}
