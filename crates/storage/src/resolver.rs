use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::error::StorageError;
use crate::opener::UrlOpener;
use crate::reference::{is_signed_url, parse_public_url, ObjectLocation};
use crate::signer::UrlSigner;

/// Lifetime for short-lived views such as payment proofs.
pub const PAYMENT_PROOF_LIFETIME: Duration = Duration::from_secs(600);
/// Lifetime for invoices and links handed out for later use.
pub const LONG_LIVED_LIFETIME: Duration = Duration::from_secs(31_536_000);

/// Why a reference could not be signed. Callers of `resolve` only see these
/// in the logs.
#[derive(Debug, Error)]
pub enum ResolutionWarning {
    #[error("reference is not a storage object url")]
    Unparsable,
    #[error("signing failed: {0}")]
    SigningFailed(#[from] StorageError),
    #[error("signing response carried no signed url")]
    MissingSignedUrl,
}

/// Turns object references into time-limited signed URLs.
pub struct SignedUrlResolver {
    signer: Arc<dyn UrlSigner>,
}

impl SignedUrlResolver {
    pub fn new(signer: Arc<dyn UrlSigner>) -> Self {
        Self { signer }
    }

    pub async fn try_resolve(
        &self,
        reference: &str,
        lifetime: Duration,
    ) -> Result<String, ResolutionWarning> {
        if is_signed_url(reference) {
            debug!("reference already signed");
            return Ok(reference.to_string());
        }
        let location = parse_public_url(reference).ok_or(ResolutionWarning::Unparsable)?;
        self.try_resolve_object(&location, lifetime).await
    }

    /// Signed URL for `reference`, or `reference` itself when it cannot be
    /// signed.
    pub async fn resolve(&self, reference: &str, lifetime: Duration) -> String {
        match self.try_resolve(reference, lifetime).await {
            Ok(url) => url,
            Err(warning) => {
                warn!(%reference, %warning, "using unsigned reference");
                reference.to_string()
            }
        }
    }

    pub async fn try_resolve_object(
        &self,
        location: &ObjectLocation,
        lifetime: Duration,
    ) -> Result<String, ResolutionWarning> {
        self.signer
            .create_signed_url(location, lifetime)
            .await?
            .ok_or(ResolutionWarning::MissingSignedUrl)
    }

    /// Signs a bare bucket/path pair. There is no URL to fall back to, so a
    /// failure yields `None`.
    pub async fn resolve_object(
        &self,
        bucket: &str,
        path: &str,
        lifetime: Duration,
    ) -> Option<String> {
        let location = ObjectLocation::new(bucket, path);
        match self.try_resolve_object(&location, lifetime).await {
            Ok(url) => Some(url),
            Err(warning) => {
                warn!(%bucket, %path, %warning, "object could not be signed");
                None
            }
        }
    }

    /// Resolves `reference` for immediate viewing and opens it. A panic while
    /// resolving still opens the original reference.
    pub async fn open_secure_storage_url(
        &self,
        reference: &str,
        opener: &dyn UrlOpener,
    ) -> Result<(), StorageError> {
        let target = match AssertUnwindSafe(self.resolve(reference, PAYMENT_PROOF_LIFETIME))
            .catch_unwind()
            .await
        {
            Ok(url) => url,
            Err(_) => {
                error!(%reference, "resolving storage url panicked, opening original");
                reference.to_string()
            }
        };
        opener.open(&target)?;
        Ok(())
    }
}
