pub mod documents;
pub mod error;
pub mod opener;
pub mod reference;
pub mod resolver;
pub mod signer;

#[cfg(test)]
mod fake_platform;

pub use documents::{invoice_file_name, DownloadError, InvoiceDownloader};
pub use error::StorageError;
pub use opener::{SystemOpener, UrlOpener};
pub use reference::{is_signed_url, parse_public_url, ObjectLocation};
pub use resolver::{
    ResolutionWarning, SignedUrlResolver, LONG_LIVED_LIFETIME, PAYMENT_PROOF_LIFETIME,
};
pub use signer::{StorageClient, UrlSigner};
