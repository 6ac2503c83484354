use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::info;
use trustlink_storage::{invoice_file_name, SystemOpener};

use crate::app::App;

pub async fn sign_url(app: &App, reference: &str, expires_in: u64) -> anyhow::Result<()> {
    let url = app
        .resolver()
        .resolve(reference, Duration::from_secs(expires_in))
        .await;
    println!("{}", url);
    Ok(())
}

pub async fn open_url(app: &App, reference: &str) -> anyhow::Result<()> {
    app.resolver()
        .open_secure_storage_url(reference, &SystemOpener)
        .await?;
    Ok(())
}

pub fn output_path(out: Option<PathBuf>, invoice_id: &str, number: Option<&str>) -> PathBuf {
    out.unwrap_or_else(|| PathBuf::from(invoice_file_name(number.unwrap_or(invoice_id))))
}

pub async fn download_invoice(
    app: &App,
    invoice_id: &str,
    file_url: Option<&str>,
    number: Option<&str>,
    out: Option<PathBuf>,
) -> anyhow::Result<()> {
    let bytes = app
        .downloader()
        .download_invoice(invoice_id, file_url, number)
        .await?;
    let path = output_path(out, invoice_id, number);
    write_file(&path, &bytes).await?;
    info!(path = %path.display(), size = bytes.len(), "invoice saved");
    println!("{}", path.display());
    Ok(())
}

async fn write_file(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    tokio::fs::write(path, bytes).await?;
    Ok(())
}
