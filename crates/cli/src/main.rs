use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use trustlink_core::config::Settings;
use trustlink_core::types::{Invoice, Quote};

mod app;
mod files;
mod watch;

use app::App;

#[derive(Debug, Parser)]
#[command(name = "trustlink")]
#[command(about = "Trust Link realtime and secure storage client", version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Stream live quote changes
    WatchQuotes {
        #[arg(long)]
        customer: Option<String>,
    },
    /// Stream live invoice changes
    WatchInvoices {
        #[arg(long)]
        customer: Option<String>,
    },
    /// Print a signed URL for a storage reference
    SignUrl {
        reference: String,
        #[arg(long, default_value_t = 600)]
        expires_in: u64,
    },
    /// Open a storage reference through a short-lived signed URL
    OpenUrl { reference: String },
    /// Download an invoice PDF, regenerating it if needed
    DownloadInvoice {
        id: String,
        #[arg(long)]
        file_url: Option<String>,
        #[arg(long)]
        number: Option<String>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let args = Args::parse();
    let app = App::new(Settings::from_env()?)?;

    match args.command {
        Command::WatchQuotes { customer } => {
            watch::run_watch::<Quote>(&app, customer.as_deref()).await
        }
        Command::WatchInvoices { customer } => {
            watch::run_watch::<Invoice>(&app, customer.as_deref()).await
        }
        Command::SignUrl {
            reference,
            expires_in,
        } => files::sign_url(&app, &reference, expires_in).await,
        Command::OpenUrl { reference } => files::open_url(&app, &reference).await,
        Command::DownloadInvoice {
            id,
            file_url,
            number,
            out,
        } => {
            files::download_invoice(&app, &id, file_url.as_deref(), number.as_deref(), out).await
        }
    }
}
