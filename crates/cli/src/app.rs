use std::sync::Arc;
use std::time::Duration;

use trustlink_core::config::Settings;
use trustlink_core::session::{SessionProvider, StaticSession};
use trustlink_realtime::{ChannelRegistry, PostgrestClient, RealtimeSocket};
use trustlink_storage::{InvoiceDownloader, SignedUrlResolver, StorageClient};

/// Clients wired from settings, shared by every command.
pub struct App {
    pub settings: Settings,
    http: reqwest::Client,
    session: Arc<dyn SessionProvider>,
}

impl App {
    pub fn new(settings: Settings) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        let session = Arc::new(StaticSession::new(settings.access_token.clone()));
        Ok(Self {
            settings,
            http,
            session,
        })
    }

    /// The shared socket and a registry opening its channels on it.
    pub fn realtime(&self) -> (RealtimeSocket, Arc<ChannelRegistry>) {
        let socket = RealtimeSocket::new(
            self.settings.realtime_url(),
            self.settings.access_token.clone(),
            self.settings.join_timeout(),
        );
        let registry = Arc::new(ChannelRegistry::new(
            Arc::new(socket.clone()),
            self.settings.heartbeat_interval(),
        ));
        (socket, registry)
    }

    pub fn rows(&self) -> Arc<PostgrestClient> {
        Arc::new(PostgrestClient::new(
            self.http.clone(),
            self.settings.rest_url(),
            self.settings.anon_key.clone(),
            Arc::clone(&self.session),
        ))
    }

    pub fn resolver(&self) -> Arc<SignedUrlResolver> {
        let signer = StorageClient::new(
            self.http.clone(),
            self.settings.storage_url(),
            self.settings.anon_key.clone(),
            Arc::clone(&self.session),
        );
        Arc::new(SignedUrlResolver::new(Arc::new(signer)))
    }

    pub fn downloader(&self) -> InvoiceDownloader {
        InvoiceDownloader::new(
            self.http.clone(),
            self.resolver(),
            Arc::clone(&self.session),
            format!(
                "{}/{}",
                self.settings.functions_url(),
                self.settings.regenerate_function
            ),
            self.settings.anon_key.clone(),
        )
    }
}
