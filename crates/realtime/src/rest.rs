use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use trustlink_core::session::SessionProvider;
use trustlink_core::Entity;

use crate::error::RealtimeError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerFilter {
    pub column: String,
    pub value: String,
}

/// Source of the rows a live query starts from.
#[async_trait]
pub trait RowSource<T>: Send + Sync {
    async fn fetch(
        &self,
        table: &str,
        filter: Option<&OwnerFilter>,
    ) -> Result<Vec<T>, RealtimeError>;
}

/// Loads rows through the platform's PostgREST endpoint, newest first.
pub struct PostgrestClient {
    client: reqwest::Client,
    rest_url: String,
    anon_key: String,
    session: Arc<dyn SessionProvider>,
}

impl PostgrestClient {
    pub fn new(
        client: reqwest::Client,
        rest_url: String,
        anon_key: String,
        session: Arc<dyn SessionProvider>,
    ) -> Self {
        Self {
            client,
            rest_url,
            anon_key,
            session,
        }
    }
}

#[async_trait]
impl<T: Entity> RowSource<T> for PostgrestClient {
    async fn fetch(
        &self,
        table: &str,
        filter: Option<&OwnerFilter>,
    ) -> Result<Vec<T>, RealtimeError> {
        let url = format!("{}/{}", self.rest_url, table);
        let mut req = self
            .client
            .get(&url)
            .query(&[("select", "*"), ("order", "created_at.desc")])
            .header("apikey", &self.anon_key);

        if let Some(filter) = filter {
            req = req.query(&[(filter.column.as_str(), format!("eq.{}", filter.value))]);
        }

        let token = self
            .session
            .access_token()
            .await
            .unwrap_or_else(|| self.anon_key.clone());
        let resp = req.bearer_auth(token).send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(RealtimeError::Status { status, body });
        }

        let rows: Vec<T> = resp.json().await?;
        debug!(%table, rows = rows.len(), "rows loaded");
        Ok(rows)
    }
}
