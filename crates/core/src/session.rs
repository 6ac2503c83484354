use async_trait::async_trait;

/// Source of the caller's current access token.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn access_token(&self) -> Option<String>;
}

/// Session fixed at construction, e.g. a token read from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticSession {
    token: Option<String>,
}

impl StaticSession {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionProvider for StaticSession {
    async fn access_token(&self) -> Option<String> {
        self.token.clone()
    }
}
