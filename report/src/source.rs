use crate::row::{DayWindow, Row};
use anyhow::Result;
use async_trait::async_trait;
use daylog::oauth::Provider;
use daylog::AuthenticatedClient;

/// A place work activity is read from.
///
/// Each source owns one token (stored under [`name`](Self::name)) and turns
/// an authenticated client plus the report day into rows.
#[async_trait]
pub trait Source: Send + Sync {
    /// Service name: token and descriptor file key, CLI flag, log field.
    fn name(&self) -> &str;

    /// Identity provider that issues this source's tokens.
    fn provider(&self) -> Provider;

    /// Collect the rows for `window`.
    ///
    /// # Arguments
    /// * `client` - Client carrying a valid token for this source
    /// * `window` - The report day
    async fn rows(&self, client: AuthenticatedClient, window: &DayWindow) -> Result<Vec<Row>>;
}
