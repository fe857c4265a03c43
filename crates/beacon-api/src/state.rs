use std::sync::Arc;

use beacon_content::ContentExtractor;
use beacon_db::Database;
use beacon_federation::Dispatcher;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    pub extractor: ContentExtractor,
    pub archive_enabled: bool,
    pub allow_delete_all: bool,
}

impl AppStateInner {
    /// Runs blocking store work off the async runtime.
    pub async fn blocking<F, T, E>(&self, f: F) -> Result<T, crate::error::ApiError>
    where
        F: FnOnce(&Database) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Into<crate::error::ApiError> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await?
            .map_err(Into::into)
    }
}
