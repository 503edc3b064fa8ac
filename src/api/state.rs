//! Shared application state.

use std::sync::{Arc, Mutex};

use crate::api::error::ApiError;
use crate::db::Database;
use crate::translator::NlqTranslator;

/// State handed to every handler.
#[derive(Clone)]
pub struct AppState {
    db: Arc<Mutex<Database>>,
    translator: Arc<NlqTranslator>,
}

impl AppState {
    pub fn new(db: Database, translator: NlqTranslator) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            translator: Arc::new(translator),
        }
    }

    pub fn translator(&self) -> Arc<NlqTranslator> {
        Arc::clone(&self.translator)
    }

    /// Runs `f` with exclusive database access on the blocking thread pool.
    pub async fn with_db<F, T>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&mut Database) -> Result<T, ApiError> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let mut guard = db
                .lock()
                .map_err(|_| ApiError::internal("database lock poisoned"))?;
            f(&mut guard)
        })
        .await
        .map_err(ApiError::internal)?
    }
}
