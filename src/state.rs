//! Application state: configuration, the oracle, the store, token issuer and
//! the registry of live dialogue controllers.
//!
//! A controller lives behind its own `tokio::sync::Mutex`, so operations on one
//! session are serialized while different sessions proceed independently.
//! Controllers are rebuilt lazily from the persisted snapshot when a session is
//! touched for the first time after startup.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument};

use crate::auth::TokenIssuer;
use crate::config::AppConfig;
use crate::dialogue::DialogueController;
use crate::local::LocalOracle;
use crate::openai::OpenAI;
use crate::oracle::TutorOracle;
use crate::store::{SessionRecord, Store, StoreError};

pub type LiveController = Arc<Mutex<DialogueController>>;

pub struct AppState {
    pub config: AppConfig,
    pub oracle: Arc<dyn TutorOracle>,
    pub store: Store,
    pub tokens: TokenIssuer,
    live: RwLock<HashMap<String, LiveController>>,
}

impl AppState {
    /// Build state from config, picking the OpenAI oracle when an API key is present.
    #[instrument(level = "info", skip_all)]
    pub fn new(config: AppConfig) -> Self {
        let oracle: Arc<dyn TutorOracle> = match OpenAI::from_env(config.prompts.clone()) {
            Some(oa) => {
                info!(target: "socratic_tutor", base_url = %oa.base_url, fast_model = %oa.fast_model, strong_model = %oa.strong_model, "OpenAI enabled.");
                Arc::new(oa)
            }
            None => {
                info!(target: "socratic_tutor", "OpenAI disabled (no OPENAI_API_KEY). Using the local oracle.");
                Arc::new(LocalOracle::new())
            }
        };
        Self::with_oracle(config, oracle)
    }

    pub fn with_oracle(config: AppConfig, oracle: Arc<dyn TutorOracle>) -> Self {
        let tokens = TokenIssuer::from_config(&config);
        Self { config, oracle, store: Store::new(), tokens, live: RwLock::new(HashMap::new()) }
    }

    /// Live controller for a session, restored from its snapshot if not yet loaded.
    pub async fn controller(&self, record: &SessionRecord) -> Result<LiveController, StoreError> {
        if let Some(c) = self.live.read().await.get(&record.id) {
            return Ok(c.clone());
        }

        let doc = self.store.get_document(&record.user_id, &record.pdf_id).await?;
        let mut live = self.live.write().await;
        // Another task may have restored it while we waited for the write lock.
        if let Some(c) = live.get(&record.id) {
            return Ok(c.clone());
        }
        let controller = match record.state.clone() {
            Some(snapshot) => {
                debug!(target: "socratic_tutor", session_id = %record.id, "Restoring controller from snapshot");
                DialogueController::restore(self.oracle.clone(), doc.content, doc.topics, snapshot)
            }
            None => DialogueController::new(self.oracle.clone()),
        };
        let controller = Arc::new(Mutex::new(controller));
        live.insert(record.id.clone(), controller.clone());
        Ok(controller)
    }

    /// Drop live controllers of deleted sessions.
    pub async fn forget(&self, session_ids: &[String]) {
        let mut live = self.live.write().await;
        for id in session_ids {
            live.remove(id);
        }
    }
}
