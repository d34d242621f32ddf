use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::CloverConfig;
use crate::llm::GeminiClient;
use crate::session::{SessionEngine, SessionEvent};
use crate::state::SessionState;
use crate::store::SessionStore;
use crate::webhook::WebhookLogger;

/// The wired-up application: store, engine, collaborators, and the event
/// stream a driver listens on.
pub struct SessionRuntime {
    pub config: CloverConfig,
    pub store: Arc<SessionStore>,
    pub engine: Arc<SessionEngine>,
    pub logger: WebhookLogger,
    pub events: flume::Receiver<SessionEvent>,
}

impl SessionRuntime {
    pub fn bootstrap(config: CloverConfig) -> Result<Self> {
        let store = Arc::new(
            SessionStore::open(&config.database_path)
                .with_context(|| format!("Failed to open store at {}", config.database_path))?,
        );

        let state = match store.load_session() {
            Ok(Some(saved)) => SessionState::from_saved(saved),
            Ok(None) => SessionState::default(),
            Err(e) => {
                tracing::warn!("Failed to load saved session, starting fresh: {:#}", e);
                SessionState::default()
            }
        };

        let generator = Arc::new(GeminiClient::new(
            config.llm_api_url.clone(),
            config.llm_api_key.clone().unwrap_or_default(),
            config.llm_model.clone(),
            config.temperature,
        ));

        let logger = WebhookLogger::new(
            config.webhook_url.clone(),
            config.webhook_auth_token.clone(),
            config.app_name.clone(),
        );
        if logger.is_enabled() {
            tracing::info!("Webhook logging enabled");
        }

        let (event_tx, event_rx) = flume::unbounded();
        let engine = Arc::new(SessionEngine::new(
            state,
            store.clone(),
            generator,
            Arc::new(logger.clone()),
            event_tx,
        ));

        Ok(Self {
            config,
            store,
            engine,
            logger,
            events: event_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &tempfile::TempDir) -> CloverConfig {
        let mut config = CloverConfig::default();
        config.database_path = dir
            .path()
            .join("clover_state.db")
            .to_str()
            .unwrap()
            .to_string();
        config
    }

    #[tokio::test]
    async fn bootstrap_resumes_the_saved_session() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);

        {
            let store = SessionStore::open(&config.database_path).expect("store init");
            let mut state = SessionState::default();
            state.day = 8;
            state.stats.streak = 7;
            store.save_session(&state).expect("seed session");
        }

        let runtime = SessionRuntime::bootstrap(config).expect("bootstrap");
        let state = runtime.engine.snapshot().await;
        assert_eq!(state.day, 8);
        assert_eq!(state.stats.streak, 7);
        assert!(!runtime.engine.day_clear_pending());
    }

    #[tokio::test]
    async fn bootstrap_without_saved_state_starts_at_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = SessionRuntime::bootstrap(config_in(&dir)).expect("bootstrap");
        assert_eq!(runtime.engine.snapshot().await, SessionState::default());
    }
}
