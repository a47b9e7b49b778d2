//! Application context with an explicit initialization lifecycle.
//!
//! `NotInitialized -> Initializing -> Ready | Failed(reason)`. Handlers ask
//! for the analyzer and get [`Error::NotReady`] until the context is `Ready`.

use anyhow::Result;
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};
use tokio::sync::Mutex;
use tracing::{info, warn};

use kidsafe_core::config::{expand_path, Settings, SourceSettings};
use kidsafe_core::data_processor::{ChunkingConfig, DataProcessor};
use kidsafe_core::error::Error;
use kidsafe_core::traits::ChatModel;
use kidsafe_core::types::Corpus;
use kidsafe_retrieval::RetrievalManager;

use crate::analyzer::{AnalyzerOptions, IngredientAnalyzer};
use crate::openai_chat::OpenAiChat;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Lifecycle {
    NotInitialized,
    Initializing,
    Ready,
    Failed { reason: String },
}

enum State {
    NotInitialized,
    Initializing,
    Ready(Arc<IngredientAnalyzer>),
    Failed(String),
}

fn write_state(state: &RwLock<State>, next: State) {
    *state.write().unwrap_or_else(PoisonError::into_inner) = next;
}

/// Marks the context `Failed` if an initialization run is dropped before it
/// finishes, whether by a panic in the build or by cancellation.
struct Interrupted<'a> {
    state: &'a RwLock<State>,
    armed: bool,
}

impl Drop for Interrupted<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("Initialization was interrupted");
            write_state(self.state, State::Failed("initialization was interrupted".into()));
        }
    }
}

/// State sits behind a std lock that is never held across an await point.
pub struct AppContext {
    settings: Settings,
    state: RwLock<State>,
    init: Mutex<()>,
}

impl AppContext {
    pub fn new(settings: Settings) -> Self {
        Self { settings, state: RwLock::new(State::NotInitialized), init: Mutex::new(()) }
    }

    pub fn settings(&self) -> &Settings { &self.settings }

    fn state(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn lifecycle(&self) -> Lifecycle {
        match &*self.state() {
            State::NotInitialized => Lifecycle::NotInitialized,
            State::Initializing => Lifecycle::Initializing,
            State::Ready(_) => Lifecycle::Ready,
            State::Failed(reason) => Lifecycle::Failed { reason: reason.clone() },
        }
    }

    /// Build the corpus, indexes and chat client from the settings.
    pub async fn initialize(&self, show_progress: bool) -> Result<()> {
        self.initialize_with(|settings| build_analyzer(settings, show_progress)).await
    }

    /// Run `build` unless already `Ready`. Concurrent callers wait for the
    /// first; a `Failed` context can be initialized again.
    pub async fn initialize_with<F, Fut>(&self, build: F) -> Result<()>
    where
        F: FnOnce(Settings) -> Fut,
        Fut: Future<Output = Result<IngredientAnalyzer>>,
    {
        let _guard = self.init.lock().await;
        if matches!(*self.state(), State::Ready(_)) { return Ok(()); }
        write_state(&self.state, State::Initializing);
        let mut interrupted = Interrupted { state: &self.state, armed: true };
        let built = build(self.settings.clone()).await;
        interrupted.armed = false;
        match built {
            Ok(analyzer) => {
                info!("Application ready ({} retrieval)", analyzer.strategy());
                write_state(&self.state, State::Ready(Arc::new(analyzer)));
                Ok(())
            }
            Err(e) => {
                let reason = format!("{e:#}");
                warn!("Initialization failed: {}", reason);
                write_state(&self.state, State::Failed(reason));
                Err(e)
            }
        }
    }

    pub async fn analyzer(&self) -> Result<Arc<IngredientAnalyzer>> {
        match &*self.state() {
            State::Ready(analyzer) => Ok(Arc::clone(analyzer)),
            State::NotInitialized => Err(Error::NotReady("system not initialized; configure API keys first".into()).into()),
            State::Initializing => Err(Error::NotReady("system is still initializing".into()).into()),
            State::Failed(reason) => Err(Error::NotReady(format!("initialization failed: {reason}")).into()),
        }
    }
}

/// Load and chunk the configured source document off the async runtime.
pub async fn load_corpus(source: &SourceSettings) -> Result<Corpus> {
    let cfg = ChunkingConfig::new(source.chunk_size, source.chunk_overlap)?;
    let path = expand_path(&source.path);
    tokio::task::spawn_blocking(move || DataProcessor::new(cfg).build(&path))
        .await
        .map_err(|e| Error::Operation(format!("corpus build task failed: {e}")))?
}

pub async fn build_analyzer(settings: Settings, show_progress: bool) -> Result<IngredientAnalyzer> {
    let chat: Arc<dyn ChatModel> = match OpenAiChat::from_settings(&settings)? {
        Some(chat) => Arc::new(chat),
        None => return Err(Error::InvalidConfig("OPENAI_API_KEY is required for analysis".into()).into()),
    };
    let corpus = Arc::new(load_corpus(&settings.source).await?);
    if corpus.is_empty() { warn!("Corpus from {} is empty; every analysis will lack context", settings.source.path); }
    let options = AnalyzerOptions { k: settings.retrieval.k, analysis_temperature: settings.llm.analysis_temperature, chat_temperature: settings.llm.chat_temperature };
    let manager = RetrievalManager::from_settings(settings, corpus, Some(Arc::clone(&chat)))?.with_progress(show_progress);
    let retriever = manager.active().await?;
    Ok(IngredientAnalyzer::new(retriever, chat, options))
}
