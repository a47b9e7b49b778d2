//! kidsafe-analyzer
//!
//! Ingredient analysis on top of retrieval: prompt construction, the OpenAI
//! chat client, verdict extraction, follow-up chat and the application context.
pub mod analyzer;
pub mod context;
pub mod openai_chat;
pub mod prompt;
pub mod verdict;

pub use analyzer::{AnalysisReport, AnalyzerOptions, FollowUp, IngredientAnalyzer};
pub use context::{build_analyzer, load_corpus, AppContext, Lifecycle};
pub use openai_chat::OpenAiChat;
pub use verdict::{extract_verdict, Verdict};
