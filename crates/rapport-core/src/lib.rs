pub mod config;
pub mod knowledge;
pub mod language;
pub mod lexicon;
pub mod orchestrator;
pub mod policy;
pub mod prompt;
pub mod reply;
pub mod router;
pub mod signal;
pub mod summary;

pub use config::*;
pub use knowledge::*;
pub use language::*;
pub use lexicon::Lexicon;
pub use orchestrator::*;
pub use policy::*;
pub use prompt::PromptComposer;
pub use reply::*;
pub use router::*;
pub use signal::*;
pub use summary::*;
