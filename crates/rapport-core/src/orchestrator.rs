use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use rapport_memory::{InMemorySessionStore, SessionStore};
use rapport_provider::{
    create_provider, ClassifierError, EmotionClassifier, HuggingFaceClassifier, KnowledgeSource,
    LazyClassifier, LlmProvider, NoKnowledge, OfflineClassifier, WikipediaSummary,
};
use rapport_schema::{ChatReply, Policy, SessionKey, Signal, TurnRole};
use uuid::Uuid;

use crate::config::RapportConfig;
use crate::knowledge::KnowledgeLookup;
use crate::language::ScriptLanguageDetector;
use crate::lexicon::Lexicon;
use crate::policy::{conversation_depth, is_long_message, PolicySelector};
use crate::prompt::{render_context, PromptComposer};
use crate::reply::ReplyEnforcer;
use crate::router::{GenerationProfile, ReplyGenerator};
use crate::signal::SignalExtractor;
use crate::summary::SummaryBuilder;

/// Reply for blank input. No collaborator, the session store included, is consulted.
pub const EMPTY_INPUT_REPLY: &str = "I'm here whenever you're ready to talk.";

/// External collaborators the pipeline talks to.
pub struct Collaborators {
    pub provider: Arc<dyn LlmProvider>,
    pub classifier: Arc<dyn EmotionClassifier>,
    pub knowledge: Arc<dyn KnowledgeSource>,
    pub store: Arc<dyn SessionStore>,
}

impl Collaborators {
    /// Builds the real adapters described by `config`. Fails only when the
    /// generation provider cannot be constructed (e.g. a missing key).
    pub fn from_config(config: &RapportConfig) -> Result<Self> {
        let provider = create_provider(&config.provider_config())
            .context("failed to create generation provider")?;
        Ok(Self::with_provider(config, provider))
    }

    /// Same as [`from_config`](Self::from_config) with a caller-supplied provider.
    pub fn with_provider(config: &RapportConfig, provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            classifier: classifier_from_config(config),
            knowledge: knowledge_from_config(config),
            store: Arc::new(InMemorySessionStore::new(config.session.max_turns)),
        }
    }
}

fn classifier_from_config(config: &RapportConfig) -> Arc<dyn EmotionClassifier> {
    let section = config.classifier.clone();
    if !section.enabled {
        return Arc::new(OfflineClassifier);
    }
    let max_init_attempts = section.max_init_attempts;
    let factory = move || -> Result<Arc<dyn EmotionClassifier>, ClassifierError> {
        let api_key = std::env::var(&section.api_key_env).ok();
        let mut classifier = HuggingFaceClassifier::new(api_key)
            .with_top_k(section.top_k)
            .with_timeout(Duration::from_secs(section.timeout_secs));
        if let Some(endpoint) = &section.endpoint {
            classifier = classifier.with_base_url(endpoint.clone());
        }
        if let Some(model) = &section.model {
            classifier = classifier.with_model(model.clone());
        }
        Ok(Arc::new(classifier))
    };
    Arc::new(LazyClassifier::new(
        "emotion",
        max_init_attempts,
        Box::new(factory),
    ))
}

fn knowledge_from_config(config: &RapportConfig) -> Arc<dyn KnowledgeSource> {
    if config.knowledge.enabled {
        Arc::new(WikipediaSummary::new(
            config.knowledge.base_url.clone(),
            Duration::from_secs(config.knowledge.timeout_secs),
        ))
    } else {
        Arc::new(NoKnowledge)
    }
}

/// Runs one message end to end: signal, context, knowledge, policy, prompt,
/// generation, enforcement, transcript append and summary refresh.
pub struct Orchestrator {
    extractor: SignalExtractor,
    selector: PolicySelector,
    composer: PromptComposer,
    enforcer: ReplyEnforcer,
    generator: Arc<ReplyGenerator>,
    knowledge: KnowledgeLookup,
    summaries: SummaryBuilder,
    store: Arc<dyn SessionStore>,
}

impl Orchestrator {
    pub fn new(config: &RapportConfig, lexicon: Arc<Lexicon>, collaborators: Collaborators) -> Self {
        let generator = Arc::new(ReplyGenerator::new(
            collaborators.provider,
            config.generator_settings(),
        ));
        Self {
            extractor: SignalExtractor::new(
                Arc::clone(&lexicon),
                collaborators.classifier,
                Arc::new(ScriptLanguageDetector),
                config.signal_settings(),
            ),
            selector: PolicySelector::new(Arc::clone(&lexicon)),
            composer: PromptComposer::new(config.session.recent_window),
            enforcer: ReplyEnforcer::new(Arc::clone(&lexicon)),
            knowledge: KnowledgeLookup::new(
                collaborators.knowledge,
                lexicon,
                Duration::from_secs(config.knowledge.timeout_secs),
            ),
            summaries: SummaryBuilder::new(
                Arc::clone(&generator),
                config.session.summary_every,
                config.session.summary_source_turns,
            ),
            generator,
            store: collaborators.store,
        }
    }

    /// Loads the lexicon named in `config` (or the builtin one) and wires the
    /// real adapters.
    pub fn from_config(config: &RapportConfig) -> Result<Self> {
        let lexicon = load_lexicon(config)?;
        Ok(Self::new(config, lexicon, Collaborators::from_config(config)?))
    }

    /// Signal and policy for `text` with no conversation history. Does not
    /// touch the session store or the generator.
    pub async fn analyze(&self, text: &str) -> (Signal, Option<Policy>) {
        let signal = self.extractor.extract(text).await;
        if text.trim().is_empty() {
            return (signal, None);
        }
        let policy = self
            .selector
            .select(text, &signal, 0, is_long_message(text));
        (signal, Some(policy))
    }

    pub async fn handle_message(&self, session: &SessionKey, text: &str) -> ChatReply {
        let trace_id = Uuid::new_v4();
        let text = text.trim();

        if text.is_empty() {
            tracing::debug!(%session, %trace_id, "blank message short-circuited");
            let signal = Signal::empty();
            return ChatReply {
                session_id: session.clone(),
                trace_id,
                reply: EMPTY_INPUT_REPLY.to_string(),
                overall_state: signal.overall_state,
                signal,
                policy: None,
                stored_summary: String::new(),
                timestamp: Utc::now(),
            };
        }

        let signal = self.extractor.extract(text).await;

        let history = match self.store.get_recent_turns(session).await {
            Ok(turns) => turns,
            Err(e) => {
                tracing::warn!("Failed to load session history: {e}");
                Vec::new()
            }
        };
        let summary = self.summary_or_empty(session).await;

        let snippet = self.knowledge.snippet_for(text).await;

        let context_block = render_context(&history, self.composer.recent_window());
        let depth = conversation_depth(&context_block);
        let policy = self
            .selector
            .select(text, &signal, depth, is_long_message(text));

        let prompt = self
            .composer
            .compose(text, &signal, &policy, &history, &summary, &snippet);
        let profile = GenerationProfile::for_reply(&policy, &signal);
        let raw_reply = self.generator.generate_or_fallback(&profile, &prompt).await;
        let reply = self.enforcer.enforce(&raw_reply, text);

        let mut counts = Vec::with_capacity(2);
        for (role, body) in [(TurnRole::User, text), (TurnRole::Assistant, reply.as_str())] {
            match self.store.append_turn(session, role, body).await {
                Ok(count) => counts.push(count),
                Err(e) => tracing::warn!("Failed to write {} session entry: {e}", role.as_str()),
            }
        }

        let stored_summary = if counts.iter().any(|c| self.summaries.is_due(*c)) {
            self.refresh_summary(session, summary).await
        } else {
            summary
        };

        tracing::info!(
            %session,
            %trace_id,
            state = %signal.overall_state,
            rule = %policy.rule_id,
            profile = profile.name,
            knowledge = !snippet.is_empty(),
            "message handled"
        );

        ChatReply {
            session_id: session.clone(),
            trace_id,
            reply,
            overall_state: signal.overall_state,
            signal,
            policy: Some(policy),
            stored_summary,
            timestamp: Utc::now(),
        }
    }

    async fn summary_or_empty(&self, session: &SessionKey) -> String {
        self.store.get_summary(session).await.unwrap_or_else(|e| {
            tracing::warn!("Failed to load session summary: {e}");
            String::new()
        })
    }

    /// Rebuilds the summary from the stored transcript; the previous summary is
    /// kept on any failure.
    async fn refresh_summary(&self, session: &SessionKey, previous: String) -> String {
        let turns = match self.store.get_recent_turns(session).await {
            Ok(turns) => turns,
            Err(e) => {
                tracing::warn!("Failed to load transcript for summary: {e}");
                return previous;
            }
        };
        match self.summaries.build(&turns).await {
            Ok(summary) if !summary.is_empty() => {
                if let Err(e) = self.store.set_summary(session, &summary).await {
                    tracing::warn!("Failed to store session summary: {e}");
                    return previous;
                }
                tracing::info!(%session, turns = turns.len(), "rolling summary refreshed");
                summary
            }
            Ok(_) => previous,
            Err(e) => {
                tracing::warn!("Keeping previous summary: {e:#}");
                previous
            }
        }
    }
}

pub fn load_lexicon(config: &RapportConfig) -> Result<Arc<Lexicon>> {
    let lexicon = match &config.lexicon {
        Some(path) => Lexicon::from_yaml_file(path)?,
        None => Lexicon::builtin(),
    };
    Ok(Arc::new(lexicon))
}
