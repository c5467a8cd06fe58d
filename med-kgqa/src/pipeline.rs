use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::align::CanonicalAligner;
use crate::dictionary::TermIndex;
use crate::dispatch::{dispatch, infer_disease_from_symptom};
use crate::entity::{EntityMap, Span, decode_bio_spans};
use crate::error::Result;
use crate::graph::GraphStore;
use crate::intent::{IntentService, LlmClient};
use crate::matcher::DictionaryMatcher;
use crate::merge::merge_spans;
use crate::prompt::assemble_prompt;

/// Sequence-tagging collaborator: one tag per input character from
/// `{O, B-<label>, I-<label>}`.
#[async_trait]
pub trait SequenceTagger: Send + Sync {
    async fn tag(&self, text: &str) -> Result<Vec<String>>;
}

/// The grounding result handed to the generation phase and to the
/// client as the `meta` event.
#[derive(Debug, Clone, Serialize)]
pub struct GroundedAnswer {
    pub entities: EntityMap,
    pub intent: String,
    pub prompt: String,
    pub knowledge: String,
}

/// The whole per-request grounding pipeline over an immutable startup
/// index: dictionary matching, span merging, canonical alignment,
/// intent dispatch and prompt assembly.
///
/// Safe to share behind an `Arc` across concurrent requests; all
/// request state lives in locals.
pub struct QaPipeline {
    matcher: DictionaryMatcher,
    aligner: CanonicalAligner,
    intents: IntentService,
    tagger: Option<Arc<dyn SequenceTagger>>,
}

impl QaPipeline {
    pub fn new(index: &TermIndex) -> Self {
        Self {
            matcher: DictionaryMatcher::build(index),
            aligner: CanonicalAligner::build(index),
            intents: IntentService::new(),
            tagger: None,
        }
    }

    pub fn with_tagger(mut self, tagger: Arc<dyn SequenceTagger>) -> Self {
        self.tagger = Some(tagger);
        self
    }

    pub fn with_intent_classifier(mut self, classifier: Arc<dyn LlmClient>) -> Self {
        self.intents = IntentService::with_classifier(classifier);
        self
    }

    /// Recognize and canonicalize the entities of `query`: model
    /// spans (when a tagger is wired) merged with dictionary spans,
    /// then aligned onto canonical terms. Never fails; a broken
    /// tagger degrades to rule-only matching.
    pub async fn extract_entities(&self, query: &str) -> EntityMap {
        let model_spans = self.model_spans(query).await;
        let rule_spans = self.matcher.scan(query);
        let merged = merge_spans(model_spans, rule_spans);
        self.aligner.align(&merged)
    }

    async fn model_spans(&self, query: &str) -> Vec<Span> {
        let Some(tagger) = &self.tagger else {
            return Vec::new();
        };
        match tagger.tag(query).await {
            Ok(tags) => decode_bio_spans(query, &tags),
            Err(e) => {
                warn!("sequence tagger failed, continuing rule-only: {}", e);
                Vec::new()
            }
        }
    }

    /// Run the full grounding flow for one query. The graph store may
    /// be absent (unreachable); every template then degrades to its
    /// not-connected block.
    pub async fn ground(&self, query: &str, graph: Option<&dyn GraphStore>) -> GroundedAnswer {
        let mut entities = self.extract_entities(query).await;
        let intent_text = self.intents.recognize(query).await;
        info!("recognized intent: {}", intent_text);

        let inference = infer_disease_from_symptom(&mut entities, graph).await;
        let templates = dispatch(&intent_text, &entities);
        let bundle = assemble_prompt(query, &entities, &inference, &templates, graph).await;

        GroundedAnswer {
            entities,
            intent: bundle.intent,
            prompt: bundle.prompt,
            knowledge: bundle.knowledge,
        }
    }
}
