pub mod align;
pub mod dictionary;
pub mod dispatch;
pub mod entity;
pub mod error;
pub mod graph;
pub mod intent;
pub mod matcher;
pub mod merge;
pub mod pipeline;
pub mod prompt;

// Re-export commonly used types
pub use align::CanonicalAligner;
pub use dictionary::TermIndex;
pub use dispatch::{DISPATCH_TABLE, QueryKind, QueryTemplate, SymptomInference, dispatch};
pub use entity::{EntityCategory, EntityMap, Span, SpanSource, decode_bio_spans};
pub use error::{KgqaError, Result};
pub use graph::{GraphStore, Neo4jHttpStore, Row, string_cells};
pub use intent::{IntentService, LlmClient};
pub use matcher::DictionaryMatcher;
pub use merge::merge_spans;
pub use pipeline::{GroundedAnswer, QaPipeline, SequenceTagger};
pub use prompt::{PromptBundle, assemble_prompt, extract_knowledge};
