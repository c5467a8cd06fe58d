use thiserror::Error;

/// Errors surfaced by the grounding pipeline and its collaborators.
///
/// Note that the pipeline itself (match → merge → align → dispatch →
/// assemble) never fails: graph and model errors are degraded into
/// prompt text. These variants exist for startup (dictionary loading)
/// and for the collaborator seams.
#[derive(Error, Debug)]
pub enum KgqaError {
    #[error("dictionary error: {0}")]
    Dictionary(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("graph store error: {0}")]
    GraphStore(String),

    #[error("graph store unreachable: {0}")]
    GraphUnreachable(String),

    #[error("sequence tagger error: {0}")]
    Tagger(String),

    #[error("llm client error: {0}")]
    LlmClient(String),
}

pub type Result<T> = std::result::Result<T, KgqaError>;
