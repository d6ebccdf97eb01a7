use thiserror::Error;

/// Errors surfaced by the per-speaker pipeline (§7). Failures in one fan-out
/// branch never become this type's problem to propagate to the others — each
/// branch's `translator_core::Error` is recorded on its own trace span and
/// swallowed there (§4.4 step 7, §7 "Fan-out partial failure").
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("speech-to-text failed: {0}")]
    Stt(#[source] translator_core::Error),

    #[error("translation failed: {0}")]
    Translate(#[source] translator_core::Error),

    #[error("speech synthesis failed: {0}")]
    Synthesize(#[source] translator_core::Error),

    #[error("room publish failed: {0}")]
    Publish(#[source] translator_core::Error),

    #[error("pipeline cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, PipelineError>;
