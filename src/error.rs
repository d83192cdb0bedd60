use thiserror::Error;

/// Failure classes of the production and publishing stages.
///
/// `Asset` is recovered inside the visuals stage and never reaches the
/// orchestrator; every other variant aborts the current article.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("manifest generation failed: {0}")]
    Generation(String),

    #[error("speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("scene {scene} image unavailable: {message}")]
    Asset { scene: u32, message: String },

    #[error("video render failed: {0}")]
    Render(String),

    #[error("publish failed: {0}")]
    Publish(String),
}

impl PipelineError {
    pub fn generation(err: impl std::fmt::Display) -> Self {
        Self::Generation(format!("{err:#}"))
    }

    pub fn synthesis(err: impl std::fmt::Display) -> Self {
        Self::Synthesis(format!("{err:#}"))
    }

    pub fn render(err: impl std::fmt::Display) -> Self {
        Self::Render(format!("{err:#}"))
    }

    pub fn publish(err: impl std::fmt::Display) -> Self {
        Self::Publish(format!("{err:#}"))
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
