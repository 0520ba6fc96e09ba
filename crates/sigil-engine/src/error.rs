pub const GENERIC_FAILURE_MESSAGE: &str =
    "Something went wrong while generating the logo. Please try again.";
pub const REMIX_FAILURE_PREFIX: &str = "Failed to create variations. ";

/// Everything a generate or remix action can fail with.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    /// The brief is missing a brand name or description. Raised before any
    /// network call.
    #[error("{message}")]
    Validation { message: String },

    /// The backend answered, but no part of the first candidate carried image
    /// data.
    #[error("Generation failed: no image data found in response.")]
    NoImageInResponse,

    /// Network or backend-level failure.
    #[error("{message}")]
    Transport { message: String },

    /// Another batch is still in flight for this session.
    #[error("A generation is already in progress.")]
    AlreadyInFlight,

    #[error("Unknown artifact: {id}")]
    UnknownArtifact { id: String },
}

impl GenerationError {
    pub fn transport(message: impl Into<String>) -> Self {
        GenerationError::Transport {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            GenerationError::Validation { .. } => "validation",
            GenerationError::NoImageInResponse => "no_image_in_response",
            GenerationError::Transport { .. } => "transport",
            GenerationError::AlreadyInFlight => "already_in_flight",
            GenerationError::UnknownArtifact { .. } => "unknown_artifact",
        }
    }

    /// The single message shown to the user for a failed action.
    pub fn user_message(&self) -> String {
        match self {
            GenerationError::Transport { message } if message.trim().is_empty() => {
                GENERIC_FAILURE_MESSAGE.to_string()
            }
            other => other.to_string(),
        }
    }
}
