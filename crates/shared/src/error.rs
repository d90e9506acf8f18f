//! Error taxonomy shared by the store, the inference client and the session.

/// Every failure the chat core can report to its caller
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    #[error("Please enter a message")]
    EmptyInput,

    #[error("Inference service unavailable: {0}")]
    InferenceUnavailable(String),

    #[error("Malformed stream fragment: {0}")]
    MalformedStreamFragment(String),

    #[error("The {kind} '{name}' already exists")]
    DuplicateName { kind: &'static str, name: String },

    #[error("The {kind} name must not be empty")]
    BlankName { kind: &'static str },

    #[error("Stored conversations could not be read: {0}")]
    CorruptData(String),

    #[error("Unknown {kind}: '{name}'")]
    NotFound { kind: &'static str, name: String },

    #[error("Please log in first")]
    NotLoggedIn,

    #[error("Storage error: {0}")]
    Storage(String),
}

pub type ChatResult<T> = Result<T, ChatError>;

impl ChatError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn duplicate(kind: &'static str, name: impl Into<String>) -> Self {
        Self::DuplicateName {
            kind,
            name: name.into(),
        }
    }

    /// Errors the user caused and can fix by changing their input
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyInput | Self::DuplicateName { .. } | Self::BlankName { .. }
        )
    }
}
