use thiserror::Error;

/// Errors surfaced to the conversation view.
///
/// Storage failures never show up here; the conversation and settings layers
/// log them and fall back to in-memory state.
#[derive(Debug, Error)]
pub enum ChatError {
    /// A required endpoint field (base URL, API key, model) is empty.
    #[error("AI endpoint is not configured: {0}")]
    Configuration(String),

    /// The endpoint answered with a non-success status.
    #[error("request failed: {status} {body}")]
    Request { status: u16, body: String },

    /// The completion parsed but carried no usable reply text.
    #[error("the endpoint returned no reply content; check that it is OpenAI-compatible")]
    EmptyReply,

    /// The model listing parsed but carried no usable list.
    #[error("no model list found in the response; check that the endpoint is OpenAI-compatible")]
    NoModels,

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid contact: {0}")]
    InvalidContact(String),

    #[error("a reply is already being generated")]
    Busy,
}

impl ChatError {
    /// True for failures the user fixes by editing the endpoint settings.
    pub fn is_configuration(&self) -> bool {
        matches!(self, ChatError::Configuration(_))
    }
}

pub type ChatResult<T> = std::result::Result<T, ChatError>;
