use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("malformed XML: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("missing element: {0}")]
    Missing(&'static str),

    #[error("invalid value for {field}: {value:?}")]
    InvalidValue { field: &'static str, value: String },

    #[error("invalid message: {0}")]
    Invalid(String),

    /// The message is well formed but the requested operation does not apply to it.
    #[error("not applicable: {0}")]
    NotApplicable(String),

    #[error("catalog I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("catalog format error: {0}")]
    Json(#[from] serde_json::Error),
}
