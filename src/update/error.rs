use thiserror::Error;

/// Errors raised while applying a patch specification.
///
/// Both variants are programmer errors: the patch does not fit the value it
/// is applied to. They are returned to the caller, never recovered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpdateError {
    /// Malformed specification or a directive applied to the wrong kind of value.
    #[error("Invalid update specification at '{path}': {message}")]
    Configuration { path: String, message: String },

    /// The specification descends into a key or index the value does not have.
    #[error("Path '{path}' not found: missing segment '{segment}'")]
    PathNotFound { path: String, segment: String },
}

impl UpdateError {
    pub(crate) fn configuration(path: &[String], message: impl Into<String>) -> Self {
        UpdateError::Configuration {
            path: display_path(path),
            message: message.into(),
        }
    }

    pub(crate) fn path_not_found(path: &[String], segment: &str) -> Self {
        UpdateError::PathNotFound {
            path: display_path(path),
            segment: segment.to_string(),
        }
    }
}

pub(crate) fn display_path(path: &[String]) -> String {
    if path.is_empty() {
        return "<root>".to_string();
    }
    path.join(".")
}
