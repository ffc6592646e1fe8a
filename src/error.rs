use thiserror::Error;

/// Failures surfaced by wall operations. None of them is fatal; the user can
/// always retry the action that produced one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WallError {
    /// Input rejected locally before any request was made.
    #[error("{0}")]
    Validation(String),

    /// The selected image could not be decoded, resized or re-encoded.
    #[error("image processing failed: {0}")]
    ImageProcessing(String),

    /// The backend (or the transport to it) returned an error.
    #[error("{message}")]
    Backend {
        status: Option<u16>,
        message: String,
    },
}

impl WallError {
    pub fn validation(message: impl Into<String>) -> Self {
        WallError::Validation(message.into())
    }

    pub fn backend(message: impl Into<String>) -> Self {
        WallError::Backend {
            status: None,
            message: message.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, WallError::Validation(_))
    }
}

impl From<reqwest::Error> for WallError {
    fn from(err: reqwest::Error) -> Self {
        WallError::Backend {
            status: err.status().map(|status| status.as_u16()),
            message: err.to_string(),
        }
    }
}

impl From<image::ImageError> for WallError {
    fn from(err: image::ImageError) -> Self {
        WallError::ImageProcessing(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WallError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_error_displays_message_only() {
        let err = WallError::Backend {
            status: Some(409),
            message: "duplicate key value".into(),
        };
        assert_eq!(err.to_string(), "duplicate key value");
    }

    #[test]
    fn image_error_is_prefixed() {
        let err = WallError::ImageProcessing("unsupported format".into());
        assert_eq!(
            err.to_string(),
            "image processing failed: unsupported format"
        );
    }
}
