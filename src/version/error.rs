use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionParseError {
    #[error("Empty version range expression")]
    Empty,

    #[error("Unexpected character {found:?} at offset {offset}")]
    UnexpectedChar { found: char, offset: usize },

    #[error("Unbalanced bracket at offset {offset}")]
    UnbalancedBracket { offset: usize },

    #[error("Missing separator at offset {offset}")]
    MissingSeparator { offset: usize },

    #[error("Expected a version range at offset {offset}")]
    MissingRange { offset: usize },

    #[error("Unexpected trailing input at offset {offset}")]
    TrailingInput { offset: usize },

    #[error("Invalid version: {0}")]
    InvalidVersion(String),
}
