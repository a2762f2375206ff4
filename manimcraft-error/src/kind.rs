//! Error kinds for manimcraft operations

use std::fmt;

/// The kind of error that occurred.
///
/// This enum categorizes errors to help users write clear error handling logic.
/// The repair loop matches on ErrorKind to decide whether a failure is fed back
/// to the model or ends the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // =========================================================================
    // General errors
    // =========================================================================
    /// An unexpected error occurred - catch-all for unhandled cases
    Unexpected,

    /// The requested feature or operation is not supported
    Unsupported,

    /// Invalid configuration or parameters
    ConfigInvalid,

    /// Invalid argument passed to function
    InvalidArgument,

    // =========================================================================
    // IO errors
    // =========================================================================
    /// File not found
    FileNotFound,

    /// Permission denied
    PermissionDenied,

    /// IO operation failed
    IoFailed,

    // =========================================================================
    // Parse errors
    // =========================================================================
    /// Failed to parse input
    ParseFailed,

    /// Serialization/deserialization failed
    SerializationFailed,

    // =========================================================================
    // Inference/LLM errors
    // =========================================================================
    /// LLM inference failed
    InferenceFailed,

    /// Network error
    NetworkFailed,

    /// Rate limit exceeded
    RateLimited,

    /// Missing or rejected credentials
    AuthenticationFailed,

    /// Provider not available
    ProviderUnavailable,

    /// Context too large for model
    ContextTooLarge,

    /// The model kept requesting tools past the round limit
    ToolLimitExceeded,

    /// An operation ran past its deadline
    Timeout,

    // =========================================================================
    // Generation/Render errors
    // =========================================================================
    /// The model's final answer contained no code block
    CodeBlockMissing,

    /// Generated code does not define the expected scene class
    EntryPointMissing,

    /// Rendering the generated scene failed
    RenderFailed,

    /// The repair loop ran out of attempts
    AttemptsExhausted,
}

impl ErrorKind {
    /// Returns the error kind as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            // General
            ErrorKind::Unexpected => "Unexpected",
            ErrorKind::Unsupported => "Unsupported",
            ErrorKind::ConfigInvalid => "ConfigInvalid",
            ErrorKind::InvalidArgument => "InvalidArgument",

            // IO
            ErrorKind::FileNotFound => "FileNotFound",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::IoFailed => "IoFailed",

            // Parse
            ErrorKind::ParseFailed => "ParseFailed",
            ErrorKind::SerializationFailed => "SerializationFailed",

            // Inference
            ErrorKind::InferenceFailed => "InferenceFailed",
            ErrorKind::NetworkFailed => "NetworkFailed",
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::AuthenticationFailed => "AuthenticationFailed",
            ErrorKind::ProviderUnavailable => "ProviderUnavailable",
            ErrorKind::ContextTooLarge => "ContextTooLarge",
            ErrorKind::ToolLimitExceeded => "ToolLimitExceeded",
            ErrorKind::Timeout => "Timeout",

            // Generation/Render
            ErrorKind::CodeBlockMissing => "CodeBlockMissing",
            ErrorKind::EntryPointMissing => "EntryPointMissing",
            ErrorKind::RenderFailed => "RenderFailed",
            ErrorKind::AttemptsExhausted => "AttemptsExhausted",
        }
    }

    /// Check if this error kind is retryable by default
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::InferenceFailed
                | ErrorKind::NetworkFailed
                | ErrorKind::RateLimited
                | ErrorKind::ProviderUnavailable
        )
    }

    /// Failures of a generated script that are fed back to the model
    /// instead of ending the job
    pub fn is_repairable(&self) -> bool {
        matches!(
            self,
            ErrorKind::CodeBlockMissing
                | ErrorKind::EntryPointMissing
                | ErrorKind::RenderFailed
                | ErrorKind::Timeout
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
