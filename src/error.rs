use thiserror::Error;

/// Failures surfaced while handling one input line.
///
/// The `Display` text of each variant is exactly the diagnostic written to
/// the command's error sink; none of them ends the shell.
#[derive(Debug, Error)]
pub enum ShellError {
    /// Malformed redirection, e.g. an operator with no target after it.
    #[error("syntax error: {0}")]
    Syntax(String),
    /// File open/read/write or directory listing failure.
    #[error("{0}")]
    Io(String),
    /// Wrong argument count or type for a built-in.
    #[error("{0}")]
    Validation(String),
    /// Unknown user or wrong credential.
    #[error("{0}")]
    Auth(String),
    /// External program failed to start or exited with a nonzero status.
    #[error("{0}")]
    Spawn(String),
    /// The execution search path had no match for this name.
    #[error("{0}: command not found")]
    CommandNotFound(String),
    /// A credential or history collaborator could not serve the request.
    #[error("{0}")]
    Lookup(String),
}

/// Failures of the credential and history collaborators.
///
/// The underlying cause is part of the message, not a separate error source.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{path}: {reason}")]
    Io { path: String, reason: std::io::Error },
    #[error("{path}: malformed data: {reason}")]
    Corrupt {
        path: String,
        reason: serde_json::Error,
    },
    #[error("password hashing failed: {0}")]
    Hash(bcrypt::BcryptError),
}

impl From<StoreError> for ShellError {
    fn from(err: StoreError) -> Self {
        ShellError::Lookup(err.to_string())
    }
}
