//! use cakit::error::CaError;

use std::borrow::Cow;

use thiserror::Error;

/// Represents errors that can occur in the CA engine.
///
/// Domain kinds (`InvalidName`, `NotIssuerNotCA`, ...) are what callers match
/// on; library kinds wrap failures from the crypto, encoding and store layers.
/// Engine operations wrap errors in [`CaError::Stage`] layers naming the step
/// that failed, use [`CaError::root_cause`] to get at the kind.
#[derive(Debug, Error)]
pub enum CaError {
    /// Subject name is empty after trimming.
    #[error("subject name invalid")]
    InvalidName,

    /// An IP address attribute does not parse.
    #[error("invalid IP address: {0}")]
    InvalidAddress(String),

    /// The referenced issuer does not exist or is revoked.
    #[error("issuer certificate {0} not found")]
    IssuerNotFound(u64),

    /// The referenced issuer exists but has no signing capability.
    #[error("issuer certificate is not CA")]
    NotIssuerNotCA,

    /// CA private key requested while the policy forbids it.
    #[error("exposition CA key disabled by policy")]
    KeyNotExposed,

    /// Sealed key material is not decodable.
    #[error("invalid ciphertext: {0}")]
    InvalidCiphertext(String),

    /// A stored serial number is not a decimal integer.
    #[error("invalid serial number of certificate {0}")]
    InvalidSerial(u64),

    /// Unknown (or revoked) certificate id.
    #[error("certificate {0} not found")]
    NotFound(u64),

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// Error during data encoding.
    #[error("Failed to encode data: {0}")]
    EncodingError(String),

    /// Error during data decoding.
    #[error("Failed to decode data: {0}")]
    DecodingError(String),

    /// Error due to invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Error during key generation.
    #[error("Key generation error: {0}")]
    KeyGenerationError(String),

    /// Error from RSA operations.
    #[error("RSA error: {0}")]
    RsaError(String),

    /// Error from RSA PKCS1 operations.
    #[error("RSA PKCS1 error: {0}")]
    RsaPkcs1Error(String),

    /// Error reported by the certificate store.
    #[error("store error: {0}")]
    Store(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking task panicked or was aborted.
    #[error("background task failed: {0}")]
    Task(String),

    /// An error annotated with the stage that produced it.
    #[error("{stage}: {source}")]
    Stage {
        stage: Cow<'static, str>,
        #[source]
        source: Box<CaError>,
    },
}

pub type CaResult<T> = std::result::Result<T, CaError>;

impl CaError {
    /// Wraps the error with a stage description.
    pub fn in_stage(self, stage: impl Into<Cow<'static, str>>) -> Self {
        CaError::Stage {
            stage: stage.into(),
            source: Box::new(self),
        }
    }

    /// Returns the innermost error, skipping every stage annotation.
    pub fn root_cause(&self) -> &CaError {
        let mut current = self;
        while let CaError::Stage { source, .. } = current {
            current = source;
        }
        current
    }

    /// True when the failure is caused by the request (validation, lookup,
    /// policy) rather than by the engine or its collaborators.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.root_cause(),
            CaError::InvalidName
                | CaError::InvalidAddress(_)
                | CaError::InvalidInput(_)
                | CaError::IssuerNotFound(_)
                | CaError::NotIssuerNotCA
                | CaError::KeyNotExposed
                | CaError::NotFound(_)
        )
    }
}

/// Stage annotation for results.
pub trait ResultExt<T> {
    fn stage(self, stage: &'static str) -> CaResult<T>;

    fn with_stage<F, S>(self, stage: F) -> CaResult<T>
    where
        F: FnOnce() -> S,
        S: Into<Cow<'static, str>>;
}

impl<T, E: Into<CaError>> ResultExt<T> for std::result::Result<T, E> {
    fn stage(self, stage: &'static str) -> CaResult<T> {
        self.map_err(|e| e.into().in_stage(stage))
    }

    fn with_stage<F, S>(self, stage: F) -> CaResult<T>
    where
        F: FnOnce() -> S,
        S: Into<Cow<'static, str>>,
    {
        self.map_err(|e| e.into().in_stage(stage()))
    }
}

impl From<der::Error> for CaError {
    /// Converts a `der::Error` into a `CaError`.
    fn from(err: der::Error) -> Self {
        CaError::DecodingError(err.to_string())
    }
}

impl From<rsa::Error> for CaError {
    fn from(err: rsa::Error) -> Self {
        CaError::RsaError(err.to_string())
    }
}

impl From<rsa::pkcs1::Error> for CaError {
    fn from(err: rsa::pkcs1::Error) -> Self {
        CaError::RsaPkcs1Error(err.to_string())
    }
}

impl From<rsa::signature::Error> for CaError {
    fn from(err: rsa::signature::Error) -> Self {
        CaError::RsaError(err.to_string())
    }
}

impl From<pkcs8::spki::Error> for CaError {
    fn from(err: pkcs8::spki::Error) -> Self {
        CaError::EncodingError(err.to_string())
    }
}

impl From<serde_yaml::Error> for CaError {
    fn from(err: serde_yaml::Error) -> Self {
        CaError::DecodingError(err.to_string())
    }
}

impl From<tokio::task::JoinError> for CaError {
    fn from(err: tokio::task::JoinError) -> Self {
        CaError::Task(err.to_string())
    }
}
