//! Common error taxonomy shared by every provider adapter and the control plane.
//!
//! Adapters translate vendor wire failures into [`Error`] at their boundary, so
//! callers only ever match on [`ErrorKind`]. The HTTP layer renders
//! [`Error::code`], [`Error::message`] and [`Error::suggestion`] directly.

use crate::types::RuntimeProvider;

/// Boxed cause carried by an [`Error`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used throughout the runtime.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Classification of a failure, each mapping onto an HTTP-style status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller or input fault.
    BadRequest,
    /// Missing or stale provider credentials.
    Unauthorized,
    /// Credentials valid but not allowed to perform the operation.
    Forbidden,
    /// Resource does not exist.
    NotFound,
    /// Persistence or programming fault.
    Internal,
    /// The provider has no capacity for the requested node type.
    CapacityExhausted,
    /// Unexpected provider status; the original code is preserved.
    Unknown(u16),
}

impl ErrorKind {
    /// HTTP-style status code for this kind.
    pub fn code(self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::Internal => 500,
            Self::CapacityExhausted => 503,
            Self::Unknown(code) => code,
        }
    }
}

/// Structured failure: kind, provider attribution, user-facing message,
/// optional remediation hint and the wrapped cause.
#[derive(Debug, thiserror::Error)]
#[error("{}", render(.context.as_deref(), .provider.as_ref(), .message))]
pub struct Error {
    kind: ErrorKind,
    provider: Option<RuntimeProvider>,
    message: String,
    suggestion: Option<String>,
    context: Option<String>,
    #[source]
    source: Option<BoxError>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            provider: None,
            message: message.into(),
            suggestion: None,
            context: None,
            source: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    pub fn capacity_exhausted(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CapacityExhausted, message)
    }

    #[must_use]
    pub fn with_provider(mut self, provider: RuntimeProvider) -> Self {
        self.provider = Some(provider);
        self
    }

    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        let suggestion = suggestion.into();
        self.suggestion = (!suggestion.is_empty()).then_some(suggestion);
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Wrap this error with operation context.
    ///
    /// The wrapper keeps the kind, provider, message and suggestion so the API
    /// boundary renders the same thing, while the original stays reachable
    /// through [`std::error::Error::source`].
    #[must_use]
    pub fn context(self, context: impl Into<String>) -> Self {
        Self {
            kind: self.kind,
            provider: self.provider,
            message: self.message.clone(),
            suggestion: self.suggestion.clone(),
            context: Some(context.into()),
            source: Some(Box::new(self)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> u16 {
        self.kind.code()
    }

    pub fn provider(&self) -> Option<RuntimeProvider> {
        self.provider
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn suggestion(&self) -> Option<&str> {
        self.suggestion.as_deref()
    }
}

/// Context wins; otherwise provider errors are prefixed with the provider name.
fn render(context: Option<&str>, provider: Option<&RuntimeProvider>, message: &str) -> String {
    match (context, provider) {
        (Some(context), _) => context.to_string(),
        (None, Some(provider)) => format!("{provider} API error: {message}"),
        (None, None) => message.to_string(),
    }
}

/// Extension for attaching operation context to fallible runtime calls.
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(context))
    }
}
