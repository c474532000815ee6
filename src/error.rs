//! Error types for the Inception client.
//!
//! Every fallible operation in this crate returns [`Error`].  The variants follow the
//! failure modes of talking to the chat service: HTTP status failures, credential
//! failures, malformed responses, and the local plumbing around them.

use std::error;
use std::fmt;
use std::io;
use std::sync::Arc;

/// The main error type for the Inception client.
#[derive(Clone, Debug)]
pub enum Error {
    /// The service answered with a non-2xx status that is not otherwise classified.
    Transport {
        /// HTTP status code.
        status_code: u16,
        /// Response body, as text.
        body: String,
    },

    /// Authentication error: a 401 from the service or incomplete credential material.
    Authentication {
        /// What was wrong with the credentials.
        message: String,
    },

    /// Interactive login did not complete in time.
    AuthTimeout {
        /// What the login was waiting for.
        message: String,
        /// Seconds waited.
        duration: f64,
    },

    /// The response was not valid JSON or did not match the expected shape.
    Protocol {
        /// Why the payload was rejected.
        message: String,
        /// The offending raw payload, when there is one.
        payload: Option<String>,
        /// Decoder error.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// A request or a streamed chunk took too long.
    Timeout {
        /// What was being waited on.
        message: String,
        /// The bound that expired, in seconds.
        duration: Option<f64>,
    },

    /// The service could not be reached.
    Connection {
        message: String,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// reqwest failed for a reason other than a timeout or a connect failure.
    HttpClient {
        message: String,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// The login browser could not be launched or driven.
    Browser {
        message: String,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// Local filesystem or stream I/O failed.
    Io {
        /// What was being read or written.
        message: String,
        source: Arc<io::Error>,
    },

    /// Caller-supplied input was rejected before anything was sent.
    Validation {
        message: String,
        /// Name of the offending argument or header.
        param: Option<String>,
    },

    /// The base URL cannot be used.
    Url {
        message: String,
        source: Option<url::ParseError>,
    },
}

impl Error {
    /// Creates a new transport error.
    pub fn transport(status_code: u16, body: impl Into<String>) -> Self {
        Error::Transport {
            status_code,
            body: body.into(),
        }
    }

    /// Creates a new authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Error::Authentication {
            message: message.into(),
        }
    }

    /// Creates a new login timeout error.
    pub fn auth_timeout(message: impl Into<String>, duration: f64) -> Self {
        Error::AuthTimeout {
            message: message.into(),
            duration,
        }
    }

    /// Creates a new protocol error.
    pub fn protocol(
        message: impl Into<String>,
        payload: Option<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Protocol {
            message: message.into(),
            payload,
            source: source.map(Arc::from),
        }
    }

    /// A request or chunk wait that expired.  `duration` is the bound, when known.
    pub fn timeout(message: impl Into<String>, duration: Option<f64>) -> Self {
        Error::Timeout {
            message: message.into(),
            duration,
        }
    }

    /// The service was unreachable.
    pub fn connection(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Connection {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new HTTP client error.
    pub fn http_client(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::HttpClient {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new browser error.
    pub fn browser(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Browser {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new I/O error.
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Error::Io {
            message: message.into(),
            source: Arc::new(source),
        }
    }

    /// Input rejected before sending; `param` names the culprit.
    pub fn validation(message: impl Into<String>, param: Option<String>) -> Self {
        Error::Validation {
            message: message.into(),
            param,
        }
    }

    pub fn url(message: impl Into<String>, source: Option<url::ParseError>) -> Self {
        Error::Url {
            message: message.into(),
            source,
        }
    }

    /// Returns true if this is a non-2xx status error.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport { .. })
    }

    /// Returns true if this error is related to authentication.
    pub fn is_authentication(&self) -> bool {
        matches!(self, Error::Authentication { .. })
    }

    /// Returns true if interactive login ran out of time.
    pub fn is_auth_timeout(&self) -> bool {
        matches!(self, Error::AuthTimeout { .. })
    }

    /// Returns true if the service sent something we could not understand.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Error::Protocol { .. })
    }

    /// Request and chunk timeouts; not login timeouts.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connection { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation { .. })
    }

    /// Returns the HTTP status code associated with this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Transport { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    /// Returns the raw payload that failed to decode, if any.
    pub fn payload(&self) -> Option<&str> {
        match self {
            Error::Protocol { payload, .. } => payload.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Transport { status_code, body } => {
                if body.is_empty() {
                    write!(f, "HTTP status {status_code}")
                } else {
                    write!(f, "HTTP status {status_code}: {body}")
                }
            }
            Error::Authentication { message } => {
                write!(f, "Authentication error: {message}")
            }
            Error::AuthTimeout { message, duration } => {
                write!(f, "Login timed out after {duration} seconds: {message}")
            }
            Error::Protocol {
                message, payload, ..
            } => {
                if let Some(payload) = payload {
                    write!(f, "Protocol error: {message} (payload: {payload})")
                } else {
                    write!(f, "Protocol error: {message}")
                }
            }
            Error::Timeout { message, duration } => {
                if let Some(duration) = duration {
                    write!(f, "Timeout error: {message} ({duration} seconds)")
                } else {
                    write!(f, "Timeout error: {message}")
                }
            }
            Error::Connection { message, .. } => {
                write!(f, "Connection error: {message}")
            }
            Error::HttpClient { message, .. } => {
                write!(f, "HTTP client error: {message}")
            }
            Error::Browser { message, .. } => {
                write!(f, "Browser error: {message}")
            }
            Error::Io { message, .. } => {
                write!(f, "I/O error: {message}")
            }
            Error::Validation { message, param } => {
                if let Some(param) = param {
                    write!(f, "Validation error: {message} (parameter: {param})")
                } else {
                    write!(f, "Validation error: {message}")
                }
            }
            Error::Url { message, .. } => {
                write!(f, "URL error: {message}")
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Protocol { source, .. }
            | Error::Connection { source, .. }
            | Error::HttpClient { source, .. }
            | Error::Browser { source, .. } => source
                .as_deref()
                .map(|e| e as &(dyn error::Error + 'static)),
            Error::Io { source, .. } => Some(source),
            Error::Url { source, .. } => {
                source.as_ref().map(|e| e as &(dyn error::Error + 'static))
            }
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::io(err.to_string(), err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::protocol(format!("JSON error: {err}"), None, Some(Box::new(err)))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::url(format!("URL parse error: {err}"), Some(err))
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
