//! FTP client error taxonomy.

use crate::types::Response;
use thiserror::Error;

/// Distinct error kinds a client operation can surface. Each variant that
/// can plausibly happen mid-exchange carries the last response received on
/// the control channel, per the "message | last_response_code |
/// last_response_text" user-visible shape.
#[derive(Error, Debug)]
pub enum FtpError {
    #[error("connection error: {message}")]
    ConnectionError {
        message: String,
        last_response: Option<Response>,
    },

    #[error("TLS error: {message}")]
    TlsError {
        message: String,
        last_response: Option<Response>,
    },

    #[error("authentication failed: {message}")]
    AuthError {
        message: String,
        last_response: Option<Response>,
    },

    #[error("protocol error: {message}")]
    ProtocolError {
        message: String,
        last_response: Option<Response>,
    },

    #[error("command not supported: {command}")]
    CommandNotSupported {
        command: String,
        last_response: Option<Response>,
    },

    #[error("data connection error: {message}")]
    DataConnectionError {
        message: String,
        last_response: Option<Response>,
    },

    #[error("data connection timed out")]
    DataConnectionTimeout { last_response: Option<Response> },

    #[error("data compression error: {message}")]
    DataCompressionError { message: String },

    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityError { expected: String, actual: String },

    #[error("transfer failed: {message}")]
    TransferError {
        message: String,
        last_response: Option<Response>,
    },

    #[error("remote path already exists: {path}")]
    AlreadyExists { path: String },

    #[error("connection closed by remote")]
    ConnectionClosed,

    #[error("operation cancelled")]
    Cancelled,

    #[error("client busy with another operation")]
    Busy,

    /// Reserved for an external collaborator (GPG passphrase handling);
    /// never constructed by this crate.
    #[error("bad passphrase")]
    BadPassphrase,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type FtpResult<T> = Result<T, FtpError>;

impl FtpError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::ConnectionError {
            message: message.into(),
            last_response: None,
        }
    }

    pub fn tls(message: impl Into<String>) -> Self {
        Self::TlsError {
            message: message.into(),
            last_response: None,
        }
    }

    pub fn auth(message: impl Into<String>, last_response: Option<Response>) -> Self {
        Self::AuthError {
            message: message.into(),
            last_response,
        }
    }

    pub fn protocol(message: impl Into<String>, last_response: Option<Response>) -> Self {
        Self::ProtocolError {
            message: message.into(),
            last_response,
        }
    }

    pub fn data_connection(message: impl Into<String>, last_response: Option<Response>) -> Self {
        Self::DataConnectionError {
            message: message.into(),
            last_response,
        }
    }

    pub fn transfer(message: impl Into<String>, last_response: Option<Response>) -> Self {
        Self::TransferError {
            message: message.into(),
            last_response,
        }
    }

    /// Classify a non-2xx control-channel reply that isn't otherwise
    /// handled inline by its caller.
    pub fn from_response(response: &Response) -> Self {
        match response.code {
            Some(421) => Self::ConnectionClosed,
            Some(500) | Some(502) => Self::CommandNotSupported {
                command: response.text.clone(),
                last_response: Some(response.clone()),
            },
            Some(530) => Self::auth(response.text.clone(), Some(response.clone())),
            _ => Self::protocol(response.text.clone(), Some(response.clone())),
        }
    }

    /// The `message | last_response_code | last_response_text` shape the
    /// spec calls for.
    pub fn user_message(&self) -> String {
        let last = self.last_response();
        match last {
            Some(r) => format!(
                "{} | {} | {}",
                self,
                r.code.map(|c| c.to_string()).unwrap_or_default(),
                r.text
            ),
            None => format!("{} | |", self),
        }
    }

    pub fn last_response(&self) -> Option<&Response> {
        match self {
            Self::ConnectionError { last_response, .. }
            | Self::TlsError { last_response, .. }
            | Self::AuthError { last_response, .. }
            | Self::ProtocolError { last_response, .. }
            | Self::CommandNotSupported { last_response, .. }
            | Self::DataConnectionError { last_response, .. }
            | Self::DataConnectionTimeout { last_response }
            | Self::TransferError { last_response, .. } => last_response.as_ref(),
            _ => None,
        }
    }
}

impl From<rustls::Error> for FtpError {
    fn from(e: rustls::Error) -> Self {
        Self::tls(e.to_string())
    }
}
