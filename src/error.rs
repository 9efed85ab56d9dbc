//! Client-level error types shared across the orchestrator, refresh coordinator, and transports.

// self
use crate::{_prelude::*, api::ApiDescriptorError};

/// Client-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical client error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS) before an HTTP response arrived.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// The per-call deadline elapsed before a response arrived.
	#[error("Request timed out after {after}.")]
	Timeout {
		/// Deadline that was exceeded.
		after: Duration,
	},
	/// Server answered with a non-2xx status other than a recoverable 401.
	#[error("Server responded with HTTP {status}.")]
	Http {
		/// HTTP status code.
		status: u16,
		/// Parsed JSON error payload, when the body was JSON.
		body: Option<Value>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// A 401 survived one refresh-and-retry cycle.
	#[error("Session expired and could not be restored by a refresh.")]
	AuthExpired,
	/// The refresh call itself failed; the session has been terminated.
	#[error(transparent)]
	RefreshFailed(#[from] RefreshFailure),
	/// Response body did not match the expected shape.
	#[error("Response body could not be decoded.")]
	Decode {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
}
impl Error {
	/// Returns `true` when the error terminated the current user session.
	///
	/// Hosts typically navigate to an unauthenticated entry point when this holds.
	pub fn ends_session(&self) -> bool {
		matches!(self, Self::AuthExpired | Self::RefreshFailed(_))
	}

	/// Returns the HTTP status carried by the error, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Http { status, .. } => Some(*status),
			Self::AuthExpired => Some(401),
			Self::RefreshFailed(RefreshFailure::Status { status }) => Some(*status),
			_ => None,
		}
	}
}

/// Failure of a shared refresh operation.
///
/// Every caller waiting on the same operation receives a clone of the same value.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum RefreshFailure {
	/// The refresh call failed before a response arrived.
	#[error("Refresh request failed in transport: {message}.")]
	Transport {
		/// Transport-supplied message.
		message: String,
	},
	/// The refresh call exceeded the per-call deadline.
	#[error("Refresh request timed out.")]
	Timeout,
	/// The refresh endpoint answered with a non-2xx status.
	#[error("Refresh endpoint responded with HTTP {status}.")]
	Status {
		/// HTTP status code.
		status: u16,
	},
	/// The refresh response carried no usable access token.
	#[error("Refresh response did not contain an access token.")]
	MissingToken,
}
impl From<TransportError> for RefreshFailure {
	fn from(e: TransportError) -> Self {
		match e {
			TransportError::TimedOut => Self::Timeout,
			other => Self::Transport { message: other.to_string() },
		}
	}
}

/// Configuration and request-construction failures raised by the client.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// API descriptor failed validation.
	#[error(transparent)]
	InvalidDescriptor(#[from] ApiDescriptorError),
	/// Base URL + path did not form a valid URL.
	#[error("Request path `{path}` does not form a valid URL.")]
	InvalidUrl {
		/// Offending request path.
		path: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A header value could not be encoded.
	#[error("Header `{name}` contains characters that cannot be sent.")]
	InvalidHeaderValue {
		/// Header name.
		name: &'static str,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO, deadline).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the API.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the API.")]
	Io(#[from] std::io::Error),
	/// The transport gave up waiting for a response.
	#[error("The API did not respond before the deadline.")]
	TimedOut,
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() { Self::TimedOut } else { Self::network(e) }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn session_ending_errors_are_flagged() {
		assert!(Error::AuthExpired.ends_session());
		assert!(Error::RefreshFailed(RefreshFailure::MissingToken).ends_session());
		assert!(!Error::Timeout { after: Duration::seconds(10) }.ends_session());
		assert!(
			!Error::Http { status: 500, body: None, retry_after: None }.ends_session(),
			"Plain HTTP failures must stay displayable by the caller."
		);
	}

	#[test]
	fn timed_out_transport_maps_to_refresh_timeout() {
		assert_eq!(RefreshFailure::from(TransportError::TimedOut), RefreshFailure::Timeout);

		let io = TransportError::Io(std::io::Error::other("connection reset"));

		assert!(matches!(RefreshFailure::from(io), RefreshFailure::Transport { .. }));
	}

	#[test]
	fn status_is_exposed_for_http_failures() {
		let err = Error::Http { status: 404, body: None, retry_after: None };

		assert_eq!(err.status(), Some(404));
		assert_eq!(
			Error::RefreshFailed(RefreshFailure::Status { status: 500 }).status(),
			Some(500)
		);
		assert_eq!(Error::Transport(TransportError::TimedOut).status(), None);
	}
}
