//! Transport primitives for API calls.
//!
//! [`HttpTransport`] is the client's only dependency on an HTTP stack. The orchestrator hands
//! it a fully assembled [`OutboundRequest`] (URL, headers, encoded body, deadline) and reads
//! back a buffered [`TransportResponse`]. Implementations report an elapsed deadline as
//! [`TransportError::TimedOut`] so callers can tell a slow server from an unreachable one.
//!
//! The refresh credential lives in an HTTP-only cookie, so a transport used against a real
//! backend must keep a cookie jar. [`ReqwestTransport::new`] enables one.

// std
use std::time::Duration as StdDuration;
// crates.io
use http::{HeaderMap, Method, StatusCode, header::RETRY_AFTER};
use time::{OffsetDateTime, format_description::well_known::Rfc2822};
// self
#[cfg(feature = "reqwest")] use crate::error::ConfigError;
use crate::{_prelude::*, error::TransportError, request::MultipartBody};

/// Boxed future returned by [`HttpTransport::send`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<TransportResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP stacks capable of executing one assembled request.
///
/// Implementations must be `Send + Sync + 'static` so they can be shared between the
/// orchestrator and the refresh coordinator, whose shared refresh future outlives any single
/// caller.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Dispatches `request`, honoring [`OutboundRequest::timeout`].
	fn send(&self, request: OutboundRequest) -> TransportFuture<'_>;
}

/// Encoded body ready for the wire.
#[derive(Clone, Debug, PartialEq)]
pub enum OutboundBody {
	/// Raw bytes (JSON text, pre-encoded text, or binary).
	Bytes(Vec<u8>),
	/// Multipart form; the transport generates the boundary and its content type.
	Multipart(MultipartBody),
}

/// Fully assembled request handed to a transport.
#[derive(Clone, Debug)]
pub struct OutboundRequest {
	/// HTTP method.
	pub method: Method,
	/// Absolute target URL, query included.
	pub url: Url,
	/// Final header set.
	pub headers: HeaderMap,
	/// Encoded body, if any.
	pub body: Option<OutboundBody>,
	/// Deadline for the whole exchange.
	pub timeout: StdDuration,
}

/// Buffered response returned by a transport.
#[derive(Clone, Debug)]
pub struct TransportResponse {
	/// HTTP status code.
	pub status: StatusCode,
	/// Response headers.
	pub headers: HeaderMap,
	/// Raw body bytes.
	pub body: Vec<u8>,
}
impl TransportResponse {
	/// Creates a response with no headers.
	pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
		Self { status, headers: HeaderMap::new(), body: body.into() }
	}

	/// Parses the `Retry-After` header into a relative duration.
	pub fn retry_after(&self) -> Option<Duration> {
		parse_retry_after(&self.headers)
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Any custom [`ReqwestClient`] should enable its cookie store (the refresh credential is an
/// HTTP-only cookie) and disable redirect following, so auth failures surface as 401s instead
/// of login-page redirects.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Builds a client with a cookie jar and redirects disabled.
	pub fn new() -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder()
			.cookie_store(true)
			.redirect(reqwest::redirect::Policy::none())
			.build()?;

		Ok(Self(client))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	fn send(&self, request: OutboundRequest) -> TransportFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let mut builder = client
				.request(request.method, request.url)
				.headers(request.headers)
				.timeout(request.timeout);

			match request.body {
				Some(OutboundBody::Bytes(bytes)) => builder = builder.body(bytes),
				Some(OutboundBody::Multipart(form)) => builder = builder.multipart(to_form(form)?),
				None => {},
			}

			let response = builder.send().await?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let body = response.bytes().await?.to_vec();

			Ok::<_, TransportError>(TransportResponse { status, headers, body })
		})
	}
}

#[cfg(feature = "reqwest")]
fn to_form(body: MultipartBody) -> Result<reqwest::multipart::Form, TransportError> {
	let mut form = reqwest::multipart::Form::new();

	for part in body.parts {
		let mut piece = reqwest::multipart::Part::bytes(part.data);

		if let Some(file_name) = part.file_name {
			piece = piece.file_name(file_name);
		}
		if let Some(content_type) = part.content_type.as_deref() {
			piece = piece.mime_str(content_type)?;
		}

		form = form.part(part.name, piece);
	}

	Ok(form)
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return Some(Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX)));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}
