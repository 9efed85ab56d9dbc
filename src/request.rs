//! Request descriptors: the immutable description of one logical API call.

// crates.io
use http::{HeaderMap, HeaderName, HeaderValue, Method};
// self
use crate::_prelude::*;

/// Payload attached to a request.
#[derive(Clone, Debug, PartialEq)]
pub enum RequestBody {
	/// Structured payload, serialized as JSON text at dispatch.
	Json(Value),
	/// Pre-encoded text, sent unchanged.
	Text(String),
	/// Pre-encoded binary payload, sent unchanged without a default content type.
	Bytes(Vec<u8>),
	/// Multipart form; the transport writes its own boundary header.
	Multipart(MultipartBody),
}
impl RequestBody {
	/// Returns `true` when the default JSON content type applies.
	pub fn is_textual(&self) -> bool {
		matches!(self, Self::Json(_) | Self::Text(_))
	}
}

/// One part of a multipart form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultipartPart {
	/// Form field name.
	pub name: String,
	/// Raw part content.
	pub data: Vec<u8>,
	/// File name reported to the server, for file uploads.
	pub file_name: Option<String>,
	/// MIME type of the part.
	pub content_type: Option<String>,
}
impl MultipartPart {
	/// Creates a plain text field.
	pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			data: value.into().into_bytes(),
			file_name: None,
			content_type: None,
		}
	}

	/// Creates a file field.
	pub fn file(name: impl Into<String>, file_name: impl Into<String>, data: Vec<u8>) -> Self {
		Self { name: name.into(), data, file_name: Some(file_name.into()), content_type: None }
	}

	/// Sets the MIME type of the part.
	pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
		self.content_type = Some(content_type.into());

		self
	}
}

/// Multipart form kept as plain data so it can be re-sent on retry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MultipartBody {
	/// Parts in submission order.
	pub parts: Vec<MultipartPart>,
}
impl MultipartBody {
	/// Creates an empty form.
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends a part.
	pub fn part(mut self, part: MultipartPart) -> Self {
		self.parts.push(part);

		self
	}
}

/// Immutable description of one outbound call.
///
/// Built once with the consuming `with_*` methods; the client re-issues the very same
/// descriptor when it retries after a refresh.
#[derive(Clone, Debug)]
pub struct RequestDescriptor {
	method: Method,
	path: String,
	body: Option<RequestBody>,
	query: Vec<(String, String)>,
	headers: HeaderMap,
}
impl RequestDescriptor {
	/// Creates a descriptor for `method` + `path`.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self {
			method,
			path: path.into(),
			body: None,
			query: Vec::new(),
			headers: HeaderMap::new(),
		}
	}

	/// Shorthand for a `GET` descriptor.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::GET, path)
	}

	/// Shorthand for a `POST` descriptor.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::POST, path)
	}

	/// Shorthand for a `PUT` descriptor.
	pub fn put(path: impl Into<String>) -> Self {
		Self::new(Method::PUT, path)
	}

	/// Shorthand for a `PATCH` descriptor.
	pub fn patch(path: impl Into<String>) -> Self {
		Self::new(Method::PATCH, path)
	}

	/// Shorthand for a `DELETE` descriptor.
	pub fn delete(path: impl Into<String>) -> Self {
		Self::new(Method::DELETE, path)
	}

	/// Attaches a body.
	pub fn with_body(mut self, body: RequestBody) -> Self {
		self.body = Some(body);

		self
	}

	/// Attaches a structured JSON body.
	pub fn with_json(self, value: Value) -> Self {
		self.with_body(RequestBody::Json(value))
	}

	/// Serializes `payload` into a structured JSON body.
	pub fn with_payload<T>(self, payload: &T) -> Result<Self, serde_json::Error>
	where
		T: ?Sized + Serialize,
	{
		Ok(self.with_json(serde_json::to_value(payload)?))
	}

	/// Appends one query parameter.
	pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.query.push((key.into(), value.into()));

		self
	}

	/// Appends several query parameters.
	pub fn with_queries<I, K, V>(mut self, pairs: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		self.query.extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));

		self
	}

	/// Sets a header that overrides the client defaults.
	pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
		self.headers.insert(name, value);

		self
	}

	/// HTTP method.
	pub fn method(&self) -> &Method {
		&self.method
	}

	/// Path appended to the base URL.
	pub fn path(&self) -> &str {
		&self.path
	}

	/// Body, if any.
	pub fn body(&self) -> Option<&RequestBody> {
		self.body.as_ref()
	}

	/// Query parameters in insertion order.
	pub fn query(&self) -> &[(String, String)] {
		&self.query
	}

	/// Caller-supplied header overrides.
	pub fn headers(&self) -> &HeaderMap {
		&self.headers
	}

	/// Returns `true` for methods that never carry a body.
	pub fn is_read_only(&self) -> bool {
		self.method == Method::GET || self.method == Method::HEAD
	}
}
