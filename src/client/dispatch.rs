//! Request orchestration: assemble, dispatch, evaluate, recover once.

// crates.io
use http::{
	HeaderMap, HeaderValue, StatusCode,
	header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
};
use serde_json::Map;
// self
use crate::{
	_prelude::*,
	api::{ApiDescriptor, SuccessBodyPolicy},
	client::ApiClient,
	error::{ConfigError, RefreshFailure, TransportError},
	obs::{self, CallKind, CallOutcome, CallSpan, trace_event},
	request::{RequestBody, RequestDescriptor},
	session::{AccessToken, SessionEnd},
	transport::{HttpTransport, OutboundBody, OutboundRequest, TransportResponse},
};

enum Evaluation {
	Done(Value),
	Recover,
}

impl<T> ApiClient<T>
where
	T: ?Sized + HttpTransport,
{
	/// Issues one logical call, recovering from an expired session at most once.
	///
	/// A 401 triggers (or joins) the shared refresh operation; once it settles the same
	/// descriptor is re-issued with the new token. A second 401 surfaces
	/// [`Error::AuthExpired`] without another refresh.
	pub async fn send(&self, request: &RequestDescriptor) -> Result<Value> {
		let kind = if self.descriptor.is_session_probe_path(request.path()) {
			CallKind::SessionProbe
		} else {
			CallKind::Request
		};
		let span = CallSpan::new(kind, "send");

		obs::record_call_outcome(kind, CallOutcome::Attempt);

		let result = span.instrument(self.execute(request)).await;

		match &result {
			Ok(_) => obs::record_call_outcome(kind, CallOutcome::Success),
			Err(_) => obs::record_call_outcome(kind, CallOutcome::Failure),
		}

		result
	}

	async fn execute(&self, request: &RequestDescriptor) -> Result<Value> {
		let token = self.session.get();
		let response = self.dispatch(request, token.as_ref()).await?;

		match self.evaluate(request, response)? {
			Evaluation::Done(value) => return Ok(value),
			Evaluation::Recover => {},
		}

		trace_event!(path = request.path(), "access token rejected, recovering");

		let fresh = self.coordinator().recover(token.as_ref()).await?;
		let response = self.dispatch(request, Some(&fresh)).await?;

		match self.evaluate(request, response)? {
			Evaluation::Done(value) => Ok(value),
			Evaluation::Recover => {
				self.coordinator().abandon(SessionEnd::AuthExpired);

				Err(Error::AuthExpired)
			},
		}
	}

	async fn dispatch(
		&self,
		request: &RequestDescriptor,
		token: Option<&AccessToken>,
	) -> Result<TransportResponse> {
		let outbound = assemble(&self.descriptor, request, token)?;

		self.transport.send(outbound).await.map_err(|e| match e {
			TransportError::TimedOut => Error::Timeout { after: self.descriptor.timeout },
			other => Error::Transport(other),
		})
	}

	fn evaluate(
		&self,
		request: &RequestDescriptor,
		response: TransportResponse,
	) -> Result<Evaluation> {
		let status = response.status;

		if status.is_success() {
			return decode_success(self.descriptor.success_body_policy, &response.body)
				.map(Evaluation::Done);
		}
		if status == StatusCode::UNAUTHORIZED {
			if self.descriptor.is_session_probe_path(request.path()) {
				return Ok(Evaluation::Done(anonymous()));
			}
			if self.descriptor.is_refresh_path(request.path()) {
				self.coordinator().abandon(SessionEnd::RefreshRejected);

				return Err(RefreshFailure::Status { status: status.as_u16() }.into());
			}

			return Ok(Evaluation::Recover);
		}

		Err(Error::Http {
			status: status.as_u16(),
			body: serde_json::from_slice(&response.body).ok(),
			retry_after: response.retry_after(),
		})
	}
}

/// Builds the wire request for `request`, attaching `token` as a bearer header.
///
/// Read-only methods never carry a body. Caller headers override the JSON defaults, and no
/// content type survives on multipart bodies so the transport can set the boundary.
pub fn assemble(
	descriptor: &ApiDescriptor,
	request: &RequestDescriptor,
	token: Option<&AccessToken>,
) -> Result<OutboundRequest> {
	let mut url = descriptor
		.endpoint(request.path())
		.map_err(|source| ConfigError::InvalidUrl { path: request.path().to_owned(), source })?;

	if !request.query().is_empty() {
		url.query_pairs_mut().extend_pairs(request.query());
	}

	let body = if request.is_read_only() { None } else { request.body() };
	let mut headers = HeaderMap::new();

	headers.insert(ACCEPT, json_media_type());

	if body.is_some_and(RequestBody::is_textual) {
		headers.insert(CONTENT_TYPE, json_media_type());
	}

	for name in request.headers().keys() {
		headers.remove(name);

		for value in request.headers().get_all(name) {
			headers.append(name.clone(), value.clone());
		}
	}

	if matches!(body, Some(RequestBody::Multipart(_))) {
		headers.remove(CONTENT_TYPE);
	}
	if let Some(token) = token {
		let mut value = HeaderValue::from_str(&token.bearer())
			.map_err(|_| ConfigError::InvalidHeaderValue { name: "authorization" })?;

		value.set_sensitive(true);
		headers.insert(AUTHORIZATION, value);
	}

	Ok(OutboundRequest {
		method: request.method().clone(),
		url,
		headers,
		body: body.map(encode_body),
		timeout: descriptor.timeout.unsigned_abs(),
	})
}

fn json_media_type() -> HeaderValue {
	HeaderValue::from_static("application/json")
}

fn encode_body(body: &RequestBody) -> OutboundBody {
	match body {
		RequestBody::Json(value) => OutboundBody::Bytes(value.to_string().into_bytes()),
		RequestBody::Text(text) => OutboundBody::Bytes(text.clone().into_bytes()),
		RequestBody::Bytes(bytes) => OutboundBody::Bytes(bytes.clone()),
		RequestBody::Multipart(form) => OutboundBody::Multipart(form.clone()),
	}
}

fn decode_success(policy: SuccessBodyPolicy, body: &[u8]) -> Result<Value> {
	if body.iter().all(u8::is_ascii_whitespace) {
		return Ok(empty());
	}

	match policy {
		SuccessBodyPolicy::Lenient => Ok(serde_json::from_slice(body).unwrap_or_else(|_| empty())),
		SuccessBodyPolicy::Strict => {
			let mut de = serde_json::Deserializer::from_slice(body);
			let mut track = serde_path_to_error::Track::new();
			let tracked = serde_path_to_error::Deserializer::new(&mut de, &mut track);
			let value = Value::deserialize(tracked).and_then(|value| de.end().map(|()| value));

			value.map_err(|e| Error::Decode {
				source: serde_path_to_error::Error::new(track.path(), e),
			})
		},
	}
}

fn empty() -> Value {
	Value::Object(Map::new())
}

fn anonymous() -> Value {
	let mut map = Map::new();

	map.insert("data".into(), Value::Null);

	Value::Object(map)
}

#[cfg(test)]
mod tests {
	// crates.io
	use http::{HeaderName, Method};
	use serde_json::json;
	// self
	use super::*;
	use crate::request::{MultipartBody, MultipartPart};

	fn descriptor() -> ApiDescriptor {
		ApiDescriptor::new(Url::parse("https://api.example.com/v1").expect("URL should parse."))
			.expect("Descriptor should build.")
	}

	#[test]
	fn query_and_bearer_are_attached() {
		let request = RequestDescriptor::get("/quotes")
			.with_query("status", "open")
			.with_query("q", "two words")
			.with_json(json!({ "ignored": true }));
		let token = AccessToken::new("abc");
		let outbound =
			assemble(&descriptor(), &request, Some(&token)).expect("Assembly should succeed.");

		assert_eq!(outbound.method, Method::GET);
		assert_eq!(
			outbound.url.as_str(),
			"https://api.example.com/v1/quotes?status=open&q=two+words"
		);
		assert_eq!(outbound.headers[AUTHORIZATION], "Bearer abc");
		assert!(outbound.headers[AUTHORIZATION].is_sensitive());
		assert_eq!(outbound.headers[ACCEPT], "application/json");
		assert!(outbound.body.is_none(), "Read-only calls never carry a body.");
		assert!(!outbound.headers.contains_key(CONTENT_TYPE));
		assert_eq!(outbound.timeout, std::time::Duration::from_secs(10));
	}

	#[test]
	fn json_bodies_are_serialized_with_json_content_type() {
		let request = RequestDescriptor::post("/reviews").with_json(json!({ "stars": 5 }));
		let outbound = assemble(&descriptor(), &request, None).expect("Assembly should succeed.");

		assert_eq!(outbound.body, Some(OutboundBody::Bytes(b"{\"stars\":5}".to_vec())));
		assert_eq!(outbound.headers[CONTENT_TYPE], "application/json");
		assert!(!outbound.headers.contains_key(AUTHORIZATION));
	}

	#[test]
	fn caller_headers_override_defaults() {
		let request = RequestDescriptor::put("/profile")
			.with_body(RequestBody::Text("name=Ana".into()))
			.with_header(
				CONTENT_TYPE,
				HeaderValue::from_static("application/x-www-form-urlencoded"),
			)
			.with_header(HeaderName::from_static("x-client"), HeaderValue::from_static("web"));
		let outbound = assemble(&descriptor(), &request, None).expect("Assembly should succeed.");

		assert_eq!(outbound.headers[CONTENT_TYPE], "application/x-www-form-urlencoded");
		assert_eq!(outbound.headers["x-client"], "web");
		assert_eq!(outbound.body, Some(OutboundBody::Bytes(b"name=Ana".to_vec())));
	}

	#[test]
	fn binary_and_multipart_bodies_skip_json_content_type() {
		let bytes = RequestDescriptor::post("/uploads").with_body(RequestBody::Bytes(vec![0, 1]));
		let outbound = assemble(&descriptor(), &bytes, None).expect("Assembly should succeed.");

		assert!(!outbound.headers.contains_key(CONTENT_TYPE));
		assert_eq!(outbound.body, Some(OutboundBody::Bytes(vec![0, 1])));

		let form = MultipartBody::new()
			.part(MultipartPart::text("caption", "Van"))
			.part(
				MultipartPart::file("photo", "van.png", vec![137, 80])
					.with_content_type("image/png"),
			);
		let multipart = RequestDescriptor::post("/vehicles/photos")
			.with_body(RequestBody::Multipart(form.clone()))
			.with_header(CONTENT_TYPE, json_media_type());
		let outbound = assemble(&descriptor(), &multipart, None).expect("Assembly should succeed.");

		assert!(
			!outbound.headers.contains_key(CONTENT_TYPE),
			"Multipart bodies must leave the boundary header to the transport."
		);
		assert_eq!(outbound.body, Some(OutboundBody::Multipart(form)));
	}

	#[test]
	fn lenient_policy_masks_unparseable_bodies() {
		assert_eq!(
			decode_success(SuccessBodyPolicy::Lenient, b"<html>").expect("Lenient decode."),
			json!({})
		);
		assert_eq!(
			decode_success(SuccessBodyPolicy::Lenient, b"").expect("Empty decode."),
			json!({})
		);
		assert_eq!(
			decode_success(SuccessBodyPolicy::Lenient, b"[1,2]").expect("Array decode."),
			json!([1, 2])
		);
	}

	#[test]
	fn strict_policy_reports_unparseable_bodies() {
		let err = decode_success(SuccessBodyPolicy::Strict, b"{\"quote\":")
			.expect_err("Truncated JSON should fail under the strict policy.");

		assert!(matches!(err, Error::Decode { .. }));

		let err = decode_success(SuccessBodyPolicy::Strict, b"{\"a\":1}garbage")
			.expect_err("Trailing characters should fail under the strict policy.");

		assert!(matches!(err, Error::Decode { .. }));
		assert_eq!(
			decode_success(SuccessBodyPolicy::Strict, b"{\"a\":1}\n").expect("Trailing newline."),
			json!({ "a": 1 })
		);
		assert_eq!(
			decode_success(SuccessBodyPolicy::Strict, b"  \n").expect("Blank decode."),
			json!({})
		);
	}

	#[test]
	fn anonymous_result_has_null_data() {
		assert_eq!(anonymous(), json!({ "data": null }));
	}
}
