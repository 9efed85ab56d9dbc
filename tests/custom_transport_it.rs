#![cfg(feature = "reqwest")]

// std
use std::collections::VecDeque;
// crates.io
use serde_json::json;
use tokio::sync::Notify;
// self
use session_broker::{
	_preludet::*,
	api::ApiDescriptor,
	client::ApiClient,
	error::{RefreshFailure, TransportError},
	http::{StatusCode, header::AUTHORIZATION},
	request::RequestDescriptor,
	session::{MemorySessionStore, SessionEnd, SessionStore},
	transport::{HttpTransport, OutboundBody, OutboundRequest, TransportFuture, TransportResponse},
};

#[derive(Debug)]
enum Scripted {
	Respond(u16, &'static str),
	Fail(fn() -> TransportError),
}

/// Transport double that replays a script and records what it was asked to send.
struct ScriptedTransport {
	script: Mutex<VecDeque<Scripted>>,
	sent: Mutex<Vec<OutboundRequest>>,
}
impl ScriptedTransport {
	fn new(script: impl IntoIterator<Item = Scripted>) -> Self {
		Self { script: Mutex::new(script.into_iter().collect()), sent: Default::default() }
	}

	fn sent(&self) -> Vec<OutboundRequest> {
		self.sent.lock().clone()
	}
}
impl HttpTransport for ScriptedTransport {
	fn send(&self, request: OutboundRequest) -> TransportFuture<'_> {
		self.sent.lock().push(request);

		let next = self.script.lock().pop_front();

		Box::pin(async move {
			match next {
				Some(Scripted::Respond(status, body)) => Ok(TransportResponse::new(
					StatusCode::from_u16(status).expect("Scripted status should be valid."),
					body,
				)),
				Some(Scripted::Fail(make)) => Err(make()),
				None => panic!("Transport script exhausted."),
			}
		})
	}
}

fn build_client(
	transport: ScriptedTransport,
) -> (ApiClient<ScriptedTransport>, Arc<ScriptedTransport>, Arc<MemorySessionStore>) {
	let descriptor = ApiDescriptor::new(
		Url::parse("https://api.example.com/v1").expect("Fixture URL should parse."),
	)
	.expect("Fixture descriptor should build.");
	let transport = Arc::new(transport);
	let store = Arc::new(MemorySessionStore::with_token("stale"));
	let client = ApiClient::with_transport(descriptor, store.clone(), transport.clone());

	(client, transport, store)
}

fn bearer(request: &OutboundRequest) -> Option<&str> {
	request.headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok())
}

#[tokio::test]
async fn retry_reissues_the_same_request_with_the_new_token() {
	let (client, transport, store) = build_client(ScriptedTransport::new([
		Scripted::Respond(401, ""),
		Scripted::Respond(200, "{\"accessToken\":\"fresh\"}"),
		Scripted::Respond(200, "{\"data\":{\"id\":1}}"),
	]));
	let request = RequestDescriptor::patch("/bookings/1")
		.with_query("notify", "true")
		.with_json(json!({ "status": "confirmed" }));
	let value = client.send(&request).await.expect("The retried call should succeed.");
	let sent = transport.sent();

	assert_eq!(value, json!({ "data": { "id": 1 } }));
	assert_eq!(sent.len(), 3);
	assert_eq!(bearer(&sent[0]), Some("Bearer stale"));
	assert_eq!(sent[1].url.as_str(), "https://api.example.com/v1/auth/refresh");
	assert_eq!(bearer(&sent[1]), None);
	assert_eq!(bearer(&sent[2]), Some("Bearer fresh"));
	assert_eq!(sent[0].method, sent[2].method);
	assert_eq!(sent[0].url, sent[2].url);
	assert_eq!(sent[0].body, sent[2].body);
	assert_eq!(
		sent[2].body,
		Some(OutboundBody::Bytes(b"{\"status\":\"confirmed\"}".to_vec()))
	);
	assert_eq!(store.get().map(|token| token.expose().to_owned()), Some("fresh".into()));
}

#[tokio::test]
async fn transport_deadline_maps_to_timeout() {
	let (client, transport, store) =
		build_client(ScriptedTransport::new([Scripted::Fail(|| TransportError::TimedOut)]));
	let err = client.get("/listings").await.expect_err("The deadline should surface.");

	assert!(
		matches!(err, Error::Timeout { after } if after == ApiDescriptor::DEFAULT_TIMEOUT),
		"Unexpected error: {err:?}."
	);
	assert_eq!(transport.sent()[0].timeout, std::time::Duration::from_secs(10));
	assert!(store.get().is_some(), "Timeouts must keep the session.");
}

#[tokio::test]
async fn transport_failures_are_not_retried() {
	let (client, transport, _store) = build_client(ScriptedTransport::new([Scripted::Fail(
		|| TransportError::Io(std::io::Error::other("connection reset")),
	)]));
	let err = client.get("/listings").await.expect_err("The network failure should surface.");

	assert!(matches!(err, Error::Transport(TransportError::Io(_))), "Unexpected: {err:?}.");
	assert_eq!(transport.sent().len(), 1);
}

#[tokio::test]
async fn refresh_deadline_is_a_refresh_failure() {
	let (client, transport, store) = build_client(ScriptedTransport::new([
		Scripted::Respond(401, "{\"message\":\"expired\"}"),
		Scripted::Fail(|| TransportError::TimedOut),
	]));
	let err = client.get("/listings").await.expect_err("The refresh should fail.");

	assert!(
		matches!(err, Error::RefreshFailed(RefreshFailure::Timeout)),
		"Unexpected error: {err:?}."
	);
	assert!(err.ends_session());
	assert_eq!(transport.sent().len(), 2);
	assert!(store.get().is_none());
}

/// Transport double whose `/slow` responses wait until the gate opens.
#[derive(Default)]
struct GatedTransport {
	gate: Notify,
	refresh_calls: Mutex<usize>,
}
impl HttpTransport for GatedTransport {
	fn send(&self, request: OutboundRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			match request.url.path() {
				"/v1/auth/refresh" => {
					*self.refresh_calls.lock() += 1;

					Ok(TransportResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "down"))
				},
				"/v1/slow" => {
					self.gate.notified().await;

					Ok(TransportResponse::new(StatusCode::UNAUTHORIZED, Vec::new()))
				},
				_ => Ok(TransportResponse::new(StatusCode::UNAUTHORIZED, Vec::new())),
			}
		})
	}
}

#[tokio::test]
async fn rejection_arriving_after_a_failed_refresh_ends_the_session_once() {
	let descriptor = ApiDescriptor::new(
		Url::parse("https://api.example.com/v1").expect("Fixture URL should parse."),
	)
	.expect("Fixture descriptor should build.");
	let transport = Arc::new(GatedTransport::default());
	let store = Arc::new(MemorySessionStore::with_token("stale"));
	let listener = Arc::new(RecordingSessionListener::default());
	let client =
		ApiClient::<GatedTransport>::with_transport(descriptor, store.clone(), transport.clone())
			.with_listener(listener.clone());
	// The slow call is polled first so it leaves carrying the stale token.
	let slow = client.get("/slow");
	let fast = async {
		let result = client.get("/fast").await;

		transport.gate.notify_waiters();

		result
	};
	let (slow, fast) = tokio::join!(slow, fast);

	for result in [slow, fast] {
		let err = result.expect_err("Both calls should observe the refresh failure.");

		assert!(
			matches!(err, Error::RefreshFailed(RefreshFailure::Status { status: 500 })),
			"Unexpected error: {err:?}."
		);
	}

	assert_eq!(*transport.refresh_calls.lock(), 1);
	assert_eq!(
		listener.events(),
		vec![SessionEnd::RefreshFailed(RefreshFailure::Status { status: 500 })]
	);
	assert!(store.get().is_none());
	assert_eq!(client.refresh_metrics().attempts(), 1);
}
