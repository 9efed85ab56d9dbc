//! Demonstrates three concurrent calls with an expired token sharing a single
//! `POST /auth/refresh` before each is retried once with the new bearer.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use serde_json::json;
use url::Url;
// self
use session_broker::{
	api::ApiDescriptor,
	client::ApiClient,
	session::{MemorySessionStore, SessionEnd, SessionListener, SessionStore},
};

struct PrintingListener;
impl SessionListener for PrintingListener {
	fn on_session_end(&self, reason: &SessionEnd) {
		println!("Session ended ({reason}); the host would navigate to the sign-in page.");
	}
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let expired = server
		.mock_async(|when, then| {
			when.method(GET).path("/listings").header("authorization", "Bearer expired");
			then.status(401);
		})
		.await;
	let listings = server
		.mock_async(|when, then| {
			when.method(GET).path("/listings").header("authorization", "Bearer renewed");
			then.status(200).json_body(json!({ "data": [{ "id": 1, "title": "Camper van" }] }));
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(200)
				.delay(std::time::Duration::from_millis(100))
				.json_body(json!({ "accessToken": "renewed" }));
		})
		.await;
	let store = Arc::new(MemorySessionStore::with_token("expired"));
	let descriptor = ApiDescriptor::new(Url::parse(&server.base_url())?)?;
	let client =
		ApiClient::new(descriptor, store.clone())?.with_listener(Arc::new(PrintingListener));
	let (a, b, c) =
		tokio::join!(client.get("/listings"), client.get("/listings"), client.get("/listings"));

	for value in [a?, b?, c?] {
		println!("Listings: {value}.");
	}

	refresh.assert_calls_async(1).await;
	expired.assert_calls_async(3).await;
	listings.assert_calls_async(3).await;

	println!(
		"Refresh attempts: {}, joined: {}, reused: {}. Stored token: {:?}.",
		client.refresh_metrics().attempts(),
		client.refresh_metrics().joins(),
		client.refresh_metrics().reuses(),
		store.get(),
	);

	client.logout();

	Ok(())
}
