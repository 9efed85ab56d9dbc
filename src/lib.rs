//! Authenticated HTTP request layer with bearer credentials on every call, single-flight
//! session refresh, and one bounded retry when a session expires.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]
#![cfg_attr(test, allow(unused_crate_dependencies))]

pub mod api;
pub mod client;
pub mod error;
pub mod obs;
pub mod request;
pub mod session;
pub mod transport;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
#[doc(hidden)]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` feature, never in downstream builds.

	pub use crate::_prelude::*;

	// self
	use crate::{
		api::ApiDescriptor,
		client::ApiClient,
		session::{MemorySessionStore, SessionEnd, SessionListener, SessionStore},
		transport::ReqwestTransport,
	};

	/// Client type alias used by reqwest-backed integration tests.
	pub type ReqwestTestClient = ApiClient<ReqwestTransport>;

	/// Listener that records every session-end signal for later assertions.
	#[derive(Debug, Default)]
	pub struct RecordingSessionListener(Mutex<Vec<SessionEnd>>);
	impl RecordingSessionListener {
		/// Returns a snapshot of the recorded signals in emission order.
		pub fn events(&self) -> Vec<SessionEnd> {
			self.0.lock().clone()
		}
	}
	impl SessionListener for RecordingSessionListener {
		fn on_session_end(&self, reason: &SessionEnd) {
			self.0.lock().push(reason.clone());
		}
	}

	/// Builds a reqwest transport that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_transport() -> ReqwestTransport {
		let client = ReqwestClient::builder()
			.cookie_store(true)
			.redirect(reqwest::redirect::Policy::none())
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestTransport::with_client(client)
	}

	/// Constructs an [`ApiClient`] backed by an in-memory session store, a recording listener,
	/// and the reqwest transport used across integration tests.
	pub fn build_reqwest_test_client(
		descriptor: ApiDescriptor,
	) -> (ReqwestTestClient, Arc<MemorySessionStore>, Arc<RecordingSessionListener>) {
		let store_backend = Arc::new(MemorySessionStore::default());
		let store: Arc<dyn SessionStore> = store_backend.clone();
		let listener_backend = Arc::new(RecordingSessionListener::default());
		let listener: Arc<dyn SessionListener> = listener_backend.clone();
		let client = ApiClient::with_transport(descriptor, store, test_reqwest_transport())
			.with_listener(listener);

		(client, store_backend, listener_backend)
	}
}

mod _prelude {
	pub use std::{
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use serde_json::Value;
	pub use thiserror::Error as ThisError;
	pub use time::Duration;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use http;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
