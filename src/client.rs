//! The authenticated API client and its request orchestration.
//!
//! [`ApiClient`] owns the transport, session store, listener, and descriptor references and
//! wires them into a [`RefreshCoordinator`]. Every call runs through the same state machine:
//! assemble the request with the current bearer token, dispatch it under the per-call
//! deadline, evaluate the response, and on a recoverable 401 await the single shared refresh
//! operation before re-issuing the exact same descriptor once.

pub mod dispatch;
pub mod refresh;

pub use refresh::{RefreshCoordinator, RefreshHandle, RefreshMetrics};

// crates.io
use serde::de::DeserializeOwned;
// self
#[cfg(feature = "reqwest")] use crate::transport::ReqwestTransport;
use crate::{
	_prelude::*,
	api::ApiDescriptor,
	request::RequestDescriptor,
	session::{AccessToken, NoopSessionListener, SessionEnd, SessionListener, SessionStore},
	transport::HttpTransport,
};

#[cfg(feature = "reqwest")]
/// Client specialized for the crate's default reqwest transport.
pub type ReqwestApiClient = ApiClient<ReqwestTransport>;

/// Authenticated client for a single API base URL.
pub struct ApiClient<T>
where
	T: ?Sized + HttpTransport,
{
	/// Transport used for every outbound call, refreshes included.
	pub transport: Arc<T>,
	/// Store holding the current access token.
	pub session: Arc<dyn SessionStore>,
	/// Validated endpoint configuration.
	pub descriptor: Arc<ApiDescriptor>,
	coordinator: Arc<RefreshCoordinator<T>>,
}
impl<T> ApiClient<T>
where
	T: ?Sized + HttpTransport,
{
	/// Creates a client that reuses the caller-provided transport.
	pub fn with_transport(
		descriptor: ApiDescriptor,
		session: Arc<dyn SessionStore>,
		transport: impl Into<Arc<T>>,
	) -> Self {
		let transport = transport.into();
		let descriptor = Arc::new(descriptor);
		let coordinator = Arc::new(RefreshCoordinator::new(
			transport.clone(),
			session.clone(),
			Arc::new(NoopSessionListener),
			descriptor.clone(),
		));

		Self { transport, session, descriptor, coordinator }
	}

	/// Installs the host hook notified when the session ends.
	///
	/// Clones made earlier share the same coordinator and observe the new listener too.
	pub fn with_listener(self, listener: Arc<dyn SessionListener>) -> Self {
		self.coordinator.set_listener(listener);

		self
	}

	/// Returns the refresh coordinator shared by every call of this client.
	pub fn coordinator(&self) -> &RefreshCoordinator<T> {
		&self.coordinator
	}

	/// Returns the refresh counters.
	pub fn refresh_metrics(&self) -> &RefreshMetrics {
		self.coordinator.metrics()
	}

	/// Stores the token returned by a sign-in call.
	pub fn establish_session(&self, token: impl Into<AccessToken>) {
		self.coordinator.establish(token.into());
	}

	/// Signs out locally: clears the token and notifies the listener.
	pub fn logout(&self) {
		self.coordinator.abandon(SessionEnd::LoggedOut);
	}

	/// Issues `request` and decodes the JSON result into `R`.
	pub async fn send_as<R>(&self, request: &RequestDescriptor) -> Result<R>
	where
		R: DeserializeOwned,
	{
		let value = self.send(request).await?;

		serde_path_to_error::deserialize(value).map_err(|source| Error::Decode { source })
	}

	/// Shorthand for a `GET` call.
	pub async fn get(&self, path: &str) -> Result<Value> {
		self.send(&RequestDescriptor::get(path)).await
	}

	/// Shorthand for a `POST` call with a JSON body.
	pub async fn post(&self, path: &str, body: Value) -> Result<Value> {
		self.send(&RequestDescriptor::post(path).with_json(body)).await
	}

	/// Shorthand for a `PUT` call with a JSON body.
	pub async fn put(&self, path: &str, body: Value) -> Result<Value> {
		self.send(&RequestDescriptor::put(path).with_json(body)).await
	}

	/// Shorthand for a `PATCH` call with a JSON body.
	pub async fn patch(&self, path: &str, body: Value) -> Result<Value> {
		self.send(&RequestDescriptor::patch(path).with_json(body)).await
	}

	/// Shorthand for a `DELETE` call.
	pub async fn delete(&self, path: &str) -> Result<Value> {
		self.send(&RequestDescriptor::delete(path)).await
	}

	/// Asks the backend who is signed in.
	///
	/// Resolves to `None` for anonymous visitors; a 401 from the probe endpoint is not an
	/// error.
	pub async fn current_session(&self) -> Result<Option<Value>> {
		let value = self.get(&self.descriptor.session_probe_path).await?;

		Ok(match value {
			Value::Object(mut map) if map.contains_key("data") => match map.remove("data") {
				Some(Value::Null) | None => None,
				Some(data) => Some(data),
			},
			Value::Null => None,
			other => Some(other),
		})
	}
}
#[cfg(feature = "reqwest")]
impl ApiClient<ReqwestTransport> {
	/// Creates a new client for the provided descriptor and store.
	///
	/// The client provisions its own reqwest transport with a cookie jar so the refresh
	/// cookie set by the backend is replayed on refresh calls.
	pub fn new(descriptor: ApiDescriptor, session: Arc<dyn SessionStore>) -> Result<Self> {
		Ok(Self::with_transport(descriptor, session, ReqwestTransport::new()?))
	}
}
impl<T> Clone for ApiClient<T>
where
	T: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self {
			transport: self.transport.clone(),
			session: self.session.clone(),
			descriptor: self.descriptor.clone(),
			coordinator: self.coordinator.clone(),
		}
	}
}
impl<T> Debug for ApiClient<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ApiClient")
			.field("descriptor", &self.descriptor)
			.field("session_set", &self.session.get().is_some())
			.finish()
	}
}
