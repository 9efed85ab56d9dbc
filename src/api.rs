//! API descriptor data structures shared by the orchestrator and refresh coordinator.
//!
//! The module exposes validated connection metadata (`ApiDescriptor`) covering the base URL,
//! the two session endpoints given special treatment (refresh and session probe), the
//! per-call deadline, and how lenient the client is with success bodies.

/// Builder API for assembling API descriptors.
pub mod builder;

pub use builder::*;

// self
use crate::_prelude::*;

/// How 2xx bodies that are empty or not JSON are surfaced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuccessBodyPolicy {
	/// Unparseable bodies resolve to an empty JSON object.
	#[default]
	Lenient,
	/// Unparseable bodies surface as [`Error::Decode`]; empty bodies still resolve to `{}`.
	Strict,
}

/// Immutable API descriptor consumed by the client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiDescriptor {
	/// Base URL every request path is appended to.
	pub base_url: Url,
	/// Path of the endpoint that mints a new access token from the refresh cookie.
	pub refresh_path: String,
	/// Path of the "who is currently authenticated" endpoint.
	pub session_probe_path: String,
	/// Per-call deadline.
	pub timeout: Duration,
	/// JSON field holding the access token in refresh responses.
	pub access_token_field: String,
	/// Treatment of unparseable success bodies.
	pub success_body_policy: SuccessBodyPolicy,
}
impl ApiDescriptor {
	/// Default refresh endpoint path.
	pub const DEFAULT_REFRESH_PATH: &'static str = "/auth/refresh";
	/// Default session probe endpoint path.
	pub const DEFAULT_SESSION_PROBE_PATH: &'static str = "/auth/me";
	/// Default per-call deadline.
	pub const DEFAULT_TIMEOUT: Duration = Duration::seconds(10);
	/// Default access token field name.
	pub const DEFAULT_ACCESS_TOKEN_FIELD: &'static str = "accessToken";

	/// Creates a new builder for the provided base URL.
	pub fn builder(base_url: Url) -> ApiDescriptorBuilder {
		ApiDescriptorBuilder::new(base_url)
	}

	/// Builds a descriptor with every default applied.
	pub fn new(base_url: Url) -> Result<Self, ApiDescriptorError> {
		Self::builder(base_url).build()
	}

	/// Checks whether `path` addresses the refresh endpoint.
	pub fn is_refresh_path(&self, path: &str) -> bool {
		same_path(path, &self.refresh_path)
	}

	/// Checks whether `path` addresses the session probe endpoint.
	pub fn is_session_probe_path(&self, path: &str) -> bool {
		same_path(path, &self.session_probe_path)
	}

	/// Joins the base URL and a request path by concatenation, so base paths such as `/v1`
	/// are preserved.
	pub fn endpoint(&self, path: &str) -> std::result::Result<Url, url::ParseError> {
		let base = self.base_url.as_str().trim_end_matches('/');
		let path = if path.starts_with('/') { path.to_owned() } else { format!("/{path}") };

		Url::parse(&format!("{base}{path}"))
	}
}

fn same_path(candidate: &str, endpoint: &str) -> bool {
	let candidate = candidate.split(['?', '#']).next().unwrap_or_default();

	normalize(candidate) == normalize(endpoint)
}

fn normalize(path: &str) -> &str {
	let trimmed = path.trim_end_matches('/');

	trimmed.strip_prefix('/').unwrap_or(trimmed)
}
