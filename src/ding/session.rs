//! Access tokens for the dingtalk open api.
//!
//! Two tokens are held: the one of the internal app is used for user lookups,
//! the one of the robot app for robot messages. Both are fetched once on
//! startup and refreshed by [Session::run_refresh] before they expire.

use std::{fmt, sync::Arc, time::Duration};

use backoff::{backoff::Backoff, ExponentialBackoff};
use serde::{Deserialize, Serialize};
use tokio::{sync::RwLock, time::Instant};

use super::{ApiSettings, Client, DingError};

/// never refresh more often than this, even if tokens expire within the margin
const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(30);
/// wait this long after the refresh backoff gave up
const RETRY_AFTER_GIVING_UP: Duration = Duration::from_secs(60);
/// token lifetimes reported by the platform are cut to this
const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
/// app key and secret, serialized as body of the token request
pub struct Credentials {
	/// app key, also the robot code for the robot app
	pub app_key: String,
	/// app secret
	pub app_secret: String,
}

impl fmt::Debug for Credentials {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Credentials")
			.field("app_key", &self.app_key)
			.field("app_secret", &"<redacted>")
			.finish()
	}
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
/// success body of the token endpoint
struct TokenResponse {
	access_token: String,
	expire_in: u64,
}

#[derive(Debug, Clone)]
/// short lived access token
struct AccessToken {
	value: String,
	expires_at: Instant,
}

#[derive(Debug, Clone)]
/// the pair of tokens held by the session
struct Tokens {
	general: AccessToken,
	robot: AccessToken,
}

/// Authenticated session, shared read only between all requests.
pub struct Session {
	http: Client,
	api: ApiSettings,
	app: Credentials,
	robot: Credentials,
	tokens: RwLock<Tokens>,
}

impl Session {
	/// Fetch both access tokens.
	///
	/// # Arguments
	///
	/// * `app` - credentials of the internal app
	///
	/// * `robot` - credentials of the robot app
	pub async fn connect(
		http: Client,
		api: ApiSettings,
		app: Credentials,
		robot: Credentials,
	) -> Result<Self, DingError> {
		let tokens = fetch_tokens(&http, &api, &app, &robot).await?;

		tracing::info!("fetched access tokens for app {} and robot {}", app.app_key, robot.app_key);

		Ok(Self { http, api, app, robot, tokens: RwLock::new(tokens) })
	}

	/// robot code used when sending robot messages
	pub fn robot_code(&self) -> &str {
		self.robot.app_key.as_str()
	}

	/// access token of the internal app
	pub async fn access_token(&self) -> String {
		self.tokens.read().await.general.value.clone()
	}

	/// access token of the robot app
	pub async fn robot_access_token(&self) -> String {
		self.tokens.read().await.robot.value.clone()
	}

	/// fetch new tokens, the old ones stay in place if that fails
	pub async fn refresh(&self) -> Result<(), DingError> {
		let tokens = fetch_tokens(&self.http, &self.api, &self.app, &self.robot).await?;
		*self.tokens.write().await = tokens;

		Ok(())
	}

	/// instant at which the next refresh is due
	///
	/// * `margin` - how long before the earliest expiry to refresh
	async fn next_refresh(&self, margin: Duration) -> Instant {
		let earliest = {
			let tokens = self.tokens.read().await;
			tokens.general.expires_at.min(tokens.robot.expires_at)
		};

		let due = earliest.checked_sub(margin).unwrap_or_else(Instant::now);

		due.max(Instant::now() + MIN_REFRESH_INTERVAL)
	}

	/// main loop of the token refresh task
	pub async fn run_refresh(self: Arc<Self>, margin: Duration) {
		loop {
			tokio::time::sleep_until(self.next_refresh(margin).await).await;

			self.refresh_with_backoff(ExponentialBackoff::default()).await;
		}
	}

	/// refresh until it succeeds, readers keep the old tokens meanwhile
	async fn refresh_with_backoff(&self, mut backoff: ExponentialBackoff) {
		while let Err(err) = self.refresh().await {
			tracing::warn!("failed to refresh access tokens: {err}");

			if let Some(duration) = backoff.next_backoff() {
				tokio::time::sleep(duration).await;
			} else {
				tracing::error!(
					"giving up refreshing access tokens, retrying in {}s",
					RETRY_AFTER_GIVING_UP.as_secs()
				);
				tokio::time::sleep(RETRY_AFTER_GIVING_UP).await;
				backoff.reset();
			}
		}

		tracing::info!("refreshed access tokens");
	}
}

/// fetch tokens of the internal app and the robot app
async fn fetch_tokens(
	http: &Client,
	api: &ApiSettings,
	app: &Credentials,
	robot: &Credentials,
) -> Result<Tokens, DingError> {
	Ok(Tokens {
		general: fetch_token(http, api, app, "app").await?,
		robot: fetch_token(http, api, robot, "robot").await?,
	})
}

/// exchange credentials for an access token
///
/// * `kind` - which token is fetched, for error messages
async fn fetch_token(
	http: &Client,
	api: &ApiSettings,
	credentials: &Credentials,
	kind: &'static str,
) -> Result<AccessToken, DingError> {
	let response = http.post_json(&api.token_url()?, None, credentials).await?;

	if !response.status.is_success() {
		return Err(response.api_error());
	}

	let TokenResponse { access_token, expire_in } = response.json()?;

	if access_token.is_empty() {
		return Err(DingError::MissingToken(kind));
	}

	let lifetime = Duration::from_secs(expire_in).min(MAX_TOKEN_LIFETIME);

	Ok(AccessToken { value: access_token, expires_at: Instant::now() + lifetime })
}
