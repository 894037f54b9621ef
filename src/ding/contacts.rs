//! resolves phone numbers to dingtalk user ids
use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use super::{ApiSettings, Client, DingError, Session};

#[derive(Debug, Deserialize)]
/// body of the legacy `getbymobile` endpoint
struct UserByMobile {
	errcode: i64,
	#[serde(default)]
	errmsg: String,
	result: Option<UserByMobileResult>,
}

#[derive(Debug, Deserialize)]
struct UserByMobileResult {
	#[serde(default)]
	userid: String,
}

/// Looks up users by phone number. Nothing is cached, every call hits the api.
pub struct Contacts {
	http: Client,
	api: ApiSettings,
	session: Arc<Session>,
}

impl Contacts {
	pub fn new(http: Client, api: ApiSettings, session: Arc<Session>) -> Self {
		Self { http, api, session }
	}

	/// Resolve `mobile` to a user id. Failures are logged here, callers only
	/// have to decide what to do without a user id.
	pub async fn resolve(&self, mobile: &str) -> Result<String, DingError> {
		let result = self.lookup(mobile).await;

		match &result {
			Ok(user_id) => tracing::info!("resolved mobile {mobile} to user id {user_id}"),
			Err(err) => tracing::error!("phone lookup for {mobile} failed: {err}"),
		}

		result
	}

	/// a single call of the phone lookup endpoint
	async fn lookup(&self, mobile: &str) -> Result<String, DingError> {
		let token = self.session.access_token().await;
		let mut url = self.api.user_by_mobile_url()?;
		url.query_pairs_mut().append_pair("access_token", &token);

		let response = self.http.post_json(&url, None, &json!({ "mobile": mobile })).await?;

		if !response.status.is_success() {
			return Err(response.api_error());
		}

		let UserByMobile { errcode, errmsg, result } = response.json()?;

		if errcode != 0 {
			return Err(DingError::ErrCode { errcode, errmsg });
		}

		match result {
			Some(UserByMobileResult { userid }) if !userid.is_empty() => Ok(userid),
			_ => Err(DingError::EmptyUserId(mobile.to_owned())),
		}
	}
}
