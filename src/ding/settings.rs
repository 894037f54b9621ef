//! config file options for the dingtalk clients

use serde::Deserialize;
use url::Url;

/// path of the token endpoint, relative to [ApiSettings::oauth_url]
const TOKEN_PATH: &str = "v1.0/oauth2/accessToken";
/// path of the phone lookup, relative to [ApiSettings::oapi_url]
const USER_BY_MOBILE_PATH: &str = "topapi/v2/user/getbymobile";
/// path of the robot direct message endpoint, relative to [ApiSettings::oauth_url]
const BATCH_SEND_PATH: &str = "v1.0/robot/oToMessages/batchSend";
/// path of the robot conversation message endpoint, relative to [ApiSettings::oauth_url]
const GROUP_SEND_PATH: &str = "v1.0/robot/groupMessages/send";

#[derive(Debug, Deserialize, Clone)]
/// base urls of the dingtalk open platform
pub struct ApiSettings {
	/// base url of the v1.0 api (tokens and robot messages)
	#[serde(default = "default_oauth_url")]
	pub oauth_url: Url,
	/// base url of the legacy api (user lookups)
	#[serde(default = "default_oapi_url")]
	pub oapi_url: Url,
}

impl Default for ApiSettings {
	fn default() -> Self {
		Self { oauth_url: default_oauth_url(), oapi_url: default_oapi_url() }
	}
}

impl ApiSettings {
	/// url of the token endpoint
	pub fn token_url(&self) -> Result<Url, url::ParseError> {
		endpoint(&self.oauth_url, TOKEN_PATH)
	}

	/// url of the phone lookup endpoint, without access token
	pub fn user_by_mobile_url(&self) -> Result<Url, url::ParseError> {
		endpoint(&self.oapi_url, USER_BY_MOBILE_PATH)
	}

	/// url of the robot direct message endpoint
	pub fn batch_send_url(&self) -> Result<Url, url::ParseError> {
		endpoint(&self.oauth_url, BATCH_SEND_PATH)
	}

	/// url of the robot conversation message endpoint
	pub fn group_send_url(&self) -> Result<Url, url::ParseError> {
		endpoint(&self.oauth_url, GROUP_SEND_PATH)
	}
}

/// append `path` to `base` while keeping any path prefix of `base`
fn endpoint(base: &Url, path: &str) -> Result<Url, url::ParseError> {
	Url::parse(&format!("{}/{}", base.as_str().trim_end_matches('/'), path))
}

#[allow(clippy::expect_used)]
fn default_oauth_url() -> Url {
	Url::parse("https://api.dingtalk.com").expect("valid default url")
}

#[allow(clippy::expect_used)]
fn default_oapi_url() -> Url {
	Url::parse("https://oapi.dingtalk.com").expect("valid default url")
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
/// a person receiving direct messages
pub struct Recipient {
	/// display name, only used for logging
	#[serde(default)]
	pub name: String,
	/// phone number registered with dingtalk
	#[serde(alias = "phone")]
	pub mobile: String,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn endpoints_keep_path_prefix() {
		let api = ApiSettings {
			oauth_url: Url::parse("http://proxy.internal/ding/").unwrap(),
			oapi_url: Url::parse("http://proxy.internal/oapi").unwrap(),
		};

		assert_eq!(
			api.token_url().unwrap().as_str(),
			"http://proxy.internal/ding/v1.0/oauth2/accessToken"
		);
		assert_eq!(
			api.user_by_mobile_url().unwrap().as_str(),
			"http://proxy.internal/oapi/topapi/v2/user/getbymobile"
		);
	}

	#[test]
	fn default_endpoints() {
		let api = ApiSettings::default();

		assert_eq!(
			api.batch_send_url().unwrap().as_str(),
			"https://api.dingtalk.com/v1.0/robot/oToMessages/batchSend"
		);
		assert_eq!(
			api.group_send_url().unwrap().as_str(),
			"https://api.dingtalk.com/v1.0/robot/groupMessages/send"
		);
	}

	#[test]
	fn recipient_accepts_phone_alias() {
		let recipient: Recipient =
			serde_json::from_str(r#"{"name": "alice", "phone": "13800000000"}"#).unwrap();

		assert_eq!(recipient.mobile, "13800000000");
	}
}
