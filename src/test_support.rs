//! in process fake of the dingtalk platform and robot webhooks
use std::{
	net::SocketAddr,
	sync::{
		atomic::{AtomicUsize, Ordering},
		Arc, Mutex,
	},
	time::Duration,
};

use axum::{
	extract::Extension,
	http::{HeaderMap, StatusCode, Uri},
	routing::post,
	Json, Router,
};
use bytes::Bytes;
use prometheus::Registry;
use serde_json::{json, Value};
use url::Url;

use crate::{
	alertmanager_webhook_receiver::State,
	ding::{http_client::ACCESS_TOKEN_HEADER, ApiSettings, Client, Contacts, DingError, Messenger, Session},
	settings::Settings,
};

#[derive(Debug, Clone)]
/// a request received by the fake platform
pub struct Recorded {
	pub path: String,
	pub query: Option<String>,
	/// value of the v1.0 access token header
	pub token: Option<String>,
	pub body: Value,
}

#[derive(Default)]
struct Platform {
	requests: Mutex<Vec<Recorded>>,
	tokens_issued: AtomicUsize,
	/// number of upcoming token requests answered with an error
	failing_token_requests: AtomicUsize,
}

impl Platform {
	fn take_token_failure(&self) -> bool {
		self.failing_token_requests.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok()
	}
}

async fn handle(
	Extension(platform): Extension<Arc<Platform>>,
	uri: Uri,
	headers: HeaderMap,
	body: Bytes,
) -> (StatusCode, Json<Value>) {
	let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
	let token = headers.get(ACCESS_TOKEN_HEADER).and_then(|value| value.to_str().ok()).map(str::to_owned);

	let response = respond(&platform, uri.path(), uri.query(), &body);

	platform.requests.lock().unwrap().push(Recorded {
		path: uri.path().to_owned(),
		query: uri.query().map(str::to_owned),
		token,
		body,
	});

	response
}

fn respond(platform: &Platform, path: &str, query: Option<&str>, body: &Value) -> (StatusCode, Json<Value>) {
	let (status, reply) = match path {
		"/v1.0/oauth2/accessToken" if platform.take_token_failure() => (
			StatusCode::SERVICE_UNAVAILABLE,
			json!({ "code": "ServiceUnavailable", "message": "token service unavailable" }),
		),
		"/v1.0/oauth2/accessToken" => match body["appKey"].as_str().unwrap_or_default() {
			"broken" => (
				StatusCode::BAD_REQUEST,
				json!({ "code": "invalidClientId", "message": "app key is invalid" }),
			),
			"empty" => (StatusCode::OK, json!({ "accessToken": "", "expireIn": 7200 })),
			"forever" => (StatusCode::OK, json!({ "accessToken": "forever-token", "expireIn": u64::MAX })),
			app_key => {
				let issued = platform.tokens_issued.fetch_add(1, Ordering::SeqCst);
				(StatusCode::OK, json!({ "accessToken": format!("{app_key}-token-{issued}"), "expireIn": 7200 }))
			}
		},
		"/topapi/v2/user/getbymobile" => match body["mobile"].as_str().unwrap_or_default() {
			"13800000000" => (StatusCode::OK, json!({ "errcode": 0, "errmsg": "ok", "result": { "userid": "alice" } })),
			"13800000001" => (StatusCode::OK, json!({ "errcode": 0, "errmsg": "ok", "result": { "userid": "bob" } })),
			"13900000000" => (StatusCode::OK, json!({ "errcode": 0, "errmsg": "ok", "result": {} })),
			_ => (StatusCode::OK, json!({ "errcode": 60121, "errmsg": "找不到该用户" })),
		},
		"/v1.0/robot/oToMessages/batchSend" => match body["userIds"][0].as_str() {
			Some("blocked") => (
				StatusCode::BAD_REQUEST,
				json!({ "code": "Forbidden.AccessDenied", "message": "robot not allowed" }),
			),
			Some("ghost") => {
				(StatusCode::OK, json!({ "processQueryKey": "query-key", "invalidStaffIdList": ["ghost"] }))
			}
			_ => (StatusCode::OK, json!({ "processQueryKey": "query-key" })),
		},
		"/v1.0/robot/groupMessages/send" => (StatusCode::OK, json!({ "processQueryKey": "query-key" })),
		"/robot/send" => match query {
			Some("access_token=broken") => (StatusCode::OK, json!({ "errcode": 300001, "errmsg": "token is not exist" })),
			_ => (StatusCode::OK, json!({ "errcode": 0, "errmsg": "ok" })),
		},
		_ => (StatusCode::NOT_FOUND, json!({})),
	};

	(status, Json(reply))
}

/// Fake platform listening on a random local port. Known mobiles are
/// `13800000000` (alice) and `13800000001` (bob).
pub struct FakeDing {
	addr: SocketAddr,
	platform: Arc<Platform>,
}

impl FakeDing {
	pub async fn spawn() -> Self {
		let platform = Arc::new(Platform::default());

		let app = Router::new()
			.route("/v1.0/oauth2/accessToken", post(handle))
			.route("/topapi/v2/user/getbymobile", post(handle))
			.route("/v1.0/robot/oToMessages/batchSend", post(handle))
			.route("/v1.0/robot/groupMessages/send", post(handle))
			.route("/robot/send", post(handle))
			.layer(Extension(Arc::clone(&platform)));

		let server = axum::Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0))).serve(app.into_make_service());
		let addr = server.local_addr();
		tokio::spawn(server);

		Self { addr, platform }
	}

	fn url(&self, path: &str) -> String {
		format!("http://{}{path}", self.addr)
	}

	/// every request received so far
	pub fn requests(&self) -> Vec<Recorded> {
		self.platform.requests.lock().unwrap().clone()
	}

	/// answer the next `count` token requests with 503
	pub fn fail_token_requests(&self, count: usize) {
		self.platform.failing_token_requests.store(count, Ordering::SeqCst);
	}

	pub fn requests_to(&self, path: &str) -> Vec<Recorded> {
		self.requests().into_iter().filter(|request| request.path == path).collect()
	}

	pub fn api(&self) -> ApiSettings {
		let url = Url::parse(&self.url("")).unwrap();

		ApiSettings { oauth_url: url.clone(), oapi_url: url }
	}

	/// http client with its own meter registry
	pub fn client(&self) -> Client {
		Client::new(Duration::from_secs(5), &Registry::new()).unwrap()
	}

	pub fn settings(&self) -> Settings {
		serde_json::from_value(json!({
			"appKey": "app",
			"appSecret": "app-secret",
			"robotAppKey": "robot",
			"robotAppSecret": "robot-secret",
			"single_groups": {
				"default": [
					{ "name": "alice", "mobile": "13800000000" },
					{ "name": "nobody", "mobile": "10000000000" },
					{ "name": "bob", "phone": "13800000001" },
				],
				"ops": [{ "name": "bob", "mobile": "13800000001" }],
			},
			"webhooks": {
				"消息测试群": self.url("/robot/send?access_token=default"),
				"ops": self.url("/robot/send?access_token=ops"),
				"broken": self.url("/robot/send?access_token=broken"),
			},
			"conversations": { "oncall": "cid-oncall" },
			"alertmanagerURL": "http://alertmanager:9093",
			"grafanaURL": "https://grafana.example.com",
			"grafanaPrefix": "http://grafana:3000",
			"prometheusURL": "https://prometheus.example.com",
			"prometheusPrefix": "http://prometheus:9090",
			"api": { "oauth_url": self.url(""), "oapi_url": self.url("") },
		}))
		.unwrap()
	}

	pub async fn session(&self) -> Result<Session, DingError> {
		let settings = self.settings();

		Session::connect(self.client(), self.api(), settings.app_credentials(), settings.robot_credentials()).await
	}

	pub async fn contacts(&self) -> Contacts {
		Contacts::new(self.client(), self.api(), Arc::new(self.session().await.unwrap()))
	}

	pub async fn messenger(&self) -> Messenger {
		let settings = self.settings();

		Messenger::new(
			self.client(),
			self.api(),
			Arc::new(self.session().await.unwrap()),
			settings.single_groups,
			settings.webhooks,
			settings.conversations,
		)
	}

	pub async fn state(&self) -> Arc<State> {
		let settings = self.settings();
		let session = Arc::new(self.session().await.unwrap());

		Arc::new(State::new(&settings, session, self.client(), &Registry::new()).unwrap())
	}
}

