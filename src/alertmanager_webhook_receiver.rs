//! Receives alertmanager notifications and delivers every alert to its
//! recipients, group robot webhook and conversation. Delivery failures end up
//! in logs and metrics, the alert source always gets the same acknowledgement.
use std::{
	fmt,
	net::{IpAddr, Ipv4Addr, SocketAddr},
	sync::Arc,
};

use anyhow::{Context, Result};
use axum::{extract::Extension, http::StatusCode, routing::post, Json, Router};
use bytes::Bytes;
use prometheus::{opts, IntCounterVec, Registry};
use serde::{Deserialize, Serialize};

use crate::{
	alert::{Alert, Payload, Status, CONVERSATION_LABEL, GROUP_LABEL, WEBHOOK_LABEL},
	alert_renderer::AlertRenderer,
	ding::{Client, DingError, Messenger, RecipientReport, Session},
	settings::Settings,
};

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AlertReceiverSettings {
	pub bind_address: IpAddr,
	pub port: u16,
}

impl Default for AlertReceiverSettings {
	fn default() -> Self {
		Self { bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED), port: 5354 }
	}
}

impl AlertReceiverSettings {
	pub fn to_socket_addr(&self) -> SocketAddr {
		SocketAddr::new(self.bind_address, self.port)
	}
}

#[derive(Debug)]
/// prometheus meters of the receiver
struct Metrics {
	/// received alerts per status
	received_alerts: IntCounterVec,
	/// delivery attempts per channel and outcome
	deliveries: IntCounterVec,
}

impl Metrics {
	fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
		let received_alerts = IntCounterVec::new(
			opts!("received_alerts", "total number of deserialized alerts")
				.namespace("alertding")
				.subsystem("receiver"),
			&["status"],
		)?;
		registry.register(Box::new(received_alerts.clone()))?;

		let deliveries = IntCounterVec::new(
			opts!("deliveries_total", "delivery attempts by channel and outcome")
				.namespace("alertding")
				.subsystem("delivery"),
			&["channel", "outcome"],
		)?;
		registry.register(Box::new(deliveries.clone()))?;

		Ok(Self { received_alerts, deliveries })
	}

	fn record_alert(&self, status: Status) {
		self.received_alerts.with_label_values(&[status.as_str()]).inc();
	}

	fn record_delivery(&self, channel: &str, result: &Result<(), DingError>) {
		let outcome = match result {
			Ok(()) => "ok",
			Err(err) => err.kind(),
		};

		self.deliveries.with_label_values(&[channel, outcome]).inc();
	}
}

#[derive(Debug)]
/// what happened to a single alert
pub struct AlertReport {
	/// recipient group the direct messages went to
	pub group: String,
	pub recipients: Vec<RecipientReport>,
	/// name of the group robot webhook
	pub webhook: String,
	pub webhook_result: Result<(), DingError>,
	/// name of the conversation and the result, if the alert was routed to one
	pub conversation: Option<(String, Result<(), DingError>)>,
}

impl fmt::Display for AlertReport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let recipients: Vec<_> = self.recipients.iter().map(ToString::to_string).collect();
		write!(f, "group {} [{}], webhook {} ", self.group, recipients.join(", "), self.webhook)?;

		match &self.webhook_result {
			Ok(()) => write!(f, "ok")?,
			Err(err) => write!(f, "failed ({err})")?,
		}

		match &self.conversation {
			Some((name, Ok(()))) => write!(f, ", conversation {name} ok"),
			Some((name, Err(err))) => write!(f, ", conversation {name} failed ({err})"),
			None => Ok(()),
		}
	}
}

/// where alerts without routing labels go
struct Routing {
	default_group: String,
	default_webhook: String,
	default_conversation: Option<String>,
}

/// state shared by all requests
pub struct State {
	renderer: AlertRenderer,
	messenger: Messenger,
	routing: Routing,
	metrics: Metrics,
}

impl State {
	pub fn new(settings: &Settings, session: Arc<Session>, http: Client, registry: &Registry) -> Result<Self> {
		let renderer = AlertRenderer::new(settings.links(), settings.templates.as_ref())
			.context("failed to construct alert renderer")?;

		let messenger = Messenger::new(
			http,
			settings.api.clone(),
			session,
			settings.single_groups.clone(),
			settings.webhooks.clone(),
			settings.conversations.clone(),
		);

		let routing = Routing {
			default_group: settings.default_group.clone(),
			default_webhook: settings.default_webhook.clone(),
			default_conversation: settings.default_conversation.clone(),
		};

		let metrics = Metrics::new(registry).context("failed to register prometheus meters")?;

		Ok(Self { renderer, messenger, routing, metrics })
	}

	/// Render one alert and deliver it to the recipients of its group, its
	/// webhook and its conversation, in that order.
	pub async fn handle_alert(&self, alert: &Alert) -> AlertReport {
		self.metrics.record_alert(alert.status);

		let formatted = self.renderer.render(alert);
		let alertname = alert.alertname();

		let group = alert.label(GROUP_LABEL).unwrap_or(self.routing.default_group.as_str()).to_owned();
		let recipients = self.messenger.send_to_recipients(&group, &formatted.direct).await;
		for RecipientReport { outcome, .. } in &recipients {
			self.metrics.deliveries.with_label_values(&["direct", outcome.label()]).inc();
		}

		let webhook = alert.label(WEBHOOK_LABEL).unwrap_or(self.routing.default_webhook.as_str()).to_owned();
		let webhook_result = self.messenger.send_to_webhook(&webhook, &formatted.group).await;
		self.metrics.record_delivery("webhook", &webhook_result);
		if let Err(err) = &webhook_result {
			tracing::error!("failed to send alert {alertname} to webhook {webhook}: {err}");
		}

		let conversation = match alert.label(CONVERSATION_LABEL).or(self.routing.default_conversation.as_deref()) {
			Some(name) => {
				let result = self.messenger.send_to_conversation(name, &formatted.card.text).await;
				self.metrics.record_delivery("conversation", &result);
				if let Err(err) = &result {
					tracing::error!("failed to send alert {alertname} to conversation {name}: {err}");
				}

				Some((name.to_owned(), result))
			}
			None => None,
		};

		AlertReport { group, recipients, webhook, webhook_result, conversation }
	}
}

#[derive(Debug, Serialize)]
/// body of every successful response
struct Acknowledgement {
	message: &'static str,
	code: &'static str,
	/// one entry per processed alert
	data: Vec<()>,
}

async fn receive_alerts(
	Extension(state): Extension<Arc<State>>,
	body: Bytes,
) -> Result<Json<Acknowledgement>, StatusCode> {
	let payload = serde_json::from_slice(&body).and_then(Payload::from_value).map_err(|err| {
		tracing::debug!("failed to deserialize alert: {err}");
		StatusCode::BAD_REQUEST
	})?;

	if let Payload::Batch(envelope) = &payload {
		tracing::debug!("notification of {envelope}");
	}

	let alerts = payload.into_alerts();
	let mut data = Vec::with_capacity(alerts.len());

	for alert in &alerts {
		tracing::debug!("message sent by alertmanager: {}", serde_json::to_string(alert).unwrap_or_default());

		let report = state.handle_alert(alert).await;
		tracing::info!("alert {} ({}): {report}", alert.alertname(), alert.status.as_str());
		data.push(());
	}

	Ok(Json(Acknowledgement { message: "ok", code: "200", data }))
}

pub fn router(state: Arc<State>) -> Router {
	Router::new().route("/ding", post(receive_alerts)).layer(Extension(state))
}

pub async fn run_receiver(settings: &AlertReceiverSettings, state: Arc<State>) -> Result<()> {
	let addr = settings.to_socket_addr();

	tracing::info!("listening for alerts on {addr}");

	axum::Server::bind(&addr)
		.serve(router(state).into_make_service())
		.await
		.context("alert receiver crashed")?;

	Ok(())
}
