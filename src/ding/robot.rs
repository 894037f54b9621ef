//! Delivery of alert messages: robot messages to single users, robot messages
//! to internal conversations and posts to group robot webhooks.
use std::{collections::HashMap, fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use super::{ApiSettings, Client, Contacts, DingError, Recipient, Session};
use crate::message::{DirectMessage, GroupMessage, DIRECT_MSG_KEY, TEXT_MSG_KEY};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
/// body of the robot direct message endpoint
struct BatchSendRequest<'a> {
	robot_code: &'a str,
	user_ids: [&'a str; 1],
	msg_key: &'a str,
	/// message parameters, json encoded into a string
	msg_param: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchSendResponse {
	#[serde(default)]
	invalid_staff_id_list: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
/// body of the robot conversation message endpoint
struct GroupSendRequest<'a> {
	robot_code: &'a str,
	open_conversation_id: &'a str,
	msg_key: &'a str,
	msg_param: String,
}

#[derive(Debug, Deserialize)]
/// body of a group robot webhook reply
struct WebhookReply {
	#[serde(default)]
	errcode: i64,
	#[serde(default)]
	errmsg: String,
}

#[derive(Debug)]
/// what happened to one direct message recipient
pub enum RecipientOutcome {
	/// message was accepted by the robot api
	Sent { user_id: String },
	/// phone lookup failed, no message was sent
	Unresolved(DingError),
	/// phone lookup succeeded but sending failed
	Failed { user_id: String, error: DingError },
}

impl RecipientOutcome {
	/// outcome label for prometheus meters
	pub fn label(&self) -> &'static str {
		match self {
			RecipientOutcome::Sent { .. } => "ok",
			RecipientOutcome::Unresolved(_) => "unresolved",
			RecipientOutcome::Failed { error, .. } => error.kind(),
		}
	}
}

#[derive(Debug)]
pub struct RecipientReport {
	pub recipient: Recipient,
	pub outcome: RecipientOutcome,
}

impl fmt::Display for RecipientReport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = &self.recipient.name;

		match &self.outcome {
			RecipientOutcome::Sent { user_id } => write!(f, "{name}: sent to {user_id}"),
			RecipientOutcome::Unresolved(err) => write!(f, "{name}: unresolved ({err})"),
			RecipientOutcome::Failed { user_id, error } => write!(f, "{name}: failed for {user_id} ({error})"),
		}
	}
}

/// Delivers formatted alerts. Every method reports failures as values, nothing
/// is retried.
pub struct Messenger {
	http: Client,
	api: ApiSettings,
	session: Arc<Session>,
	contacts: Contacts,
	/// recipient group name to recipients
	recipients: HashMap<String, Vec<Recipient>>,
	/// webhook name to webhook url
	webhooks: HashMap<String, Url>,
	/// conversation name to open conversation id
	conversations: HashMap<String, String>,
}

impl Messenger {
	pub fn new(
		http: Client,
		api: ApiSettings,
		session: Arc<Session>,
		recipients: HashMap<String, Vec<Recipient>>,
		webhooks: HashMap<String, Url>,
		conversations: HashMap<String, String>,
	) -> Self {
		let contacts = Contacts::new(http.clone(), api.clone(), Arc::clone(&session));

		Self { http, api, session, contacts, recipients, webhooks, conversations }
	}

	/// Send `payload` as robot message to a single user.
	///
	/// # Arguments
	///
	/// * `user_id` - dingtalk user id of the recipient
	///
	/// * `robot_code` - robot sending the message, defaults to the robot app
	pub async fn send_direct(
		&self,
		user_id: &str,
		payload: &DirectMessage,
		robot_code: Option<&str>,
	) -> Result<(), DingError> {
		let request = BatchSendRequest {
			robot_code: robot_code.unwrap_or_else(|| self.session.robot_code()),
			user_ids: [user_id],
			msg_key: DIRECT_MSG_KEY,
			msg_param: serde_json::to_string(payload)?,
		};

		let token = self.session.robot_access_token().await;
		let response = self.http.post_json(&self.api.batch_send_url()?, Some(&token), &request).await?;

		if !response.status.is_success() {
			return Err(response.api_error());
		}

		let BatchSendResponse { invalid_staff_id_list } = response.json()?;
		if !invalid_staff_id_list.is_empty() {
			return Err(DingError::InvalidRecipients(invalid_staff_id_list));
		}

		Ok(())
	}

	/// POST `payload` to a group robot webhook
	pub async fn send_group(&self, payload: &GroupMessage, webhook_url: &Url) -> Result<(), DingError> {
		let response = self.http.post_json(webhook_url, None, payload).await?;
		let text = response.text();

		tracing::info!(
			"webhook {} answered {}: {text}",
			webhook_url.host_str().unwrap_or_default(),
			response.status
		);

		if !response.status.is_success() {
			return Err(DingError::Api {
				status: response.status.as_u16(),
				code: String::new(),
				message: text,
			});
		}

		// other webhook flavours may answer with anything, only dingtalk style
		// replies are checked
		match response.json::<WebhookReply>() {
			Ok(WebhookReply { errcode, errmsg }) if errcode != 0 => Err(DingError::ErrCode { errcode, errmsg }),
			_ => Ok(()),
		}
	}

	/// POST `payload` to the webhook configured under `name`
	pub async fn send_to_webhook(&self, name: &str, payload: &GroupMessage) -> Result<(), DingError> {
		let url = self.webhooks.get(name).ok_or_else(|| DingError::UnknownWebhook(name.to_owned()))?;

		self.send_group(payload, url).await
	}

	/// Resolve every recipient of `group_name` and send `payload` to each of
	/// them. Unknown groups have no recipients. A recipient whose phone lookup
	/// fails is skipped, failures never stop the remaining recipients.
	pub async fn send_to_recipients(&self, group_name: &str, payload: &DirectMessage) -> Vec<RecipientReport> {
		let recipients = match self.recipients.get(group_name) {
			Some(recipients) => recipients,
			None => {
				tracing::debug!("no recipients configured for group {group_name}");
				return Vec::new();
			}
		};

		let mut reports = Vec::with_capacity(recipients.len());

		for recipient in recipients {
			let outcome = match self.contacts.resolve(&recipient.mobile).await {
				Err(err) => RecipientOutcome::Unresolved(err),
				Ok(user_id) => match self.send_direct(&user_id, payload, None).await {
					Ok(()) => RecipientOutcome::Sent { user_id },
					Err(error) => {
						tracing::warn!("failed to send message to {} ({user_id}): {error}", recipient.name);
						RecipientOutcome::Failed { user_id, error }
					}
				},
			};

			reports.push(RecipientReport { recipient: recipient.clone(), outcome });
		}

		reports
	}

	/// Send `content` as plain text robot message into an internal conversation.
	pub async fn send_conversation(&self, conversation_id: &str, content: &str) -> Result<(), DingError> {
		let request = GroupSendRequest {
			robot_code: self.session.robot_code(),
			open_conversation_id: conversation_id,
			msg_key: TEXT_MSG_KEY,
			msg_param: json!({ "content": content }).to_string(),
		};

		let token = self.session.robot_access_token().await;
		let response = self.http.post_json(&self.api.group_send_url()?, Some(&token), &request).await?;

		if !response.status.is_success() {
			return Err(response.api_error());
		}

		Ok(())
	}

	/// send `content` into the conversation configured under `name`
	pub async fn send_to_conversation(&self, name: &str, content: &str) -> Result<(), DingError> {
		let conversation_id = self
			.conversations
			.get(name)
			.ok_or_else(|| DingError::UnknownConversation(name.to_owned()))?;

		self.send_conversation(conversation_id, content).await
	}
}
