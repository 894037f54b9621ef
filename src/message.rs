//! Message payloads understood by dingtalk.
//!
//! Every alert becomes a [DirectMessage] for robot messages to single users and
//! a [GroupMessage] for group robot webhooks. Which builder is used depends on
//! the alert [Status].

use serde::Serialize;

use crate::alert::Status;

/// template key of direct robot messages (action card with two buttons)
pub const DIRECT_MSG_KEY: &str = "sampleActionCard6";
/// template key of plain text robot messages
pub const TEXT_MSG_KEY: &str = "sampleText";
/// buttons side by side
const BUTTON_ORIENTATION: &str = "1";
const SILENCE_BUTTON_TITLE: &str = "抑制2h";
const GRAPH_BUTTON_TITLE: &str = "关联图表";

#[derive(Debug, Clone, PartialEq, Eq)]
/// rendered parts every message is built from
pub struct Card {
	pub title: String,
	pub text: String,
	/// alertmanager link for silencing the alert
	pub silence_link: String,
	/// link to the graph of the alert expression
	pub graph_link: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
/// parameters of [DIRECT_MSG_KEY]
pub struct DirectMessage {
	pub title: String,
	pub text: String,
	pub btn_orientation: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub button_title1: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub button_url1: Option<String>,
	pub button_title2: String,
	pub button_url2: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// body of a group robot webhook call
pub struct GroupMessage {
	pub msgtype: String,
	#[serde(rename = "actionCard")]
	pub action_card: ActionCard,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionCard {
	pub title: String,
	pub text: String,
	pub btn_orientation: String,
	pub btns: Vec<Button>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Button {
	pub title: String,
	#[serde(rename = "actionURL")]
	pub action_url: String,
}

impl Button {
	fn silence(card: &Card) -> Self {
		Self { title: SILENCE_BUTTON_TITLE.to_owned(), action_url: card.silence_link.clone() }
	}

	fn graph(card: &Card) -> Self {
		Self { title: GRAPH_BUTTON_TITLE.to_owned(), action_url: card.graph_link.clone() }
	}
}

/// direct message for a firing alert, offers silencing and the graph
pub fn firing_direct(card: &Card) -> DirectMessage {
	DirectMessage {
		title: card.title.clone(),
		text: card.text.clone(),
		btn_orientation: BUTTON_ORIENTATION.to_owned(),
		button_title1: Some(SILENCE_BUTTON_TITLE.to_owned()),
		button_url1: Some(card.silence_link.clone()),
		button_title2: GRAPH_BUTTON_TITLE.to_owned(),
		button_url2: card.graph_link.clone(),
	}
}

/// direct message for a resolved alert, there is nothing left to silence
pub fn resolved_direct(card: &Card) -> DirectMessage {
	DirectMessage {
		title: card.title.clone(),
		text: card.text.clone(),
		btn_orientation: BUTTON_ORIENTATION.to_owned(),
		button_title1: None,
		button_url1: None,
		button_title2: GRAPH_BUTTON_TITLE.to_owned(),
		button_url2: card.graph_link.clone(),
	}
}

/// action card for a firing alert
pub fn firing_group(card: &Card) -> GroupMessage {
	action_card(card, vec![Button::silence(card), Button::graph(card)])
}

/// action card for a resolved alert
pub fn resolved_group(card: &Card) -> GroupMessage {
	action_card(card, vec![Button::silence(card), Button::graph(card)])
}

fn action_card(card: &Card, btns: Vec<Button>) -> GroupMessage {
	GroupMessage {
		msgtype: "actionCard".to_owned(),
		action_card: ActionCard {
			title: card.title.clone(),
			text: card.text.clone(),
			btn_orientation: BUTTON_ORIENTATION.to_owned(),
			btns,
		},
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// all variants of a single alert
pub struct FormattedAlert {
	pub card: Card,
	pub direct: DirectMessage,
	pub group: GroupMessage,
}

impl FormattedAlert {
	pub fn new(status: Status, card: Card) -> Self {
		let (direct, group) = match status {
			Status::Firing => (firing_direct(&card), firing_group(&card)),
			Status::Resolved => (resolved_direct(&card), resolved_group(&card)),
		};

		Self { card, direct, group }
	}
}
