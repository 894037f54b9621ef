//! clients for the dingtalk open platform and group robot webhooks

pub mod contacts;
pub mod error;
pub mod http_client;
pub mod robot;
pub mod session;
pub mod settings;

pub use contacts::Contacts;
pub use error::DingError;
pub use http_client::Client;
pub use robot::{Messenger, RecipientOutcome, RecipientReport};
pub use session::{Credentials, Session};
pub use settings::{ApiSettings, Recipient};
