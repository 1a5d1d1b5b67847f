//! Built-in node handlers, one per node kind.

pub mod ai;
pub mod delay;
pub mod discord;
pub mod http_request;
pub mod resend;
pub mod social;
pub mod trigger;

pub use ai::AiHandler;
pub use delay::DelayHandler;
pub use discord::DiscordHandler;
pub use http_request::HttpRequestHandler;
pub use resend::ResendHandler;
pub use social::{CreatePostHandler, GetPostsHandler};
pub use trigger::{CronTriggerHandler, TriggerHandler};

use serde::Serialize;
use serde_json::Value;

use crate::NodeError;

pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<Value, NodeError> {
    serde_json::to_value(value).map_err(|e| NodeError::fatal(format!("unserializable output: {e}")))
}
