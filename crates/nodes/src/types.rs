//! Node type tags and node status values.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// NodeType
// ---------------------------------------------------------------------------

/// Every node kind the platform can execute.
///
/// The set is closed: the executor registry holds exactly one executor per
/// variant and dispatch is checked exhaustively at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    /// Placeholder node the editor creates for an empty workflow.
    Initial,
    ManualTrigger,
    HttpRequest,
    GoogleFormTrigger,
    StripeTrigger,
    CronTrigger,
    #[serde(rename = "OPENAI")]
    OpenAi,
    Gemini,
    #[serde(rename = "DEEPSEEK")]
    DeepSeek,
    Discord,
    Resend,
    Delay,
    XCreatePost,
    XGetTweet,
}

impl NodeType {
    pub const ALL: [NodeType; 14] = [
        Self::Initial,
        Self::ManualTrigger,
        Self::HttpRequest,
        Self::GoogleFormTrigger,
        Self::StripeTrigger,
        Self::CronTrigger,
        Self::OpenAi,
        Self::Gemini,
        Self::DeepSeek,
        Self::Discord,
        Self::Resend,
        Self::Delay,
        Self::XCreatePost,
        Self::XGetTweet,
    ];

    /// The persisted type tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "INITIAL",
            Self::ManualTrigger => "MANUAL_TRIGGER",
            Self::HttpRequest => "HTTP_REQUEST",
            Self::GoogleFormTrigger => "GOOGLE_FORM_TRIGGER",
            Self::StripeTrigger => "STRIPE_TRIGGER",
            Self::CronTrigger => "CRON_TRIGGER",
            Self::OpenAi => "OPENAI",
            Self::Gemini => "GEMINI",
            Self::DeepSeek => "DEEPSEEK",
            Self::Discord => "DISCORD",
            Self::Resend => "RESEND",
            Self::Delay => "DELAY",
            Self::XCreatePost => "X_CREATE_POST",
            Self::XGetTweet => "X_GET_TWEET",
        }
    }

    /// Kebab-case slug used for step names and channel names.
    pub fn slug(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::ManualTrigger => "manual-trigger",
            Self::HttpRequest => "http-request",
            Self::GoogleFormTrigger => "google-form-trigger",
            Self::StripeTrigger => "stripe-trigger",
            Self::CronTrigger => "cron-trigger",
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::DeepSeek => "deepseek",
            Self::Discord => "discord",
            Self::Resend => "resend",
            Self::Delay => "delay",
            Self::XCreatePost => "x-create-post",
            Self::XGetTweet => "x-get-tweet",
        }
    }

    /// Name of the live status channel for this node type.
    pub fn channel(self) -> String {
        format!("{}-execution", self.slug())
    }

    /// Human-readable label used in validation messages.
    pub fn label(self) -> &'static str {
        match self {
            Self::Initial => "Initial",
            Self::ManualTrigger => "Manual Trigger",
            Self::HttpRequest => "HTTP Request",
            Self::GoogleFormTrigger => "Google Form Trigger",
            Self::StripeTrigger => "Stripe Trigger",
            Self::CronTrigger => "Cron Trigger",
            Self::OpenAi => "OpenAI",
            Self::Gemini => "Gemini",
            Self::DeepSeek => "DeepSeek",
            Self::Discord => "Discord",
            Self::Resend => "Resend",
            Self::Delay => "Delay",
            Self::XCreatePost => "X Create Post",
            Self::XGetTweet => "X Get Tweet",
        }
    }

    /// Triggers start a run and need no incoming connection.
    pub fn is_trigger(self) -> bool {
        matches!(
            self,
            Self::Initial
                | Self::ManualTrigger
                | Self::GoogleFormTrigger
                | Self::StripeTrigger
                | Self::CronTrigger
        )
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown node type: {s}"))
    }
}

// ---------------------------------------------------------------------------
// NodeStatus
// ---------------------------------------------------------------------------

/// Last known state of one node within one execution.
///
/// `Initial → Loading → Success`, or `Loading → Error` (fatal), or
/// `Loading → Retrying → Loading → …` (transient).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Initial,
    Loading,
    Success,
    Error,
    Retrying,
}

impl NodeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Loading => "loading",
            Self::Success => "success",
            Self::Error => "error",
            Self::Retrying => "retrying",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip_through_from_str() {
        for t in NodeType::ALL {
            assert_eq!(t.as_str().parse::<NodeType>().unwrap(), t);
        }
        assert!("SLACK".parse::<NodeType>().is_err());
    }

    #[test]
    fn serde_uses_persisted_tags() {
        assert_eq!(serde_json::to_value(NodeType::OpenAi).unwrap(), "OPENAI");
        assert_eq!(serde_json::to_value(NodeType::XGetTweet).unwrap(), "X_GET_TWEET");
        assert_eq!(serde_json::to_value(NodeStatus::Retrying).unwrap(), "retrying");
    }

    #[test]
    fn trigger_classification() {
        assert!(NodeType::CronTrigger.is_trigger());
        assert!(NodeType::Initial.is_trigger());
        assert!(!NodeType::HttpRequest.is_trigger());
        assert!(!NodeType::Delay.is_trigger());
    }

    #[test]
    fn channel_names() {
        assert_eq!(NodeType::HttpRequest.channel(), "http-request-execution");
        assert_eq!(NodeType::CronTrigger.channel(), "cron-trigger-execution");
    }
}
