pub mod webhook;

use serde::{Deserialize, Deserializer, Serialize};

/// An inbound message or slash command as posted by the chat server.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct BotRequest {
    pub channel_id: String,
    pub channel_name: String,
    pub team_domain: String,
    pub team_id: String,
    pub post_id: String,
    pub text: String,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub timestamp: i64,
    pub token: String,
    pub trigger_word: String,
    pub user_id: String,
    pub user_name: String,
}

/// Form posts carry the timestamp as text; anything unparsable becomes 0
/// rather than rejecting the whole request.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
        Other(serde::de::IgnoredAny),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Number(n) => n,
        Raw::Text(s) => s.trim().parse().unwrap_or(0),
        Raw::Other(_) => 0,
    })
}

impl BotRequest {
    /// Split the text into a command word and at most `max_args` arguments,
    /// the last argument keeping the rest of the text unsplit.
    ///
    /// The trigger word is stripped only when the text actually starts with it.
    /// With `max_args == 0` only the first whitespace-delimited token is
    /// returned. Empty text yields an empty command.
    pub fn command_and_args(&self, max_args: usize) -> (String, Vec<String>) {
        let mut s = self.text.as_str();
        if !self.trigger_word.is_empty() {
            s = s.strip_prefix(self.trigger_word.as_str()).unwrap_or(s);
        }
        let s = s.trim_matches(|c| matches!(c, ' ' | '\t' | '\n' | '\r'));
        if s.is_empty() {
            return (String::new(), Vec::new());
        }

        if max_args == 0 {
            let command = s.split_whitespace().next().unwrap_or_default();
            return (command.to_string(), Vec::new());
        }

        let mut fields = s.splitn(max_args + 1, ' ').map(str::to_string);
        let command = fields.next().unwrap_or_default();
        (command, fields.collect())
    }
}

/// Reply payload understood by Mattermost/Slack incoming webhooks.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BotResponse {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub icon_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub response_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl BotResponse {
    /// Response holding a single attachment.
    pub fn with_attachment(attachment: Attachment) -> Self {
        Self {
            attachments: vec![attachment],
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Attachment {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub color: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub pretext: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub fallback: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub image_url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub author_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub author_icon: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub author_link: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title_link: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<AttachmentField>,
}

impl Attachment {
    pub fn new(color: &str, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            color: color.to_string(),
            title: title.into(),
            text: text.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AttachmentField {
    pub short: bool,
    pub title: String,
    pub value: String,
}
