use super::cleaner::loose_string;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Fields probed, in order, for the text of a chat reply record.
const REPLY_TEXT_FIELDS: [&str; 4] = ["message", "response", "content", "text"];

const TOKEN_FIELDS: [&str; 4] = ["token", "jwt", "access_token", "accessToken"];

pub const SENT_OK: &str = "ההודעה נשלחה בהצלחה לשרת.";
pub const EMPTY_LIST: &str = "השרת החזיר תגובה ריקה.";
pub const GENERIC_REPLY: &str = "קיבלתי תגובה מהשרת";
pub const EMPTY_TEXT: &str = "תגובה ריקה מהשרת";
pub const UNEXPECTED_REPLY: &str = "קיבלתי תשובה לא צפויה מהשרת";
pub const NO_CONTENT: &str = "השרת לא החזיר תוכן.";

/// Truthiness as a loosely typed runtime sees it.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn truthy_field<'a>(obj: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    obj.get(field).filter(|v| is_truthy(v))
}

/// A webhook reply body, sorted by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookReply {
    /// The literal `true`.
    Accepted,
    /// A JSON-encoded string.
    Text(String),
    Record(Map<String, Value>),
    List(Vec<Value>),
    /// A body that is not JSON at all.
    Plain(String),
    /// Any other JSON value (`false`, numbers, `null`), with the raw body.
    Unknown(String),
}

impl WebhookReply {
    pub fn decode(body: &str) -> Self {
        match serde_json::from_str::<Value>(body) {
            Ok(Value::Bool(true)) => WebhookReply::Accepted,
            Ok(Value::String(s)) => WebhookReply::Text(s),
            Ok(Value::Object(obj)) => WebhookReply::Record(obj),
            Ok(Value::Array(items)) => WebhookReply::List(items),
            Ok(_) => WebhookReply::Unknown(body.to_string()),
            Err(e) => {
                debug!("Reply is not JSON, using it as plain text: {}", e);
                WebhookReply::Plain(body.to_string())
            }
        }
    }

    /// The record a reply carries: the object itself, or the first element
    /// of a list.
    pub fn record(&self) -> Option<&Map<String, Value>> {
        match self {
            WebhookReply::Record(obj) => Some(obj),
            WebhookReply::List(items) => items.first().and_then(Value::as_object),
            _ => None,
        }
    }
}

/// Bearer token carried by a reply, looked up in the reply record.
pub fn extract_token(reply: &WebhookReply) -> Option<String> {
    let record = reply.record()?;
    TOKEN_FIELDS
        .iter()
        .find_map(|field| truthy_field(record, field))
        .map(loose_string)
}

/// What a chat reply means for the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatOutcome {
    /// Text of the bot message to append.
    pub content: String,
    /// Whether the exchange counts against the user's quota.
    pub counts_against_quota: bool,
}

impl ChatOutcome {
    pub fn from_reply(reply: &WebhookReply) -> Self {
        let (content, counts_against_quota) = match reply {
            WebhookReply::Accepted => (SENT_OK.to_string(), true),
            WebhookReply::Text(s) if s.is_empty() => (EMPTY_TEXT.to_string(), true),
            WebhookReply::Text(s) => (s.clone(), true),
            // plain text is shown as a record holding only a message
            WebhookReply::Plain(text) => {
                let mut obj = Map::new();
                obj.insert("message".to_string(), Value::String(text.clone()));
                from_record(&obj)
            }
            WebhookReply::Record(obj) => from_record(obj),
            WebhookReply::List(items) => match items.first() {
                None => (EMPTY_LIST.to_string(), false),
                Some(Value::String(s)) => (s.clone(), true),
                Some(Value::Object(obj)) => from_record(obj),
                Some(_) => (Value::Array(items.clone()).to_string(), false),
            },
            WebhookReply::Unknown(raw) if raw.is_empty() => (UNEXPECTED_REPLY.to_string(), false),
            WebhookReply::Unknown(raw) => (raw.clone(), false),
        };

        let content = if content.trim().is_empty() || content == "[]" || content == "null" {
            NO_CONTENT.to_string()
        } else {
            content
        };

        Self {
            content,
            counts_against_quota,
        }
    }
}

fn from_record(obj: &Map<String, Value>) -> (String, bool) {
    let flagged = [obj.get("shouldProcess"), obj.get("success")]
        .into_iter()
        .any(|v| v == Some(&Value::Bool(true)));

    let text = REPLY_TEXT_FIELDS
        .iter()
        .find_map(|field| truthy_field(obj, field))
        .map(loose_string);

    match (text, flagged) {
        (Some(text), flagged) => (text, flagged),
        (None, true) => (GENERIC_REPLY.to_string(), true),
        (None, false) => (Value::Object(obj.clone()).to_string(), false),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthEvent {
    Register,
    Login,
}

impl AuthEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthEvent::Register => "register",
            AuthEvent::Login => "login",
        }
    }

    /// Notice when the webhook answered without success and gave no text.
    pub fn rejected_message(&self) -> &'static str {
        match self {
            AuthEvent::Register => "המשתמש כבר קיים במערכת",
            AuthEvent::Login => "שגיאה בהתחברות",
        }
    }

    /// Notice when the webhook answered with a non-2xx status.
    pub fn failed_message(&self) -> &'static str {
        match self {
            AuthEvent::Register => "שגיאה ברישום. אנא נסו שוב.",
            AuthEvent::Login => "שגיאה בהתחברות. אנא נסו שוב.",
        }
    }
}

/// Result of a register or login reply.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthOutcome {
    /// Profile fields the webhook sent back; empty for a bare `true`.
    Success { profile: Map<String, Value> },
    Rejected(String),
}

impl AuthOutcome {
    pub fn from_reply(event: AuthEvent, reply: &WebhookReply) -> Self {
        match reply {
            WebhookReply::Accepted => {
                return AuthOutcome::Success {
                    profile: Map::new(),
                };
            }
            WebhookReply::Record(obj) if obj.get("success").is_some_and(is_truthy) => {
                return AuthOutcome::Success {
                    profile: obj.clone(),
                };
            }
            WebhookReply::List(_) if event == AuthEvent::Login => {
                if let Some(first) = reply.record()
                    && first.get("success").is_some_and(is_truthy)
                {
                    return AuthOutcome::Success {
                        profile: first.clone(),
                    };
                }
            }
            _ => {}
        }

        match reply {
            WebhookReply::Text(s) | WebhookReply::Plain(s) => AuthOutcome::Rejected(s.clone()),
            _ => AuthOutcome::Rejected(event.rejected_message().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outcome(body: &str) -> ChatOutcome {
        ChatOutcome::from_reply(&WebhookReply::decode(body))
    }

    #[test]
    fn test_decode_shapes() {
        assert_eq!(WebhookReply::decode("true"), WebhookReply::Accepted);
        assert_eq!(WebhookReply::decode("\"hi\""), WebhookReply::Text("hi".to_string()));
        assert!(matches!(WebhookReply::decode("{}"), WebhookReply::Record(_)));
        assert!(matches!(WebhookReply::decode("[1]"), WebhookReply::List(_)));
        assert_eq!(WebhookReply::decode("false"), WebhookReply::Unknown("false".to_string()));
        assert_eq!(
            WebhookReply::decode("hello there"),
            WebhookReply::Plain("hello there".to_string())
        );
    }

    #[test]
    fn test_literal_true_counts_with_generic_text() {
        let out = outcome("true");
        assert_eq!(out.content, SENT_OK);
        assert!(out.counts_against_quota);
    }

    #[test]
    fn test_plain_text_is_shown_but_not_counted() {
        let out = outcome("שלום, איך אפשר לעזור?");
        assert_eq!(out.content, "שלום, איך אפשר לעזור?");
        assert!(!out.counts_against_quota);
    }

    #[test]
    fn test_record_flags_decide_counting() {
        let out = outcome(r#"{"success":true,"response":"answer"}"#);
        assert_eq!(out.content, "answer");
        assert!(out.counts_against_quota);

        let out = outcome(r#"{"shouldProcess":true}"#);
        assert_eq!(out.content, GENERIC_REPLY);
        assert!(out.counts_against_quota);

        let out = outcome(r#"{"success":"yes","text":"maybe"}"#);
        assert_eq!(out.content, "maybe");
        assert!(!out.counts_against_quota);

        let out = outcome(r#"{"status":"queued"}"#);
        assert_eq!(out.content, r#"{"status":"queued"}"#);
        assert!(!out.counts_against_quota);
    }

    #[test]
    fn test_list_replies() {
        let out = outcome("[]");
        assert_eq!(out.content, EMPTY_LIST);
        assert!(!out.counts_against_quota);

        let out = outcome(r#"["first", "second"]"#);
        assert_eq!(out.content, "first");
        assert!(out.counts_against_quota);

        let out = outcome(r#"[{"output":"x","success":true,"message":"from list"}]"#);
        assert_eq!(out.content, "from list");
        assert!(out.counts_against_quota);

        let out = outcome("[1,2]");
        assert_eq!(out.content, "[1,2]");
        assert!(!out.counts_against_quota);
    }

    #[test]
    fn test_strings_and_odd_values() {
        let out = outcome("\"\"");
        assert_eq!(out.content, EMPTY_TEXT);
        assert!(out.counts_against_quota);

        let out = outcome("42");
        assert_eq!(out.content, "42");
        assert!(!out.counts_against_quota);

        let out = outcome("null");
        assert_eq!(out.content, NO_CONTENT);

        let out = outcome("[null]");
        assert_eq!(out.content, "[null]");
    }

    #[test]
    fn test_token_extraction() {
        let reply = WebhookReply::decode(r#"{"jwt":"abc","token":""}"#);
        assert_eq!(extract_token(&reply), Some("abc".to_string()));

        let reply = WebhookReply::decode(r#"[{"accessToken":"xyz"}]"#);
        assert_eq!(extract_token(&reply), Some("xyz".to_string()));

        assert_eq!(extract_token(&WebhookReply::Accepted), None);
        assert_eq!(extract_token(&WebhookReply::decode("\"token\"")), None);
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!(null)));
        assert!(is_truthy(&json!([])));
        assert!(is_truthy(&json!("0")));
    }

    #[test]
    fn test_register_outcomes() {
        let ok = AuthOutcome::from_reply(AuthEvent::Register, &WebhookReply::decode("true"));
        assert_eq!(ok, AuthOutcome::Success { profile: Map::new() });

        let ok = AuthOutcome::from_reply(
            AuthEvent::Register,
            &WebhookReply::decode(r#"{"success":1,"id":"u9"}"#),
        );
        assert!(matches!(ok, AuthOutcome::Success { profile } if profile["id"] == "u9"));

        let rejected =
            AuthOutcome::from_reply(AuthEvent::Register, &WebhookReply::decode("false"));
        assert_eq!(rejected, AuthOutcome::Rejected("המשתמש כבר קיים במערכת".to_string()));

        let rejected = AuthOutcome::from_reply(
            AuthEvent::Register,
            &WebhookReply::decode(r#"[{"success":true}]"#),
        );
        assert_eq!(rejected, AuthOutcome::Rejected("המשתמש כבר קיים במערכת".to_string()));
    }

    #[test]
    fn test_login_outcomes() {
        let ok = AuthOutcome::from_reply(
            AuthEvent::Login,
            &WebhookReply::decode(r#"[{"success":true,"name":"Dana"}]"#),
        );
        assert!(matches!(ok, AuthOutcome::Success { profile } if profile["name"] == "Dana"));

        let rejected =
            AuthOutcome::from_reply(AuthEvent::Login, &WebhookReply::decode("wrong password"));
        assert_eq!(rejected, AuthOutcome::Rejected("wrong password".to_string()));

        let rejected = AuthOutcome::from_reply(
            AuthEvent::Login,
            &WebhookReply::decode(r#"{"success":false}"#),
        );
        assert_eq!(rejected, AuthOutcome::Rejected("שגיאה בהתחברות".to_string()));
    }
}
