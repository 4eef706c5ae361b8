use super::dialect::Dialect;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One chat turn as stored in a session's message list.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub content: String,
    pub is_user: bool,
    pub timestamp: DateTime<Utc>,
    pub category: Option<Category>,
}

impl Message {
    pub fn user(content: impl Into<String>, category: Option<Category>) -> Self {
        Self::new(content, true, category)
    }

    pub fn bot(content: impl Into<String>, category: Option<Category>) -> Self {
        Self::new(content, false, category)
    }

    fn new(content: impl Into<String>, is_user: bool, category: Option<Category>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            is_user,
            timestamp: Utc::now(),
            category,
        }
    }

    /// Short display name for the sender
    pub fn role_display(&self) -> &'static str {
        if self.is_user { "User" } else { "Bot" }
    }
}

/// Conversation metadata kept in the per-user session list.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub session_id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub last_message_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    #[default]
    Free,
    Pro,
    Enterprise,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Pro => "pro",
            Plan::Enterprise => "enterprise",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Plan::Free => "חינמי",
            Plan::Pro => "Pro",
            Plan::Enterprise => "Enterprise",
        }
    }

    /// Monthly price in shekels.
    pub fn price(&self) -> u32 {
        match self {
            Plan::Free => 0,
            Plan::Pro => 15,
            Plan::Enterprise => 25,
        }
    }

    pub fn message_limit(&self) -> u64 {
        match self {
            Plan::Free => 50,
            Plan::Pro => 300_000,
            Plan::Enterprise => 600_000,
        }
    }

    pub fn price_label(&self) -> String {
        match self {
            Plan::Free => "חינם".to_string(),
            _ => format!("₪{}/חודש", self.price()),
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "free" => Some(Plan::Free),
            "pro" => Some(Plan::Pro),
            "enterprise" => Some(Plan::Enterprise),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Free,
    Active,
    CancelPending,
    Expired,
}

/// Professional categories a user picks at signup.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    #[serde(rename = "תכנות")]
    Programming,
    #[serde(rename = "אדריכלות ועיצוב פנים")]
    Architecture,
    #[serde(rename = "כתיבה ותמלול")]
    Writing,
    #[serde(rename = "גרפיקה ועיצוב")]
    Design,
    #[serde(rename = "ניסוח ושכתוב")]
    Copywriting,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Programming,
        Category::Architecture,
        Category::Writing,
        Category::Design,
        Category::Copywriting,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Category::Programming => "תכנות",
            Category::Architecture => "אדריכלות ועיצוב פנים",
            Category::Writing => "כתיבה ותמלול",
            Category::Design => "גרפיקה ועיצוב",
            Category::Copywriting => "ניסוח ושכתוב",
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            Category::Programming => "programming",
            Category::Architecture => "architecture",
            Category::Writing => "writing",
            Category::Design => "design",
            Category::Copywriting => "copywriting",
        }
    }

    /// Accepts either the Hebrew display name or the ASCII id.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.name() == value || c.id().eq_ignore_ascii_case(value))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub category: Category,
    #[serde(default)]
    pub plan: Plan,
    #[serde(default)]
    pub messages_used: u64,
    pub message_limit: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_status: Option<SubscriptionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_start_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_end_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl User {
    pub fn quota_exhausted(&self) -> bool {
        self.messages_used >= self.message_limit
    }

    pub fn remaining_messages(&self) -> u64 {
        self.message_limit.saturating_sub(self.messages_used)
    }

    /// Plan name with the pending-cancellation marker the account page shows.
    pub fn plan_display(&self) -> String {
        let base = self.plan.display_name();
        if self.subscription_status == Some(SubscriptionStatus::CancelPending) {
            format!("{base} (בביטול)")
        } else {
            base.to_string()
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SegmentKind {
    Hebrew,
    OtherText,
    Code,
}

impl SegmentKind {
    pub fn short_name(&self) -> &'static str {
        match self {
            SegmentKind::Hebrew => "he",
            SegmentKind::OtherText => "text",
            SegmentKind::Code => "code",
        }
    }
}

/// A maximal run of lines sharing one classification.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Segment {
    pub kind: SegmentKind,
    pub text: String,
    /// Set for code segments only.
    pub dialect: Option<Dialect>,
}

/// A payment made through the hosted payment form.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub id: String,
    pub amount: u32,
    pub currency: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub plan: Plan,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
