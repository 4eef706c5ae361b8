use super::config::LimitsConfig;
use super::error::ChatError;
use super::models::{Category, PaymentRecord, Plan, SubscriptionStatus, User};
use super::response::{AuthEvent, is_truthy};
use super::storage::{
    CHAT_HISTORY_KEY, CURRENT_SESSION_KEY, KeyValueStore, THEME_KEY, TOKEN_KEY, USER_KEY,
    load_json, payment_history_key, save_json,
};
use super::webhook::AuthRequest;
use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Dark => "dark",
            Theme::Light => "light",
        }
    }
}

/// Downgrade a cancelled subscription once its paid period is over.
pub fn check_subscription_expiry(mut user: User, now: DateTime<Utc>, free_limit: u64) -> User {
    if user.subscription_status == Some(SubscriptionStatus::CancelPending)
        && let Some(end) = user.subscription_end_date
        && now >= end
    {
        info!("Subscription of {} expired, moving to the free plan", user.id);
        user.plan = Plan::Free;
        user.message_limit = free_limit;
        user.subscription_status = Some(SubscriptionStatus::Expired);
    }
    user
}

/// Mark the subscription as cancelled at the end of the current month.
pub fn request_cancellation(mut user: User, now: DateTime<Utc>) -> User {
    user.subscription_status = Some(SubscriptionStatus::CancelPending);
    user.subscription_end_date = Some(now.checked_add_months(Months::new(1)).unwrap_or(now));
    user
}

fn string_field(profile: &Map<String, Value>, field: &str) -> Option<String> {
    match profile.get(field) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(v) if is_truthy(v) => Some(v.to_string()),
        _ => None,
    }
}

fn count_field(profile: &Map<String, Value>, field: &str) -> Option<u64> {
    profile.get(field).and_then(Value::as_u64).filter(|n| *n > 0)
}

/// Build the signed-in user from an auth request and the profile fields the
/// webhook answered with. Missing fields take the free-plan defaults.
pub fn user_from_auth(
    request: &AuthRequest,
    profile: &Map<String, Value>,
    free_limit: u64,
    now: DateTime<Utc>,
) -> User {
    let id = string_field(profile, "id")
        .or_else(|| request.user_id.clone())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let request_name = request.name.clone().unwrap_or_default();
    let (name, category, registration_date) = match request.event {
        AuthEvent::Register => (
            request_name,
            request.category.unwrap_or(Category::Programming),
            now,
        ),
        AuthEvent::Login => (
            string_field(profile, "name").unwrap_or(request_name),
            string_field(profile, "category")
                .and_then(|c| Category::parse(&c))
                .unwrap_or(Category::Programming),
            string_field(profile, "registrationDate")
                .and_then(|d| DateTime::parse_from_rfc3339(&d).ok())
                .map(|d| d.with_timezone(&Utc))
                .unwrap_or(now),
        ),
    };

    User {
        id,
        email: request.email.clone(),
        name,
        category,
        plan: string_field(profile, "plan")
            .and_then(|p| Plan::parse(&p))
            .unwrap_or_default(),
        messages_used: count_field(profile, "messagesUsed").unwrap_or(0),
        message_limit: count_field(profile, "messageLimit").unwrap_or(free_limit),
        subscription_status: None,
        subscription_start_date: None,
        subscription_end_date: None,
        registration_date: Some(registration_date),
        phone: string_field(profile, "phone"),
    }
}

/// Signed-in user, bearer token, and preferences.
pub struct AccountStore {
    store: Arc<dyn KeyValueStore>,
    free_message_limit: u64,
}

impl AccountStore {
    pub fn new(store: Arc<dyn KeyValueStore>, limits: &LimitsConfig) -> Self {
        Self {
            store,
            free_message_limit: limits.free_message_limit,
        }
    }

    pub fn free_message_limit(&self) -> u64 {
        self.free_message_limit
    }

    /// The stored user exactly as persisted.
    pub fn stored_user(&self) -> Option<User> {
        load_json(self.store.as_ref(), USER_KEY)
    }

    /// The stored user, downgraded first if a cancelled subscription ran out.
    pub fn current_user(&self) -> Option<User> {
        let user: User = load_json(self.store.as_ref(), USER_KEY)?;
        let checked = check_subscription_expiry(user.clone(), Utc::now(), self.free_message_limit);
        if checked != user
            && let Err(e) = self.save_user(&checked)
        {
            debug!("Could not persist expired subscription: {}", e);
        }
        Some(checked)
    }

    pub fn save_user(&self, user: &User) -> Result<(), ChatError> {
        save_json(self.store.as_ref(), USER_KEY, user)
    }

    /// Count one processed exchange against the user's quota.
    pub fn record_exchange(&self, user: &mut User) -> Result<(), ChatError> {
        user.messages_used += 1;
        self.save_user(user)
    }

    pub fn token(&self) -> Option<String> {
        self.store.get(TOKEN_KEY).filter(|t| !t.is_empty())
    }

    pub fn set_token(&self, token: &str) -> Result<(), ChatError> {
        self.store.set(TOKEN_KEY, token)
    }

    /// Forget the credentials after the webhook refused them.
    pub fn clear_credentials(&self) -> Result<(), ChatError> {
        self.store.remove(TOKEN_KEY)?;
        self.store.remove(USER_KEY)
    }

    pub fn theme(&self) -> Theme {
        match self.store.get(THEME_KEY).as_deref() {
            Some("light") => Theme::Light,
            _ => Theme::Dark,
        }
    }

    pub fn set_theme(&self, theme: Theme) -> Result<(), ChatError> {
        self.store.set(THEME_KEY, theme.as_str())
    }

    /// Clear the user, token, on-screen history and current session. Saved
    /// conversations stay.
    pub fn logout(&self) -> Result<(), ChatError> {
        for key in [USER_KEY, TOKEN_KEY, CHAT_HISTORY_KEY, CURRENT_SESSION_KEY] {
            self.store.remove(key)?;
        }
        info!("Logged out");
        Ok(())
    }

    pub fn payment_history(&self, user_id: &str) -> Vec<PaymentRecord> {
        load_json(self.store.as_ref(), &payment_history_key(user_id)).unwrap_or_default()
    }

    pub fn append_payment(&self, user_id: &str, record: PaymentRecord) -> Result<(), ChatError> {
        let mut history = self.payment_history(user_id);
        history.push(record);
        save_json(self.store.as_ref(), &payment_history_key(user_id), &history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::storage::MemoryStore;
    use chrono::Duration;
    use serde_json::json;

    fn sample_user() -> User {
        User {
            id: "u1".to_string(),
            email: "dana@example.com".to_string(),
            name: "Dana".to_string(),
            category: Category::Programming,
            plan: Plan::Pro,
            messages_used: 10,
            message_limit: 300_000,
            subscription_status: Some(SubscriptionStatus::Active),
            subscription_start_date: None,
            subscription_end_date: None,
            registration_date: None,
            phone: None,
        }
    }

    fn request(event: AuthEvent) -> AuthRequest {
        AuthRequest {
            event,
            user_id: Some("generated".to_string()),
            email: "dana@example.com".to_string(),
            password: "secret".to_string(),
            name: Some("Dana".to_string()),
            category: Some(Category::Design),
        }
    }

    fn profile(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_pending_cancellation_expires_at_end_date() {
        let now = Utc::now();
        let user = request_cancellation(sample_user(), now - Duration::days(40));
        assert_eq!(user.subscription_status, Some(SubscriptionStatus::CancelPending));

        let expired = check_subscription_expiry(user, now, 50);
        assert_eq!(expired.plan, Plan::Free);
        assert_eq!(expired.message_limit, 50);
        assert_eq!(expired.subscription_status, Some(SubscriptionStatus::Expired));
    }

    #[test]
    fn test_active_or_future_cancellation_is_untouched() {
        let now = Utc::now();
        let active = sample_user();
        assert_eq!(check_subscription_expiry(active.clone(), now, 50), active);

        let pending = request_cancellation(sample_user(), now);
        assert_eq!(check_subscription_expiry(pending.clone(), now, 50), pending);
    }

    #[test]
    fn test_register_user_uses_request_and_defaults() {
        let now = Utc::now();
        let user = user_from_auth(&request(AuthEvent::Register), &Map::new(), 50, now);

        assert_eq!(user.id, "generated");
        assert_eq!(user.category, Category::Design);
        assert_eq!(user.plan, Plan::Free);
        assert_eq!(user.messages_used, 0);
        assert_eq!(user.message_limit, 50);
        assert_eq!(user.registration_date, Some(now));
    }

    #[test]
    fn test_login_user_prefers_profile_fields() {
        let fields = profile(json!({
            "success": true,
            "id": 77,
            "name": "Dana L",
            "category": "writing",
            "plan": "enterprise",
            "messagesUsed": 12,
            "messageLimit": 600000
        }));
        let user = user_from_auth(&request(AuthEvent::Login), &fields, 50, Utc::now());

        assert_eq!(user.id, "77");
        assert_eq!(user.name, "Dana L");
        assert_eq!(user.category, Category::Writing);
        assert_eq!(user.plan, Plan::Enterprise);
        assert_eq!(user.messages_used, 12);
        assert_eq!(user.message_limit, 600_000);
    }

    #[test]
    fn test_login_category_defaults_to_programming() {
        let user = user_from_auth(&request(AuthEvent::Login), &Map::new(), 50, Utc::now());
        assert_eq!(user.category, Category::Programming);
    }

    #[test]
    fn test_logout_keeps_saved_conversations() {
        let store = Arc::new(MemoryStore::new());
        let accounts = AccountStore::new(store.clone(), &LimitsConfig::default());

        accounts.save_user(&sample_user()).unwrap();
        accounts.set_token("tok").unwrap();
        store.set(CURRENT_SESSION_KEY, "s1").unwrap();
        store.set("expert_chat_conversations_u1", "[]").unwrap();

        accounts.logout().unwrap();

        assert!(accounts.current_user().is_none());
        assert!(accounts.token().is_none());
        assert!(store.get(CURRENT_SESSION_KEY).is_none());
        assert!(store.get("expert_chat_conversations_u1").is_some());
    }

    #[test]
    fn test_record_exchange_and_payment_history() {
        let accounts = AccountStore::new(Arc::new(MemoryStore::new()), &LimitsConfig::default());
        let mut user = sample_user();

        accounts.record_exchange(&mut user).unwrap();
        assert_eq!(accounts.current_user().unwrap().messages_used, 11);

        let record = PaymentRecord {
            id: "pay_1".to_string(),
            amount: 15,
            currency: "ILS".to_string(),
            status: "completed".to_string(),
            created_at: Utc::now(),
            plan: Plan::Pro,
            description: None,
        };
        accounts.append_payment("u1", record.clone()).unwrap();
        assert_eq!(accounts.payment_history("u1"), vec![record]);
    }

    #[test]
    fn test_theme_defaults_to_dark() {
        let accounts = AccountStore::new(Arc::new(MemoryStore::new()), &LimitsConfig::default());
        assert_eq!(accounts.theme(), Theme::Dark);
        accounts.set_theme(Theme::Light).unwrap();
        assert_eq!(accounts.theme(), Theme::Light);
    }
}
