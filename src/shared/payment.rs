use super::account::AccountStore;
use super::cleaner::loose_string;
use super::config::PaymentConfig;
use super::error::ChatError;
use super::models::{PaymentRecord, Plan, SubscriptionStatus, User};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info};

/// Pixels added to the height the payment form reports.
const HEIGHT_PADDING: u32 = 15;

const PAYMENT_FAILED: &str = "אנא נסה שוב או פנה לתמיכה";
const UNKNOWN_ERROR: &str = "שגיאה לא ידועה";

/// Blue input borders for the hosted payment form.
pub const FORM_CSS: &str = r#"
input[type="text"], input[type="email"], input[type="tel"], input[type="number"], select, textarea {
  border: 2px solid #3b82f6 !important;
  border-radius: 6px !important;
  transition: border-color 0.2s ease !important;
}
input[type="text"]:focus, input[type="email"]:focus, input[type="tel"]:focus, input[type="number"]:focus, select:focus, textarea:focus {
  border-color: #1d4ed8 !important;
  box-shadow: 0 0 0 3px rgba(59, 130, 246, 0.1) !important;
  outline: none !important;
}
"#;

pub fn package_name(plan: Plan) -> &'static str {
    match plan {
        Plan::Free => "חבילה חינם",
        Plan::Pro => "חבילה בסיסית",
        Plan::Enterprise => "חבילה מתקדמת",
    }
}

/// A message received from the payment form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentMessage {
    /// New frame height in pixels, padding included.
    Height(u32),
    Completed { transaction_id: Option<String> },
    Failed(String),
    Error(String),
}

// Leading integer of a number or string, the way the form reports sizes.
fn leading_integer(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u32),
        Value::String(s) => {
            let digits: String = s
                .trim_start()
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            digits.parse().ok()
        }
        _ => None,
    }
}

fn text_of(value: Option<&Value>) -> Option<String> {
    value
        .filter(|v| !v.is_null())
        .map(loose_string)
        .filter(|s| !s.is_empty())
}

impl PaymentMessage {
    /// Decode a message posted by the payment frame. Anything not sent from
    /// the trusted origin, or with an unknown `Name`, yields `None`.
    pub fn from_event(origin: &str, data: &Value, trusted_origin: &str) -> Option<Self> {
        if origin != trusted_origin {
            debug!("Discarding payment message from {}", origin);
            return None;
        }

        let value = data.get("Value");
        match data.get("Name").and_then(Value::as_str)? {
            "Height" => {
                let height = value.and_then(leading_integer)?;
                Some(PaymentMessage::Height(height.saturating_add(HEIGHT_PADDING)))
            }
            "TransactionResponse" => {
                let value = value?;
                if value.get("Status").and_then(Value::as_str) == Some("Error") {
                    let message = text_of(value.get("Message"))
                        .unwrap_or_else(|| PAYMENT_FAILED.to_string());
                    Some(PaymentMessage::Failed(message))
                } else {
                    Some(PaymentMessage::Completed {
                        transaction_id: text_of(value.get("TransactionId")),
                    })
                }
            }
            "Error" => {
                let message = text_of(value.and_then(|v| v.get("message")))
                    .unwrap_or_else(|| UNKNOWN_ERROR.to_string());
                Some(PaymentMessage::Error(message))
            }
            other => {
                debug!("Ignoring payment message {}", other);
                None
            }
        }
    }
}

/// Fields of a `FinishTransaction2` request. Unused fields are sent empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TransactionRequest {
    pub mosad: String,
    pub api_valid: String,
    pub payment_type: String,
    pub currency: String,
    pub zeout: String,
    pub first_name: String,
    pub last_name: String,
    pub street: String,
    pub city: String,
    pub phone: String,
    pub mail: String,
    pub amount: String,
    pub tashlumim: String,
    pub groupe: String,
    pub comment: String,
    pub param1: String,
    pub param2: String,
    pub param3: String,
    pub param4: String,
    pub param5: String,
    pub force_update_matching: String,
    pub call_back: String,
    pub call_back_mail_error: String,
    pub tokef: String,
}

impl TransactionRequest {
    /// Standing order (`HK`) in shekels for `plan`, reporting to `callback`.
    pub fn for_plan(config: &PaymentConfig, callback: &str, user: &User, plan: Plan) -> Self {
        let package = package_name(plan);
        Self {
            mosad: config.mosad.clone(),
            api_valid: config.api_valid.clone(),
            payment_type: "HK".to_string(),
            currency: "1".to_string(),
            zeout: String::new(),
            first_name: user.name.clone(),
            last_name: String::new(),
            street: String::new(),
            city: String::new(),
            phone: user.phone.clone().unwrap_or_default(),
            mail: user.email.clone(),
            amount: plan.price().to_string(),
            tashlumim: String::new(),
            groupe: String::new(),
            comment: format!("תשלום עבור {package}"),
            param1: package.to_string(),
            param2: user.id.clone(),
            param3: user.name.clone(),
            param4: user.email.clone(),
            param5: user.category.name().to_string(),
            force_update_matching: "1".to_string(),
            call_back: callback.to_string(),
            call_back_mail_error: String::new(),
            tokef: String::new(),
        }
    }
}

/// A message posted to the payment frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "Name", content = "Value")]
pub enum PaymentCommand {
    GetHeight,
    #[serde(rename = "InjectCSS")]
    InjectCss(String),
    FinishTransaction2(TransactionRequest),
}

impl PaymentCommand {
    pub fn to_json(&self) -> Result<Value, ChatError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Upgrade the user to `plan` after a completed payment and record it in
/// their payment history.
pub fn apply_payment(
    accounts: &AccountStore,
    mut user: User,
    plan: Plan,
    transaction_id: Option<String>,
    now: DateTime<Utc>,
) -> Result<User, ChatError> {
    let package = package_name(plan);

    user.plan = plan;
    user.message_limit = plan.message_limit();
    user.subscription_status = Some(SubscriptionStatus::Active);
    user.subscription_start_date = Some(now);
    user.subscription_end_date = None;

    let record = PaymentRecord {
        id: transaction_id.unwrap_or_else(|| format!("pay_{}", now.timestamp_millis())),
        amount: plan.price(),
        currency: "ILS".to_string(),
        status: "completed".to_string(),
        created_at: now,
        plan,
        description: Some(format!("{package} subscription")),
    };
    info!("Payment {} upgraded {} to {}", record.id, user.id, plan.as_str());

    accounts.append_payment(&user.id, record)?;
    accounts.save_user(&user)?;
    Ok(user)
}

fn event_id(now: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("evt_{}_{}", now.timestamp_millis(), &suffix[..9])
}

fn customer(user: &User) -> Value {
    json!({
        "id": user.id,
        "email": user.email,
        "name": user.name,
        "category": user.category.name(),
    })
}

/// Event body asking the subscription webhook to cancel at period end.
pub fn cancellation_request(user: &User, now: DateTime<Utc>) -> Value {
    json!({
        "event": "subscription.cancellation_requested",
        "event_id": event_id(now),
        "timestamp": now.to_rfc3339(),
        "customer": customer(user),
        "subscription_details": {
            "current_plan": user.plan.as_str(),
            "current_limit": user.message_limit,
            "cancellation_type": "user_requested",
            "immediate": false,
        },
        "source": "chat_naki_app",
    })
}

/// Event body reporting that a cancelled subscription ran out.
pub fn expiry_notice(user: &User, previous_plan: Plan, now: DateTime<Utc>) -> Value {
    json!({
        "event": "subscription.expired",
        "timestamp": now.to_rfc3339(),
        "customer": customer(user),
        "plan_change": {
            "previous_plan": previous_plan.as_str(),
            "new_plan": "free",
            "expired_at": now.to_rfc3339(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::config::LimitsConfig;
    use crate::shared::models::Category;
    use crate::shared::storage::MemoryStore;
    use std::sync::Arc;

    const ORIGIN: &str = "https://matara.pro";

    fn user() -> User {
        User {
            id: "u1".to_string(),
            email: "dana@example.com".to_string(),
            name: "Dana".to_string(),
            category: Category::Writing,
            plan: Plan::Free,
            messages_used: 50,
            message_limit: 50,
            subscription_status: None,
            subscription_start_date: None,
            subscription_end_date: None,
            registration_date: None,
            phone: Some("050-0000000".to_string()),
        }
    }

    #[test]
    fn test_foreign_origin_is_discarded() {
        let data = json!({"Name": "Height", "Value": 300});
        assert_eq!(PaymentMessage::from_event("https://evil.example", &data, ORIGIN), None);
    }

    #[test]
    fn test_height_is_padded() {
        let data = json!({"Name": "Height", "Value": "480"});
        assert_eq!(
            PaymentMessage::from_event(ORIGIN, &data, ORIGIN),
            Some(PaymentMessage::Height(495))
        );

        let data = json!({"Name": "Height", "Value": 100});
        assert_eq!(
            PaymentMessage::from_event(ORIGIN, &data, ORIGIN),
            Some(PaymentMessage::Height(115))
        );
    }

    #[test]
    fn test_huge_height_saturates() {
        let data = json!({"Name": "Height", "Value": 1e20});
        assert_eq!(
            PaymentMessage::from_event(ORIGIN, &data, ORIGIN),
            Some(PaymentMessage::Height(u32::MAX))
        );

        let data = json!({"Name": "Height", "Value": "99999999999"});
        assert_eq!(PaymentMessage::from_event(ORIGIN, &data, ORIGIN), None);
    }

    #[test]
    fn test_transaction_responses() {
        let ok = json!({"Name": "TransactionResponse", "Value": {"Status": "OK", "TransactionId": 9911}});
        assert_eq!(
            PaymentMessage::from_event(ORIGIN, &ok, ORIGIN),
            Some(PaymentMessage::Completed {
                transaction_id: Some("9911".to_string())
            })
        );

        let failed = json!({"Name": "TransactionResponse", "Value": {"Status": "Error", "Message": "כרטיס נדחה"}});
        assert_eq!(
            PaymentMessage::from_event(ORIGIN, &failed, ORIGIN),
            Some(PaymentMessage::Failed("כרטיס נדחה".to_string()))
        );

        let failed = json!({"Name": "TransactionResponse", "Value": {"Status": "Error"}});
        assert_eq!(
            PaymentMessage::from_event(ORIGIN, &failed, ORIGIN),
            Some(PaymentMessage::Failed(PAYMENT_FAILED.to_string()))
        );
    }

    #[test]
    fn test_error_message_defaults() {
        let data = json!({"Name": "Error", "Value": null});
        assert_eq!(
            PaymentMessage::from_event(ORIGIN, &data, ORIGIN),
            Some(PaymentMessage::Error(UNKNOWN_ERROR.to_string()))
        );

        let data = json!({"Name": "Something"});
        assert_eq!(PaymentMessage::from_event(ORIGIN, &data, ORIGIN), None);
    }

    #[test]
    fn test_command_wire_shape() {
        assert_eq!(
            PaymentCommand::GetHeight.to_json().unwrap(),
            json!({"Name": "GetHeight"})
        );

        let css = PaymentCommand::InjectCss("a{}".to_string()).to_json().unwrap();
        assert_eq!(css, json!({"Name": "InjectCSS", "Value": "a{}"}));

        let config = PaymentConfig {
            mosad: "2813479".to_string(),
            ..PaymentConfig::default()
        };
        let request = TransactionRequest::for_plan(&config, "https://cb", &user(), Plan::Pro);
        let finish = PaymentCommand::FinishTransaction2(request).to_json().unwrap();

        assert_eq!(finish["Name"], "FinishTransaction2");
        let value = &finish["Value"];
        assert_eq!(value["Mosad"], "2813479");
        assert_eq!(value["PaymentType"], "HK");
        assert_eq!(value["Currency"], "1");
        assert_eq!(value["Amount"], "15");
        assert_eq!(value["Param1"], "חבילה בסיסית");
        assert_eq!(value["Param2"], "u1");
        assert_eq!(value["Param5"], "כתיבה ותמלול");
        assert_eq!(value["Phone"], "050-0000000");
        assert_eq!(value["ForceUpdateMatching"], "1");
        assert_eq!(value["CallBack"], "https://cb");
    }

    #[test]
    fn test_apply_payment_upgrades_and_records() {
        let accounts = AccountStore::new(Arc::new(MemoryStore::new()), &LimitsConfig::default());
        let now = Utc::now();

        let upgraded =
            apply_payment(&accounts, user(), Plan::Enterprise, Some("tx1".to_string()), now)
                .unwrap();

        assert_eq!(upgraded.plan, Plan::Enterprise);
        assert_eq!(upgraded.message_limit, 600_000);
        assert_eq!(upgraded.subscription_status, Some(SubscriptionStatus::Active));
        assert!(!upgraded.quota_exhausted());

        let history = accounts.payment_history("u1");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, "tx1");
        assert_eq!(history[0].amount, 25);
        assert_eq!(accounts.current_user().unwrap(), upgraded);
    }

    #[test]
    fn test_cancellation_request_body() {
        let body = cancellation_request(&user(), Utc::now());

        assert_eq!(body["event"], "subscription.cancellation_requested");
        assert!(body["event_id"].as_str().unwrap().starts_with("evt_"));
        assert_eq!(body["customer"]["category"], "כתיבה ותמלול");
        assert_eq!(body["subscription_details"]["current_limit"], 50);
        assert_eq!(body["subscription_details"]["immediate"], false);
    }
}
