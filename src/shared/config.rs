use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "WebhookConfig::default_login_url")]
    pub login_url: String,
    #[serde(default = "WebhookConfig::default_chat_url")]
    pub chat_url: String,
    #[serde(default = "WebhookConfig::default_payment_callback_url")]
    pub payment_callback_url: String,
    #[serde(default = "WebhookConfig::default_password_url")]
    pub password_url: String,
    #[serde(default = "WebhookConfig::default_support_url")]
    pub support_url: String,
}

impl WebhookConfig {
    fn default_login_url() -> String {
        "https://n8n.chatnaki.co.il/webhook/login".to_string()
    }

    fn default_chat_url() -> String {
        "https://n8n.chatnaki.co.il/webhook/chatbot".to_string()
    }

    fn default_payment_callback_url() -> String {
        "https://n8n.chatnaki.co.il/webhook/payment".to_string()
    }

    fn default_password_url() -> String {
        "https://n8n.chatnaki.co.il/webhook/password".to_string()
    }

    fn default_support_url() -> String {
        "https://n8n.smartbiz.org.il/webhook/suport".to_string()
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            login_url: Self::default_login_url(),
            chat_url: Self::default_chat_url(),
            payment_callback_url: Self::default_payment_callback_url(),
            password_url: Self::default_password_url(),
            support_url: Self::default_support_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfig {
    #[serde(default = "PaymentConfig::default_trusted_origin")]
    pub trusted_origin: String,
    #[serde(default = "PaymentConfig::default_iframe_url")]
    pub iframe_url: String,
    /// Merchant identifier sent with `FinishTransaction2`.
    #[serde(default)]
    pub mosad: String,
    #[serde(default)]
    pub api_valid: String,
}

impl PaymentConfig {
    fn default_trusted_origin() -> String {
        "https://matara.pro".to_string()
    }

    fn default_iframe_url() -> String {
        "https://matara.pro/nedarimplus/iframe/".to_string()
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            trusted_origin: Self::default_trusted_origin(),
            iframe_url: Self::default_iframe_url(),
            mosad: String::new(),
            api_valid: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "LimitsConfig::default_max_sessions")]
    pub max_sessions: usize,
    #[serde(default = "LimitsConfig::default_free_message_limit")]
    pub free_message_limit: u64,
    #[serde(default = "LimitsConfig::default_title_words")]
    pub title_words: usize,
    #[serde(default = "LimitsConfig::default_title_chars")]
    pub title_chars: usize,
    #[serde(default = "LimitsConfig::default_error_body_chars")]
    pub error_body_chars: usize,
}

impl LimitsConfig {
    fn default_max_sessions() -> usize {
        10
    }

    fn default_free_message_limit() -> u64 {
        50
    }

    fn default_title_words() -> usize {
        3
    }

    fn default_title_chars() -> usize {
        50
    }

    fn default_error_body_chars() -> usize {
        180
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_sessions: 10,
            free_message_limit: 50,
            title_words: 3,
            title_chars: 50,
            error_body_chars: 180,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub webhooks: WebhookConfig,
    #[serde(default)]
    pub payment: PaymentConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?
            .join("expert-chat");

        let config_path = config_dir.join("config.yaml");

        let config = if config_path.exists() {
            let config_content = fs::read_to_string(&config_path)?;
            serde_yaml::from_str(&config_content)?
        } else {
            fs::create_dir_all(&config_dir)?;
            let default_config = Self::default();
            let config_content = serde_yaml::to_string(&default_config)?;
            fs::write(&config_path, config_content)?;
            default_config
        };

        Ok(config)
    }

    pub fn get_data_dir(&self) -> Result<PathBuf> {
        if let Some(data_dir) = &self.storage.data_dir {
            return Ok(data_dir.clone());
        }

        let data = dirs::data_dir().ok_or_else(|| anyhow!("Could not find data directory"))?;
        Ok(data.join("expert-chat"))
    }

    pub fn get_store_path(&self) -> Result<PathBuf> {
        Ok(self.get_data_dir()?.join("store.json"))
    }
}

use once_cell::sync::OnceCell;
static CONFIG: OnceCell<Config> = OnceCell::new();

pub fn get_config() -> &'static Config {
    CONFIG.get_or_init(|| Config::load().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "limits:\n  max_sessions: 4\npayment:\n  mosad: \"123\"\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.limits.max_sessions, 4);
        assert_eq!(config.limits.free_message_limit, 50);
        assert_eq!(config.payment.mosad, "123");
        assert_eq!(config.payment.trusted_origin, "https://matara.pro");
        assert!(config.webhooks.chat_url.ends_with("/chatbot"));
    }

    #[test]
    fn test_data_dir_override() {
        let mut config = Config::default();
        config.storage.data_dir = Some(PathBuf::from("/tmp/expert-chat-test"));

        assert_eq!(
            config.get_store_path().unwrap(),
            PathBuf::from("/tmp/expert-chat-test/store.json")
        );
    }
}
