use super::config::{LimitsConfig, WebhookConfig};
use super::error::ChatError;
use super::models::{Category, Plan, User};
use super::response::AuthEvent;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Upload format reported for an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Mp3,
    Wav,
    Weba,
    Aac,
    Ogg,
    M4a,
    Mp4,
    Webm,
    File,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Mp3 => "mp3",
            FileType::Wav => "wav",
            FileType::Weba => "weba",
            FileType::Aac => "aac",
            FileType::Ogg => "ogg",
            FileType::M4a => "m4a",
            FileType::Mp4 => "mp4",
            FileType::Webm => "webm",
            FileType::File => "file",
        }
    }

    pub fn is_media(&self) -> bool {
        !matches!(self, FileType::File)
    }
}

/// Classify an upload. Audio extensions win, then video by mime type or
/// extension, then audio by mime type alone.
pub fn detect_file_type(file_name: &str, mime_type: &str) -> FileType {
    let name = file_name.to_lowercase();
    let mime = mime_type.to_lowercase();

    let audio_by_extension = [
        (".mp3", FileType::Mp3),
        (".mpga", FileType::Mp3),
        (".wav", FileType::Wav),
        (".weba", FileType::Weba),
        (".aac", FileType::Aac),
        (".ogg", FileType::Ogg),
        (".m4a", FileType::M4a),
    ];
    if let Some((_, file_type)) = audio_by_extension
        .iter()
        .find(|(ext, _)| name.ends_with(ext))
    {
        return *file_type;
    }

    let video_extension = [".mp4", ".avi", ".mov", ".mkv", ".wmv", ".webm"]
        .iter()
        .any(|ext| name.ends_with(ext));
    if mime.starts_with("video/") || video_extension {
        return if name.ends_with(".webm") {
            FileType::Webm
        } else {
            FileType::Mp4
        };
    }

    if mime.starts_with("audio/") {
        if mime.contains("mpeg") || mime.contains("mp3") {
            return FileType::Mp3;
        }
        if mime.contains("wav") {
            return FileType::Wav;
        }
        if mime.contains("webm") {
            return FileType::Webm;
        }
        return FileType::Mp3;
    }

    FileType::File
}

#[derive(Debug, Clone)]
pub struct Attachment {
    pub file_name: String,
    /// May be empty when unknown.
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn from_path(path: &Path) -> Result<Self, ChatError> {
        let bytes = fs::read(path).map_err(|e| ChatError::Storage(e.to_string()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "file".to_string());

        Ok(Self {
            mime_type: guess_mime(&file_name).unwrap_or_default().to_string(),
            file_name,
            bytes,
        })
    }

    pub fn file_type(&self) -> FileType {
        detect_file_type(&self.file_name, &self.mime_type)
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    fn part(&self) -> Result<Part, ChatError> {
        let mut part = Part::bytes(self.bytes.clone()).file_name(self.file_name.clone());
        if !self.mime_type.is_empty() {
            part = part.mime_str(&self.mime_type)?;
        }
        Ok(part)
    }
}

/// MIME type for the extensions the upload forms care about.
pub fn guess_mime(file_name: &str) -> Option<&'static str> {
    let ext = file_name.rsplit_once('.')?.1.to_lowercase();
    let mime = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "mp3" | "mpga" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "m4a" => "audio/mp4",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        _ => return None,
    };
    Some(mime)
}

/// Body of a register or login call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest {
    pub event: AuthEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
}

impl AuthRequest {
    /// A sign-up carries a freshly generated user id the webhook may adopt.
    pub fn register(email: &str, password: &str, name: &str, category: Category) -> Self {
        Self {
            event: AuthEvent::Register,
            user_id: Some(uuid::Uuid::new_v4().to_string()),
            email: email.to_string(),
            password: password.to_string(),
            name: Some(name.to_string()),
            category: Some(category),
        }
    }

    pub fn login(email: &str, password: &str) -> Self {
        Self {
            event: AuthEvent::Login,
            user_id: None,
            email: email.to_string(),
            password: password.to_string(),
            name: None,
            category: None,
        }
    }

    pub fn to_body(&self, timestamp: DateTime<Utc>) -> Result<Value, ChatError> {
        let mut body = serde_json::to_value(self)?;
        body["timestamp"] = Value::String(timestamp.to_rfc3339());
        Ok(body)
    }
}

/// One message posted to the chat webhook.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub user: User,
    pub message: String,
    /// 1-based position of the message in the conversation.
    pub message_position: usize,
    pub session_title: String,
    pub session_id: String,
    pub client_id: String,
    pub token: Option<String>,
    pub attachments: Vec<Attachment>,
}

impl ChatRequest {
    /// Text fields of the multipart form, in send order.
    pub fn form_fields(&self, timestamp: DateTime<Utc>) -> Vec<(&'static str, String)> {
        let user = &self.user;
        let mut fields = vec![
            ("userId", user.id.clone()),
            ("userEmail", user.email.clone()),
            ("userName", user.name.clone()),
            ("userCategory", user.category.name().to_string()),
            ("userPlan", user.plan.as_str().to_string()),
            ("userMessagesUsed", user.messages_used.to_string()),
            ("userMessageLimit", user.message_limit.to_string()),
            ("message", self.message.clone()),
            ("messagePosition", self.message_position.to_string()),
            ("sessionTitle", self.session_title.clone()),
            ("category", user.category.name().to_string()),
            ("timestamp", timestamp.to_rfc3339()),
            ("sessionId", self.session_id.clone()),
            ("clientId", self.client_id.clone()),
        ];
        if let Some(token) = &self.token {
            fields.push(("token", token.clone()));
        }
        fields
    }

    fn form(&self, timestamp: DateTime<Utc>) -> Result<Form, ChatError> {
        let mut form = Form::new();
        for (name, value) in self.form_fields(timestamp) {
            form = form.text(name, value);
        }

        for attachment in &self.attachments {
            debug!(
                "Attaching {} ({})",
                attachment.file_name,
                attachment.file_type().as_str()
            );
            form = form.part("file", attachment.part()?);
        }

        Ok(form)
    }
}

const MIN_PASSWORD_CHARS: usize = 6;

/// A new password set through an emailed reset link.
#[derive(Debug, Clone)]
pub struct PasswordReset {
    pub email: String,
    pub token: String,
    pub new_password: String,
}

impl PasswordReset {
    /// Check the link parameters and the typed passwords before anything is sent.
    pub fn new(email: &str, token: &str, password: &str, confirm: &str) -> Result<Self, ChatError> {
        if email.trim().is_empty() || token.trim().is_empty() {
            return Err(ChatError::Invalid(
                "קישור לא תקין. אנא בקשו קישור חדש לאיפוס סיסמה.".to_string(),
            ));
        }
        if password.is_empty() || confirm.is_empty() {
            return Err(ChatError::Invalid("אנא מלאו את כל השדות".to_string()));
        }
        if password != confirm {
            return Err(ChatError::Invalid("הסיסמאות לא תואמות".to_string()));
        }
        if password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(ChatError::Invalid(
                "הסיסמה חייבת להכיל לפחות 6 תווים".to_string(),
            ));
        }

        Ok(Self {
            email: email.trim().to_string(),
            token: token.trim().to_string(),
            new_password: password.to_string(),
        })
    }

    pub fn form_fields(&self, timestamp: DateTime<Utc>) -> Vec<(&'static str, String)> {
        vec![
            ("event", "password_reset_completed".to_string()),
            ("email", self.email.clone()),
            ("token", self.token.clone()),
            ("status", "success".to_string()),
            ("timestamp", timestamp.to_rfc3339()),
            ("user_agent", concat!("expert-chat/", env!("CARGO_PKG_VERSION")).to_string()),
            ("new_password", self.new_password.clone()),
            ("password", self.new_password.clone()),
        ]
    }

    fn form(&self, timestamp: DateTime<Utc>) -> Form {
        self.form_fields(timestamp)
            .into_iter()
            .fold(Form::new(), |form, (name, value)| form.text(name, value))
    }
}

/// What a support request is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportTopic {
    Feedback,
    SecurityReport,
    InstitutionDiscount,
    BusinessBot,
}

impl SupportTopic {
    pub const ALL: [SupportTopic; 4] = [
        SupportTopic::Feedback,
        SupportTopic::SecurityReport,
        SupportTopic::InstitutionDiscount,
        SupportTopic::BusinessBot,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            SupportTopic::Feedback => "feedback",
            SupportTopic::SecurityReport => "security",
            SupportTopic::InstitutionDiscount => "institution",
            SupportTopic::BusinessBot => "business",
        }
    }

    /// Hebrew name sent as the `category` field.
    pub fn name(&self) -> &'static str {
        match self {
            SupportTopic::Feedback => "הערות",
            SupportTopic::SecurityReport => "דיווח על פירצה",
            SupportTopic::InstitutionDiscount => "הנחה למוסדות",
            SupportTopic::BusinessBot => "הזמנת בוט לחברות מסחריות",
        }
    }

    /// Accepts the id or the Hebrew name.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.id().eq_ignore_ascii_case(s) || t.name() == s)
    }
}

/// A message to the support team.
#[derive(Debug, Clone)]
pub struct SupportRequest {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub topic: SupportTopic,
    pub content: String,
    pub attachments: Vec<Attachment>,
}

impl SupportRequest {
    /// Free-plan users may only attach images.
    pub fn new(
        user: &User,
        topic: SupportTopic,
        content: &str,
        attachments: Vec<Attachment>,
    ) -> Result<Self, ChatError> {
        if content.trim().is_empty() {
            return Err(ChatError::Invalid("אנא מלא את כל השדות הנדרשים".to_string()));
        }
        if user.plan == Plan::Free && attachments.iter().any(|a| !a.is_image()) {
            return Err(ChatError::Invalid(
                "משתמשי התוכנית החינמית יכולים להעלות רק קבצי תמונה".to_string(),
            ));
        }

        Ok(Self {
            name: user.name.clone(),
            phone: user.phone.clone().unwrap_or_default(),
            email: user.email.clone(),
            topic,
            content: content.trim().to_string(),
            attachments,
        })
    }

    pub fn form_fields(&self, timestamp: DateTime<Utc>) -> Vec<(&'static str, String)> {
        vec![
            ("name", self.name.clone()),
            ("phone", self.phone.clone()),
            ("email", self.email.clone()),
            ("category", self.topic.name().to_string()),
            ("content", self.content.clone()),
            ("timestamp", timestamp.to_rfc3339()),
        ]
    }

    fn form(&self, timestamp: DateTime<Utc>) -> Result<Form, ChatError> {
        let mut form = Form::new();
        for (name, value) in self.form_fields(timestamp) {
            form = form.text(name, value);
        }
        for (i, attachment) in self.attachments.iter().enumerate() {
            form = form.part(format!("file_{i}"), attachment.part()?);
        }
        Ok(form)
    }
}

/// The outbound side of the chat client. Implementations return the raw
/// reply body of a successful call; decoding is left to the caller.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn authenticate(&self, request: &AuthRequest) -> Result<String, ChatError>;

    async fn send_chat(&self, request: &ChatRequest) -> Result<String, ChatError>;

    /// Fire a JSON event at the subscription webhook.
    async fn notify(&self, event: &Value) -> Result<String, ChatError>;

    async fn reset_password(&self, request: &PasswordReset) -> Result<String, ChatError>;

    async fn contact_support(&self, request: &SupportRequest) -> Result<String, ChatError>;
}

pub struct HttpTransport {
    client: Client,
    login_url: String,
    chat_url: String,
    callback_url: String,
    password_url: String,
    support_url: String,
    error_body_chars: usize,
}

impl HttpTransport {
    pub fn new(webhooks: &WebhookConfig, limits: &LimitsConfig) -> Self {
        Self {
            client: Client::new(),
            login_url: webhooks.login_url.clone(),
            chat_url: webhooks.chat_url.clone(),
            callback_url: webhooks.payment_callback_url.clone(),
            password_url: webhooks.password_url.clone(),
            support_url: webhooks.support_url.clone(),
            error_body_chars: limits.error_body_chars,
        }
    }

    async fn read_reply(&self, response: reqwest::Response) -> Result<String, ChatError> {
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            debug!("Webhook replied {}: {}", status, body);
            Ok(body)
        } else {
            warn!("Webhook replied {}: {}", status, body);
            Err(ChatError::status(status.as_u16(), &body, self.error_body_chars))
        }
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn authenticate(&self, request: &AuthRequest) -> Result<String, ChatError> {
        let body = request.to_body(Utc::now())?;
        debug!("Sending {} request for {}", request.event.as_str(), request.email);

        let response = self.client.post(&self.login_url).json(&body).send().await?;
        self.read_reply(response).await
    }

    async fn send_chat(&self, request: &ChatRequest) -> Result<String, ChatError> {
        let form = request.form(Utc::now())?;
        debug!(
            "Sending message {} of session {}",
            request.message_position, request.session_id
        );

        let mut builder = self.client.post(&self.chat_url).multipart(form);
        if let Some(token) = &request.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        self.read_reply(response).await
    }

    async fn notify(&self, event: &Value) -> Result<String, ChatError> {
        let response = self.client.post(&self.callback_url).json(event).send().await?;
        self.read_reply(response).await
    }

    async fn reset_password(&self, request: &PasswordReset) -> Result<String, ChatError> {
        debug!("Sending password reset for {}", request.email);
        let form = request.form(Utc::now());

        let response = self.client.post(&self.password_url).multipart(form).send().await?;
        self.read_reply(response).await
    }

    async fn contact_support(&self, request: &SupportRequest) -> Result<String, ChatError> {
        debug!(
            "Sending support request ({}) with {} files",
            request.topic.id(),
            request.attachments.len()
        );
        let form = request.form(Utc::now())?;

        let response = self.client.post(&self.support_url).multipart(form).send().await?;
        self.read_reply(response).await
    }
}
