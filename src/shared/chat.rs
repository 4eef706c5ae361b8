use super::account::{
    AccountStore, check_subscription_expiry, request_cancellation, user_from_auth,
};
use super::config::LimitsConfig;
use super::error::ChatError;
use super::models::{Category, Message, Plan, SubscriptionStatus, User};
use super::payment::{apply_payment, cancellation_request, expiry_notice};
use super::response::{AuthOutcome, ChatOutcome, WebhookReply, extract_token};
use super::session::{SessionStore, draft_session_title};
use super::storage::KeyValueStore;
use super::webhook::{
    Attachment, AuthRequest, ChatRequest, ChatTransport, PasswordReset, SupportRequest,
    SupportTopic,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

const UPLOAD_PREFIX: &str = "הועלה קובץ: ";
const RESET_FAILED: &str = "אירעה שגיאה בעדכון הסיסמה. אנא נסו שוב.";
const SUPPORT_FAILED: &str = "אירעה שגיאה בשליחת הפניה. אנא נסה שוב.";

/// Everything one successful send produced.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub user_message: Message,
    pub bot_message: Message,
    pub outcome: ChatOutcome,
    /// The user after the quota was counted.
    pub user: User,
    pub session_id: String,
}

/// Text shown for the user's side of an exchange.
pub fn display_content(input: &str, attachments: &[Attachment]) -> String {
    if !input.is_empty() || attachments.is_empty() {
        return input.to_string();
    }
    let names: Vec<&str> = attachments.iter().map(|a| a.file_name.as_str()).collect();
    format!("{UPLOAD_PREFIX}{}", names.join(", "))
}

pub struct ChatService {
    transport: Arc<dyn ChatTransport>,
    accounts: AccountStore,
    sessions: SessionStore,
    title_chars: usize,
}

impl ChatService {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        store: Arc<dyn KeyValueStore>,
        limits: &LimitsConfig,
    ) -> Self {
        Self {
            transport,
            accounts: AccountStore::new(store.clone(), limits),
            sessions: SessionStore::new(store, limits),
            title_chars: limits.title_chars,
        }
    }

    pub fn accounts(&self) -> &AccountStore {
        &self.accounts
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
        category: Category,
    ) -> Result<User, ChatError> {
        self.authenticate(AuthRequest::register(email, password, name, category))
            .await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User, ChatError> {
        self.authenticate(AuthRequest::login(email, password)).await
    }

    async fn authenticate(&self, request: AuthRequest) -> Result<User, ChatError> {
        let body = match self.transport.authenticate(&request).await {
            Ok(body) => body,
            Err(ChatError::Status { status, .. }) => {
                warn!("{} webhook answered {}", request.event.as_str(), status);
                return Err(ChatError::Rejected(
                    request.event.failed_message().to_string(),
                ));
            }
            Err(e) => return Err(e),
        };

        let reply = WebhookReply::decode(&body);
        let profile = match AuthOutcome::from_reply(request.event, &reply) {
            AuthOutcome::Success { profile } => profile,
            AuthOutcome::Rejected(message) => {
                info!("{} rejected for {}", request.event.as_str(), request.email);
                return Err(ChatError::Rejected(message));
            }
        };

        let user = user_from_auth(
            &request,
            &profile,
            self.accounts.free_message_limit(),
            Utc::now(),
        );
        if let Some(token) = extract_token(&reply) {
            self.accounts.set_token(&token)?;
        }
        self.accounts.save_user(&user)?;

        info!("Signed in {} as {}", user.email, user.id);
        Ok(user)
    }

    /// Send one message. The user message is stored before the webhook is
    /// called, so it survives a failed send.
    pub async fn send(
        &self,
        input: &str,
        attachments: Vec<Attachment>,
    ) -> Result<Exchange, ChatError> {
        if input.trim().is_empty() && attachments.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let mut user = self
            .accounts
            .current_user()
            .ok_or(ChatError::NotAuthenticated)?;
        let session_id = self.sessions.current_or_new_session_id()?;

        if user.quota_exhausted() {
            return Err(ChatError::QuotaExceeded {
                used: user.messages_used,
                limit: user.message_limit,
            });
        }

        let user_message =
            Message::user(display_content(input, &attachments), Some(user.category));
        let mut messages = self.sessions.chat_history();
        messages.push(user_message.clone());
        self.sessions.save_chat_history(&messages)?;

        let existing_title = self
            .sessions
            .find_session(&user.id, &session_id)
            .map(|s| s.title);
        let request = ChatRequest {
            user: user.clone(),
            message: input.to_string(),
            message_position: messages.len(),
            session_title: draft_session_title(
                existing_title.as_deref(),
                input,
                self.title_chars,
            ),
            session_id: session_id.clone(),
            client_id: self.sessions.client_id()?,
            token: self.accounts.token(),
            attachments,
        };

        let body = match self.transport.send_chat(&request).await {
            Ok(body) => body,
            Err(e) => {
                if let ChatError::Status { status: 401, .. } = e {
                    warn!("Chat webhook refused the credentials, signing out");
                    self.accounts.clear_credentials()?;
                }
                return Err(e);
            }
        };

        let reply = WebhookReply::decode(&body);
        if let Some(token) = extract_token(&reply) {
            debug!("Storing refreshed token");
            self.accounts.set_token(&token)?;
        }

        let outcome = ChatOutcome::from_reply(&reply);
        // Counted before anything below is persisted.
        if outcome.counts_against_quota {
            self.accounts.record_exchange(&mut user)?;
        }

        let bot_message = Message::bot(outcome.content.clone(), Some(user.category));
        messages.push(bot_message.clone());
        self.sessions.save_chat_history(&messages)?;
        self.sessions
            .save_conversation(&user.id, &session_id, &messages)?;

        Ok(Exchange {
            user_message,
            bot_message,
            outcome,
            user,
            session_id,
        })
    }

    /// Save the conversation on screen and switch to a fresh session.
    pub fn start_new_conversation(&self) -> Result<String, ChatError> {
        let messages = self.sessions.chat_history();
        if !messages.is_empty()
            && let Some(user) = self.accounts.current_user()
            && let Some(session_id) = self.sessions.current_session_id()
        {
            self.sessions
                .save_conversation(&user.id, &session_id, &messages)?;
        }

        self.sessions.save_chat_history(&[])?;
        self.sessions.new_session_id()
    }

    /// Set a new password through an emailed reset link.
    pub async fn reset_password(
        &self,
        email: &str,
        token: &str,
        password: &str,
        confirm: &str,
    ) -> Result<(), ChatError> {
        let request = PasswordReset::new(email, token, password, confirm)?;
        match self.transport.reset_password(&request).await {
            Ok(_) => {
                info!("Password reset for {}", request.email);
                Ok(())
            }
            Err(e @ (ChatError::Network(_) | ChatError::Status { .. })) => {
                warn!("Password reset failed: {}", e);
                Err(ChatError::Rejected(RESET_FAILED.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Send a support request on behalf of the signed-in user.
    pub async fn contact_support(
        &self,
        topic: SupportTopic,
        content: &str,
        attachments: Vec<Attachment>,
    ) -> Result<(), ChatError> {
        let user = self
            .accounts
            .current_user()
            .ok_or(ChatError::NotAuthenticated)?;
        let request = SupportRequest::new(&user, topic, content, attachments)?;

        match self.transport.contact_support(&request).await {
            Ok(_) => {
                info!("Support request ({}) sent for {}", topic.id(), user.id);
                Ok(())
            }
            Err(e @ (ChatError::Network(_) | ChatError::Status { .. })) => {
                warn!("Support request failed: {}", e);
                Err(ChatError::Rejected(SUPPORT_FAILED.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Record a completed payment for `plan`.
    pub fn complete_payment(
        &self,
        plan: Plan,
        transaction_id: Option<String>,
    ) -> Result<User, ChatError> {
        let user = self
            .accounts
            .current_user()
            .ok_or(ChatError::NotAuthenticated)?;
        apply_payment(&self.accounts, user, plan, transaction_id, Utc::now())
    }

    /// Ask the subscription webhook to cancel at the end of the period, then
    /// mark the subscription as pending cancellation.
    pub async fn cancel_subscription(&self) -> Result<User, ChatError> {
        let user = self
            .accounts
            .current_user()
            .ok_or(ChatError::NotAuthenticated)?;
        let now = Utc::now();

        self.transport
            .notify(&cancellation_request(&user, now))
            .await?;

        let user = request_cancellation(user, now);
        self.accounts.save_user(&user)?;
        info!("Cancellation of {} pending", user.id);
        Ok(user)
    }

    /// Downgrade an expired subscription and report it. A failed report is
    /// logged; the downgrade stands.
    pub async fn refresh_subscription(&self) -> Result<Option<User>, ChatError> {
        let Some(stored) = self.accounts.stored_user() else {
            return Ok(None);
        };
        let now = Utc::now();
        let previous_plan = stored.plan;
        let user = check_subscription_expiry(
            stored.clone(),
            now,
            self.accounts.free_message_limit(),
        );

        if user != stored && user.subscription_status == Some(SubscriptionStatus::Expired) {
            self.accounts.save_user(&user)?;
            if let Err(e) = self
                .transport
                .notify(&expiry_notice(&user, previous_plan, now))
                .await
            {
                warn!("Failed to send expiry event: {}", e);
            }
        }

        Ok(Some(user))
    }
}
