pub mod account;
pub mod assets;
pub mod chat;
pub mod cleaner;
pub mod config;
pub mod dialect;
pub mod error;
pub mod language;
pub mod models;
pub mod payment;
pub mod render;
pub mod response;
pub mod segmenter;
pub mod session;
pub mod storage;
pub mod webhook;

pub use account::{AccountStore, Theme};
pub use chat::{ChatService, Exchange};
pub use cleaner::clean;
pub use config::{Config, get_config};
pub use error::ChatError;
pub use models::*;
pub use render::{RenderedMessage, render, render_plain};
pub use segmenter::segment;
pub use session::SessionStore;
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use webhook::{
    Attachment, ChatTransport, HttpTransport, PasswordReset, SupportRequest, SupportTopic,
};
