use crate::shared::{
    Attachment, Category, ChatError, ChatService, FileStore, HttpTransport, KeyValueStore,
    Message, SupportTopic, clean, get_config, render, render_plain, segment,
};
use anyhow::{Context, Result, anyhow};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Level;
use tracing::{debug, error};
use tracing_subscriber::FmtSubscriber;

pub struct CliArgs {
    pub verbose: u8,
    pub command: CliCommands,
}

pub enum CliCommands {
    Render {
        file: Option<PathBuf>,
    },
    Segments {
        file: Option<PathBuf>,
    },
    Sessions {
        action: SessionAction,
    },
    Register {
        email: String,
        password: String,
        name: String,
        category: String,
    },
    Login {
        email: String,
        password: String,
    },
    Logout,
    Account,
    Send {
        message: String,
        files: Vec<PathBuf>,
    },
    New,
    ResetPassword {
        email: String,
        token: String,
        password: String,
        confirm: String,
    },
    Support {
        topic: String,
        content: String,
        files: Vec<PathBuf>,
    },
}

pub enum SessionAction {
    List,
    Show { session_id: String },
    Delete { session_id: String },
}

fn setup_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        _ => Level::DEBUG,
    };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

pub async fn run_cli(args: CliArgs) -> Result<()> {
    setup_logging(args.verbose);

    match args.command {
        CliCommands::Render { file } => {
            let raw = read_input(file.as_deref())?;
            println!("{}", render_plain(&render(&raw)));
        }
        CliCommands::Segments { file } => {
            let raw = read_input(file.as_deref())?;
            show_segments(&raw);
        }
        CliCommands::Sessions { action } => {
            let service = open_service()?;
            match action {
                SessionAction::List => list_sessions(&service)?,
                SessionAction::Show { session_id } => show_session(&service, &session_id),
                SessionAction::Delete { session_id } => delete_session(&service, &session_id)?,
            }
        }
        CliCommands::Register {
            email,
            password,
            name,
            category,
        } => {
            let category = Category::parse(&category)
                .ok_or_else(|| anyhow!("Unknown category: {}", category))?;
            let service = open_service()?;
            let user = report(service.register(&email, &password, &name, category).await)?;
            println!("Registered {} ({})", user.email, user.category);
        }
        CliCommands::Login { email, password } => {
            let service = open_service()?;
            let user = report(service.login(&email, &password).await)?;
            println!("Signed in as {} ({})", user.name, user.plan_display());
        }
        CliCommands::Logout => {
            let service = open_service()?;
            service.accounts().logout()?;
            println!("Signed out.");
        }
        CliCommands::Account => {
            let service = open_service()?;
            show_account(&service).await?;
        }
        CliCommands::Send { message, files } => {
            let service = open_service()?;
            send_message(&service, &message, &files).await?;
        }
        CliCommands::New => {
            let service = open_service()?;
            let session_id = service.start_new_conversation()?;
            println!("Started conversation {session_id}");
        }
        CliCommands::ResetPassword {
            email,
            token,
            password,
            confirm,
        } => {
            let service = open_service()?;
            report(
                service
                    .reset_password(&email, &token, &password, &confirm)
                    .await,
            )?;
            println!("הסיסמה עודכנה בהצלחה!");
        }
        CliCommands::Support {
            topic,
            content,
            files,
        } => {
            let topic = SupportTopic::parse(&topic)
                .ok_or_else(|| anyhow!("Unknown support topic: {}", topic))?;
            let attachments = read_attachments(&files)?;
            let service = open_service()?;
            report(service.contact_support(topic, &content, attachments).await)?;
            println!("הפניה נשלחה בהצלחה");
        }
    }

    Ok(())
}

fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut input = String::new();
            io::stdin().read_to_string(&mut input)?;
            Ok(input)
        }
    }
}

fn open_service() -> Result<ChatService> {
    let config = get_config();
    let store_path = config.get_store_path()?;
    debug!("Using store {}", store_path.display());

    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(&store_path)?);
    let transport = Arc::new(HttpTransport::new(&config.webhooks, &config.limits));
    Ok(ChatService::new(transport, store, &config.limits))
}

/// Print the user-facing notice for a failed call before handing the error up.
fn report<T>(result: Result<T, ChatError>) -> Result<T> {
    result.map_err(|e| {
        error!("{}", e);
        eprintln!("{}", e.user_message());
        e.into()
    })
}

fn show_segments(raw: &str) {
    let segments = segment(&clean(raw));
    if segments.is_empty() {
        println!("No segments.");
        return;
    }

    for (i, seg) in segments.iter().enumerate() {
        match seg.dialect {
            Some(dialect) => println!("--- {} [{} {}]", i + 1, seg.kind.short_name(), dialect),
            None => println!("--- {} [{}]", i + 1, seg.kind.short_name()),
        }
        println!("{}", seg.text);
    }
}

fn print_message(message: &Message) {
    println!(
        "{} [{}]",
        message.role_display(),
        message.timestamp.format("%Y-%m-%d %H:%M")
    );
    println!("{}\n", render_plain(&render(&message.content)));
}

fn list_sessions(service: &ChatService) -> Result<()> {
    let user = service
        .accounts()
        .current_user()
        .ok_or(ChatError::NotAuthenticated)?;
    let sessions = service.sessions().list_sessions(&user.id);
    let current = service.sessions().current_session_id();

    if sessions.is_empty() {
        println!("No saved conversations.");
        return Ok(());
    }

    for session in sessions {
        let marker = if current.as_deref() == Some(session.session_id.as_str()) {
            "*"
        } else {
            " "
        };
        println!(
            "{} {}  {}  {}",
            marker,
            session.session_id,
            session.last_message_at.format("%Y-%m-%d %H:%M"),
            session.title
        );
    }

    Ok(())
}

fn show_session(service: &ChatService, session_id: &str) {
    let messages = service.sessions().load(session_id);
    if messages.is_empty() {
        println!("Conversation {session_id} has no saved messages.");
        return;
    }

    for message in &messages {
        print_message(message);
    }
}

fn delete_session(service: &ChatService, session_id: &str) -> Result<()> {
    let user = service
        .accounts()
        .current_user()
        .ok_or(ChatError::NotAuthenticated)?;

    if service.sessions().delete_session(&user.id, session_id)? {
        println!("Deleted conversation {session_id}");
    } else {
        println!("Conversation {session_id} not found.");
    }
    Ok(())
}

async fn show_account(service: &ChatService) -> Result<()> {
    let Some(user) = report(service.refresh_subscription().await)? else {
        println!("Not signed in.");
        return Ok(());
    };

    println!("{} <{}>", user.name, user.email);
    println!("  Category: {}", user.category);
    println!("  Plan: {} ({})", user.plan_display(), user.plan.price_label());
    println!(
        "  Messages: {}/{} ({} left)",
        user.messages_used,
        user.message_limit,
        user.remaining_messages()
    );
    if let Some(end) = user.subscription_end_date {
        println!("  Ends: {}", end.format("%Y-%m-%d"));
    }
    println!("  Theme: {}", service.accounts().theme().as_str());

    let history = service.accounts().payment_history(&user.id);
    if !history.is_empty() {
        println!("\nPayments:");
        for payment in history {
            println!(
                "  {} {} {} {} ({})",
                payment.created_at.format("%Y-%m-%d"),
                payment.amount,
                payment.currency,
                payment.plan.display_name(),
                payment.status
            );
        }
    }

    Ok(())
}

fn read_attachments(files: &[PathBuf]) -> Result<Vec<Attachment>> {
    files
        .iter()
        .map(|path| {
            Attachment::from_path(path).with_context(|| format!("Failed to read {}", path.display()))
        })
        .collect()
}

async fn send_message(service: &ChatService, message: &str, files: &[PathBuf]) -> Result<()> {
    let attachments = read_attachments(files)?;

    let exchange = report(service.send(message, attachments).await)?;

    println!("{}", render_plain(&render(&exchange.bot_message.content)));
    debug!(
        "Session {}: {}/{} messages used",
        exchange.session_id, exchange.user.messages_used, exchange.user.message_limit
    );
    Ok(())
}
