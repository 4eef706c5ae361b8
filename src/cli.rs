pub mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{CliArgs, CliCommands, SessionAction};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "expert-chat")]
#[command(about = "Terminal client for the expert chat webhooks")]
pub struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Clean and render a raw reply (reads stdin when FILE is omitted)
    Render { file: Option<PathBuf> },
    /// Print the language/code segments of a reply
    Segments { file: Option<PathBuf> },
    /// Saved conversations of the signed-in user
    Sessions {
        #[command(subcommand)]
        action: SessionsCommand,
    },
    /// Create an account
    Register {
        email: String,
        password: String,
        #[arg(long)]
        name: String,
        /// Professional category, Hebrew name or id (e.g. "programming")
        #[arg(long, default_value = "programming")]
        category: String,
    },
    /// Sign in with an existing account
    Login { email: String, password: String },
    /// Sign out, keeping saved conversations
    Logout,
    /// Show the signed-in user and their quota
    Account,
    /// Send a message to the chat webhook
    Send {
        message: String,
        /// Attach a file (repeatable)
        #[arg(long = "file", short = 'f')]
        files: Vec<PathBuf>,
    },
    /// Save the current conversation and start a new one
    New,
    /// Set a new password with the token from a reset email
    ResetPassword {
        email: String,
        token: String,
        password: String,
        /// Repeat the new password
        #[arg(long)]
        confirm: String,
    },
    /// Send a request to the support team
    Support {
        /// feedback, security, institution or business
        #[arg(long, default_value = "feedback")]
        topic: String,
        content: String,
        /// Attach a file (repeatable; images only on the free plan)
        #[arg(long = "file", short = 'f')]
        files: Vec<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum SessionsCommand {
    /// List saved conversations, newest first
    List,
    /// Print the messages of a conversation
    Show { session_id: String },
    /// Delete a conversation
    Delete { session_id: String },
}

impl From<Commands> for CliCommands {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Render { file } => CliCommands::Render { file },
            Commands::Segments { file } => CliCommands::Segments { file },
            Commands::Sessions { action } => CliCommands::Sessions {
                action: match action {
                    SessionsCommand::List => SessionAction::List,
                    SessionsCommand::Show { session_id } => SessionAction::Show { session_id },
                    SessionsCommand::Delete { session_id } => SessionAction::Delete { session_id },
                },
            },
            Commands::Register {
                email,
                password,
                name,
                category,
            } => CliCommands::Register {
                email,
                password,
                name,
                category,
            },
            Commands::Login { email, password } => CliCommands::Login { email, password },
            Commands::Logout => CliCommands::Logout,
            Commands::Account => CliCommands::Account,
            Commands::Send { message, files } => CliCommands::Send { message, files },
            Commands::New => CliCommands::New,
            Commands::ResetPassword {
                email,
                token,
                password,
                confirm,
            } => CliCommands::ResetPassword {
                email,
                token,
                password,
                confirm,
            },
            Commands::Support {
                topic,
                content,
                files,
            } => CliCommands::Support {
                topic,
                content,
                files,
            },
        }
    }
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    commands::run_cli(CliArgs {
        verbose: cli.verbose,
        command: cli.command.into(),
    })
    .await
}
