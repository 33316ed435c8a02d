//! helpdesk - a command line front-end for the help desk ticketing service.
//!
//! Sign in, look at the dashboard, and file or work tickets without leaving
//! the terminal. The session survives between runs and is refreshed
//! transparently when the server says it has expired.

mod commands;
mod format;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use helpdesk_core::models::{TicketPriority, TicketStatus, UserRole};
use helpdesk_core::{ApiClient, ApiError, Config};

use commands::App;

/// Set to write a log file into the cache directory as well as stderr
const LOG_FILE_ENV: &str = "HELPDESK_LOG_FILE";

#[derive(Parser)]
#[command(name = "helpdesk", version, about = "Help desk tickets from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in with email and password
    Login {
        #[arg(long)]
        email: Option<String>,
        /// Keep the password in the OS keychain
        #[arg(long)]
        remember: bool,
    },
    /// Create an account and sign in
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long, default_value = "end-user", value_parser = parse_role)]
        role: UserRole,
    },
    /// Sign out
    Logout {
        /// Also remove the remembered password
        #[arg(long)]
        forget: bool,
    },
    /// Show the signed-in account
    Whoami,
    /// Account summary, ticket counts and recent tickets
    Dashboard,
    /// Ticket counts by status
    Stats,
    /// List ticket categories
    Categories,
    /// Work with tickets
    #[command(subcommand)]
    Tickets(TicketCommand),
    /// Send a password reset email
    ForgotPassword {
        #[arg(long)]
        email: String,
    },
    /// Confirm an email address with the token from the verification email
    VerifyEmail {
        #[arg(long)]
        token: String,
    },
    /// Choose a new password with the token from the reset email
    ResetPassword {
        #[arg(long)]
        token: String,
    },
}

#[derive(Subcommand)]
enum TicketCommand {
    /// List tickets
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = helpdesk_core::models::DEFAULT_PAGE_SIZE)]
        page_size: u32,
        #[arg(long, value_parser = parse_status)]
        status: Option<TicketStatus>,
        #[arg(long, value_parser = parse_priority)]
        priority: Option<TicketPriority>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        assigned_to: Option<String>,
    },
    /// Show one ticket with its comments and attachments
    Show { id: String },
    /// File a new ticket
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
        #[arg(long, default_value = "medium", value_parser = parse_priority)]
        priority: TicketPriority,
        #[arg(long)]
        category: Option<String>,
        /// Due date, e.g. 2025-06-30
        #[arg(long)]
        due: Option<String>,
    },
    /// Change ticket fields
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, value_parser = parse_priority)]
        priority: Option<TicketPriority>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        due: Option<String>,
    },
    /// Move a ticket to a new status
    Status {
        id: String,
        #[arg(value_parser = parse_status)]
        status: TicketStatus,
    },
    /// Assign a ticket to an agent
    Assign { id: String, agent_id: String },
    /// Escalate a ticket
    Escalate {
        id: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        reason: String,
    },
    /// Delete a ticket
    Delete { id: String },
    /// List comments on a ticket
    Comments { id: String },
    /// Add a comment to a ticket
    Comment {
        id: String,
        content: String,
        /// Visible to support staff only
        #[arg(long)]
        internal: bool,
    },
    /// Replace the text of a comment
    EditComment {
        id: String,
        comment_id: String,
        content: String,
    },
    /// Delete a comment
    DeleteComment { id: String, comment_id: String },
    /// Upload a file to a ticket
    Attach { id: String, file: PathBuf },
    /// Remove an attachment
    Detach { id: String, attachment_id: String },
}

fn parse_status(s: &str) -> Result<TicketStatus, String> {
    TicketStatus::parse(s)
        .ok_or_else(|| format!("unknown status '{}' (open, in-progress, resolved, closed)", s))
}

fn parse_priority(s: &str) -> Result<TicketPriority, String> {
    TicketPriority::parse(s)
        .ok_or_else(|| format!("unknown priority '{}' (low, medium, high, critical)", s))
}

fn parse_role(s: &str) -> Result<UserRole, String> {
    UserRole::parse(s).ok_or_else(|| {
        format!(
            "unknown role '{}' (end-user, support-agent, administrator, manager)",
            s
        )
    })
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_dir: Option<PathBuf>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "helpdesk.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let config_result = Config::load();
    let config = config_result.as_ref().cloned().unwrap_or_default();

    let log_dir = std::env::var_os(LOG_FILE_ENV)
        .and_then(|_| config.cache_dir().ok());
    let _log_guard = init_tracing(log_dir);
    if let Err(ref e) = config_result {
        warn!(error = %e, "Failed to load config, using defaults");
    }
    info!(api = %config.api_uri, "helpdesk starting");

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<ApiError>() {
                Some(ApiError::SessionExpired(_)) => {
                    eprintln!("Your session has expired. Run `helpdesk login` to sign in again.");
                }
                Some(ApiError::Unauthorized) => {
                    eprintln!("Not authorized. Run `helpdesk login` to sign in.");
                }
                _ => eprintln!("Error: {:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: Config) -> Result<()> {
    let client = ApiClient::new(&config)?;
    let mut app = App::new(config, client);

    match command {
        Command::Login { email, remember } => app.login(email, remember).await,
        Command::Register {
            email,
            first_name,
            last_name,
            role,
        } => app.register(email, first_name, last_name, role).await,
        Command::Logout { forget } => app.logout(forget).await,
        Command::Whoami => app.whoami(),
        Command::Dashboard => app.dashboard().await,
        Command::Stats => app.stats().await,
        Command::Categories => app.categories().await,
        Command::ForgotPassword { email } => app.forgot_password(email).await,
        Command::VerifyEmail { token } => app.verify_email(token).await,
        Command::ResetPassword { token } => app.reset_password(token).await,
        Command::Tickets(command) => run_ticket_command(&app, command).await,
    }
}

async fn run_ticket_command(app: &App, command: TicketCommand) -> Result<()> {
    match command {
        TicketCommand::List {
            page,
            page_size,
            status,
            priority,
            category,
            assigned_to,
        } => {
            let query = helpdesk_core::models::TicketQuery {
                page,
                page_size,
                status,
                priority,
                category_id: category,
                assigned_to,
            };
            app.list_tickets(&query).await
        }
        TicketCommand::Show { id } => app.show_ticket(&id).await,
        TicketCommand::Create {
            title,
            description,
            priority,
            category,
            due,
        } => {
            let request = helpdesk_core::models::CreateTicketRequest {
                title,
                description,
                priority,
                category_id: category,
                due_date: due,
            };
            app.create_ticket(&request).await
        }
        TicketCommand::Update {
            id,
            title,
            description,
            priority,
            category,
            due,
        } => {
            let changes = helpdesk_core::models::UpdateTicketRequest {
                title,
                description,
                priority,
                category_id: category,
                due_date: due,
            };
            app.update_ticket(&id, &changes).await
        }
        TicketCommand::Status { id, status } => app.set_status(&id, status).await,
        TicketCommand::Assign { id, agent_id } => app.assign(&id, agent_id).await,
        TicketCommand::Escalate { id, to, reason } => app.escalate(&id, to, reason).await,
        TicketCommand::Delete { id } => app.delete_ticket(&id).await,
        TicketCommand::Comments { id } => app.comments(&id).await,
        TicketCommand::Comment {
            id,
            content,
            internal,
        } => app.add_comment(&id, content, internal).await,
        TicketCommand::EditComment {
            id,
            comment_id,
            content,
        } => app.edit_comment(&id, &comment_id, &content).await,
        TicketCommand::DeleteComment { id, comment_id } => {
            app.delete_comment(&id, &comment_id).await
        }
        TicketCommand::Attach { id, file } => app.attach(&id, &file).await,
        TicketCommand::Detach { id, attachment_id } => app.detach(&id, &attachment_id).await,
    }
}
