//! Subcommand handlers. Each one talks to the service through `ApiClient`
//! and prints a plain-text result.

use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{debug, warn};

use helpdesk_core::api::FilePart;
use helpdesk_core::auth::{authorize, Keychain, Navigation, Route};
use helpdesk_core::models::{
    AssignTicketRequest, CreateCommentRequest, CreateTicketRequest, EscalateTicketRequest,
    ForgotPasswordRequest, LoginRequest, RegisterRequest, ResetPasswordRequest, SuccessResponse,
    TicketQuery, TicketStatus, UpdateTicketRequest, UpdateTicketStatusRequest, UserRole,
    VerifyEmailRequest,
};
use helpdesk_core::{ApiClient, Config};

use crate::format::{
    format_date, format_size, or_dash, stats_lines, ticket_header, ticket_row, truncate,
};

/// Tickets shown on the dashboard
const RECENT_TICKETS: u32 = 5;

pub struct App {
    config: Config,
    client: ApiClient,
}

impl App {
    pub fn new(config: Config, client: ApiClient) -> Self {
        Self { config, client }
    }

    /// Refuse to continue unless `route` may be entered.
    fn require(&self, route: Route) -> Result<()> {
        match authorize(route, self.client.session()) {
            Navigation::Allow => Ok(()),
            Navigation::Redirect(Route::Login) => {
                bail!("You are not signed in. Run `helpdesk login` first.")
            }
            Navigation::Redirect(other) => bail!("Not available here, go to {}", other.path()),
        }
    }

    fn remember_email(&mut self, email: &str) {
        if self.config.last_email.as_deref() == Some(email) {
            return;
        }
        self.config.last_email = Some(email.to_string());
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }
    }

    // ===== Account =====

    pub async fn login(&mut self, email: Option<String>, remember: bool) -> Result<()> {
        let email = match email.or_else(|| self.config.last_email.clone()) {
            Some(email) => email,
            None => prompt_line("Email: ")?,
        };

        let stored = Keychain::remembered(&email).unwrap_or_else(|e| {
            warn!(error = %e, "Keychain unavailable");
            None
        });
        let from_keychain = stored.is_some();
        let password = match stored {
            Some(password) => {
                debug!("Using remembered password");
                password
            }
            None => rpassword::prompt_password("Password: ").context("Failed to read password")?,
        };

        let credentials = LoginRequest {
            email: email.clone(),
            password,
        };
        let user = match self.client.login(&credentials).await {
            Ok(user) => user,
            Err(e) if from_keychain && e.is_unauthorized() => {
                warn!("Remembered password was rejected, forgetting it");
                if let Err(e) = Keychain::forget(&email) {
                    warn!(error = %e, "Failed to remove remembered password");
                }
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };

        if remember && !from_keychain {
            if let Err(e) = Keychain::remember(&email, &credentials.password) {
                warn!(error = %e, "Failed to remember password");
            }
        }
        self.remember_email(&email);

        println!("Signed in as {} ({})", user.display_name(), user.role.display_name());
        Ok(())
    }

    pub async fn register(
        &mut self,
        email: String,
        first_name: String,
        last_name: String,
        role: UserRole,
    ) -> Result<()> {
        let password = prompt_new_password()?;
        let details = RegisterRequest {
            email: email.clone(),
            first_name,
            last_name,
            password,
            role,
        };
        let user = self.client.register(&details).await?;
        self.remember_email(&email);

        println!("Welcome, {}! Your account has been created.", user.display_name());
        if !user.is_verified {
            println!("Check {} for a verification email.", user.email);
        }
        Ok(())
    }

    pub async fn logout(&self, forget: bool) -> Result<()> {
        let email = self.client.current_user().map(|u| u.email);
        let result = self.client.logout().await;

        if forget {
            if let Some(email) = email.as_deref().or(self.config.last_email.as_deref()) {
                match Keychain::forget(email) {
                    Ok(true) => println!("Forgot the remembered password for {}.", email),
                    Ok(false) => debug!("No remembered password to remove"),
                    Err(e) => warn!(error = %e, "Failed to remove remembered password"),
                }
            }
        }

        match result {
            Ok(_) => println!("Signed out."),
            Err(e) => {
                warn!(error = %e, "Server sign-out failed");
                println!("Signed out locally; the server could not be reached.");
            }
        }
        Ok(())
    }

    pub fn whoami(&self) -> Result<()> {
        let Some(session) = self.client.session().current() else {
            println!("Not signed in.");
            return Ok(());
        };
        let user = &session.user;
        println!("{} <{}>", user.display_name(), user.email);
        println!("Role:      {}", user.role.display_name());
        println!("Verified:  {}", if user.is_verified { "yes" } else { "no" });
        println!("Active:    {}", if session.is_active() { "yes" } else { "no" });
        println!("Signed in: {}", session.established_at.format("%b %d, %Y %H:%M UTC"));
        Ok(())
    }

    pub async fn forgot_password(&self, email: String) -> Result<()> {
        let response = self
            .client
            .forgot_password(&ForgotPasswordRequest { email })
            .await?;
        report(&response, "If the account exists, a reset email is on its way.")
    }

    pub async fn verify_email(&self, token: String) -> Result<()> {
        let response = self.client.verify_email(&VerifyEmailRequest { token }).await?;
        report(&response, "Email verified.")
    }

    pub async fn reset_password(&self, token: String) -> Result<()> {
        let password = prompt_new_password()?;
        let response = self
            .client
            .reset_password(&ResetPasswordRequest { token, password })
            .await?;
        report(&response, "Password changed. Sign in with the new password.")
    }

    // ===== Dashboard =====

    pub async fn dashboard(&self) -> Result<()> {
        self.require(Route::Dashboard)?;

        let recent = TicketQuery {
            page_size: RECENT_TICKETS,
            ..TicketQuery::default()
        };
        let (stats, tickets) = futures::try_join!(
            self.client.ticket_stats(),
            self.client.list_tickets(&recent)
        )?;

        if let Some(user) = self.client.current_user() {
            println!("{} ({})", user.display_name(), user.role.display_name());
            println!(
                "Last login: {}",
                user.last_login_at.as_deref().map(format_date).as_deref().unwrap_or("-")
            );
            println!();
        }

        for line in stats_lines(&stats) {
            println!("{}", line);
        }
        println!();

        if tickets.tickets.is_empty() {
            println!("No tickets yet.");
        } else {
            println!("{}", ticket_header());
            for ticket in &tickets.tickets {
                println!("{}", ticket_row(ticket));
            }
        }
        Ok(())
    }

    pub async fn stats(&self) -> Result<()> {
        self.require(Route::Dashboard)?;
        let stats = self.client.ticket_stats().await?;
        for line in stats_lines(&stats) {
            println!("{}", line);
        }
        Ok(())
    }

    pub async fn categories(&self) -> Result<()> {
        let categories = self.client.categories().await?;
        for category in categories.iter().filter(|c| c.is_active) {
            println!("{:<12} {}", truncate(&category.id, 12), category.name);
            for child in category.children.iter().filter(|c| c.is_active) {
                println!("{:<12}   {}", truncate(&child.id, 12), child.name);
            }
        }
        Ok(())
    }

    // ===== Tickets =====

    pub async fn list_tickets(&self, query: &TicketQuery) -> Result<()> {
        self.require(Route::Dashboard)?;
        let list = self.client.list_tickets(query).await?;

        if list.tickets.is_empty() {
            println!("No tickets found.");
            return Ok(());
        }
        println!("{}", ticket_header());
        for ticket in &list.tickets {
            println!("{}", ticket_row(ticket));
        }
        println!(
            "\nPage {} of {} ({} tickets)",
            list.page,
            list.total_pages.max(1),
            list.total
        );
        Ok(())
    }

    pub async fn show_ticket(&self, id: &str) -> Result<()> {
        self.require(Route::Dashboard)?;
        let ticket = self.client.get_ticket(id).await?;

        println!("{}  {}", ticket.id, ticket.title);
        println!(
            "Status: {}   Priority: {}",
            ticket.status.display_name(),
            ticket.priority.as_str()
        );
        let category = ticket.category.as_ref().map(|c| c.name.as_str());
        println!("Category: {}", or_dash(category));
        let assignee = ticket.assignee_name();
        println!("Assignee: {}", or_dash(assignee.as_deref()));
        println!("Opened:   {}", format_date(&ticket.creation_time));
        if let Some(due) = ticket.due_date.as_deref() {
            println!("Due:      {}", format_date(due));
        }
        if let Some(when) = ticket.escalated_at.as_deref() {
            println!(
                "Escalated {} to {}",
                format_date(when),
                or_dash(ticket.escalated_to.as_deref())
            );
        }
        println!("\n{}", ticket.description);

        if !ticket.attachments.is_empty() {
            println!("\nAttachments:");
            for attachment in &ticket.attachments {
                println!(
                    "  {}  {} ({})",
                    attachment.id,
                    attachment.filename,
                    format_size(attachment.file_size)
                );
            }
        }

        let comments = if ticket.comments.is_empty() {
            self.client.ticket_comments(id).await?
        } else {
            ticket.comments
        };
        if !comments.is_empty() {
            println!("\nComments:");
            for comment in &comments {
                let marker = if comment.is_internal { " [internal]" } else { "" };
                println!(
                    "  {} on {}{}:",
                    comment.author(),
                    format_date(&comment.created_at),
                    marker
                );
                println!("    {}", comment.content);
            }
        }
        Ok(())
    }

    pub async fn create_ticket(&self, request: &CreateTicketRequest) -> Result<()> {
        self.require(Route::CreateTicket)?;
        let ticket = self.client.create_ticket(request).await?;
        println!("Created ticket {}", ticket.id);
        Ok(())
    }

    pub async fn update_ticket(&self, id: &str, changes: &UpdateTicketRequest) -> Result<()> {
        self.require(Route::Dashboard)?;
        let ticket = self.client.update_ticket(id, changes).await?;
        println!("Updated ticket {}", ticket.id);
        Ok(())
    }

    pub async fn set_status(&self, id: &str, status: TicketStatus) -> Result<()> {
        self.require(Route::Dashboard)?;
        let ticket = self
            .client
            .update_ticket_status(id, &UpdateTicketStatusRequest { status })
            .await?;
        println!("Ticket {} is now {}", ticket.id, ticket.status.display_name());
        Ok(())
    }

    pub async fn assign(&self, id: &str, agent_id: String) -> Result<()> {
        self.require(Route::Dashboard)?;
        if !self.client.is_support_agent() {
            bail!("Only support staff can assign tickets");
        }
        let ticket = self
            .client
            .assign_ticket(id, &AssignTicketRequest { agent_id })
            .await?;
        let assignee = ticket.assignee_name();
        println!("Ticket {} assigned to {}", ticket.id, or_dash(assignee.as_deref()));
        Ok(())
    }

    pub async fn escalate(&self, id: &str, escalated_to: String, reason: String) -> Result<()> {
        self.require(Route::Dashboard)?;
        let ticket = self
            .client
            .escalate_ticket(id, &EscalateTicketRequest { escalated_to, reason })
            .await?;
        println!(
            "Ticket {} escalated to {}",
            ticket.id,
            or_dash(ticket.escalated_to.as_deref())
        );
        Ok(())
    }

    pub async fn delete_ticket(&self, id: &str) -> Result<()> {
        self.require(Route::Dashboard)?;
        self.client.delete_ticket(id).await?;
        println!("Deleted ticket {}", id);
        Ok(())
    }

    pub async fn comments(&self, id: &str) -> Result<()> {
        self.require(Route::Dashboard)?;
        let comments = self.client.ticket_comments(id).await?;
        if comments.is_empty() {
            println!("No comments.");
        }
        for comment in &comments {
            println!(
                "{}  {} on {}: {}",
                comment.id,
                comment.author(),
                format_date(&comment.created_at),
                comment.content
            );
        }
        Ok(())
    }

    pub async fn add_comment(&self, id: &str, content: String, internal: bool) -> Result<()> {
        self.require(Route::Dashboard)?;
        if internal && !self.client.is_support_agent() {
            bail!("Only support staff can post internal comments");
        }
        let request = CreateCommentRequest {
            content,
            is_internal: internal.then_some(true),
        };
        let comment = self.client.add_comment(id, &request).await?;
        println!("Added comment {}", comment.id);
        Ok(())
    }

    pub async fn edit_comment(&self, id: &str, comment_id: &str, content: &str) -> Result<()> {
        self.require(Route::Dashboard)?;
        let comment = self.client.update_comment(id, comment_id, content).await?;
        println!("Updated comment {}", comment.id);
        Ok(())
    }

    pub async fn delete_comment(&self, id: &str, comment_id: &str) -> Result<()> {
        self.require(Route::Dashboard)?;
        self.client.delete_comment(id, comment_id).await?;
        println!("Deleted comment {}", comment_id);
        Ok(())
    }

    pub async fn attach(&self, id: &str, path: &Path) -> Result<()> {
        self.require(Route::Dashboard)?;
        let file = FilePart::from_path(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let attachment = self.client.upload_attachment(id, file).await?;
        println!(
            "Attached {} ({}) as {}",
            attachment.filename,
            format_size(attachment.file_size),
            attachment.id
        );
        Ok(())
    }

    pub async fn detach(&self, id: &str, attachment_id: &str) -> Result<()> {
        self.require(Route::Dashboard)?;
        self.client.delete_attachment(id, attachment_id).await?;
        println!("Removed attachment {}", attachment_id);
        Ok(())
    }
}

/// Print the server's message, or `fallback` when it sent none.
fn report(response: &SuccessResponse, fallback: &str) -> Result<()> {
    if response.is_error() {
        bail!("{}", or_dash(Some(response.message.as_str())));
    }
    if response.message.is_empty() {
        println!("{}", fallback);
    } else {
        println!("{}", response.message);
    }
    Ok(())
}

fn prompt_line(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let line = line.trim().to_string();
    if line.is_empty() {
        bail!("No input given");
    }
    Ok(line)
}

fn prompt_new_password() -> Result<String> {
    let password = rpassword::prompt_password("New password: ").context("Failed to read password")?;
    if password.len() < 8 {
        bail!("Password must be at least 8 characters");
    }
    let confirm = rpassword::prompt_password("Confirm password: ").context("Failed to read password")?;
    if password != confirm {
        bail!("Passwords do not match");
    }
    Ok(password)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_app() -> App {
        let config = Config {
            api_uri: "http://127.0.0.1:9".to_string(),
            ..Config::default()
        };
        let guard = helpdesk_core::SessionGuard::new(
            std::sync::Arc::new(
                helpdesk_core::api::HttpTransport::new(&config.api_uri, config.request_timeout())
                    .unwrap(),
            ),
            std::sync::Arc::new(helpdesk_core::SessionStore::in_memory()),
            config.refresh_timeout(),
        );
        App::new(config, ApiClient::with_guard(guard))
    }

    #[test]
    fn test_require_redirects_without_session() {
        let app = offline_app();
        let err = app.require(Route::Dashboard).unwrap_err();
        assert!(err.to_string().contains("helpdesk login"));
        assert!(app.require(Route::CreateTicket).is_err());
        assert!(app.require(Route::Home).is_ok());
    }

    #[tokio::test]
    async fn test_guarded_commands_fail_before_any_request() {
        let app = offline_app();
        assert!(app.dashboard().await.is_err());
        assert!(app.list_tickets(&TicketQuery::default()).await.is_err());
    }

    #[test]
    fn test_report_surfaces_error_envelope() {
        let ok = SuccessResponse {
            status: "success".to_string(),
            message: String::new(),
            access_token: None,
        };
        assert!(report(&ok, "done").is_ok());

        let failed = SuccessResponse {
            status: "error".to_string(),
            message: "Token expired".to_string(),
            access_token: None,
        };
        assert_eq!(report(&failed, "done").unwrap_err().to_string(), "Token expired");
    }
}
