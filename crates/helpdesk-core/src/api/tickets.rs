//! Ticket, comment, category and attachment endpoints.

use serde::Serialize;

use crate::models::{
    AssignTicketRequest, Attachment, Category, Comment, CreateCommentRequest,
    CreateTicketRequest, EscalateTicketRequest, Ticket, TicketListResponse, TicketQuery,
    TicketStats, UpdateTicketRequest, UpdateTicketStatusRequest,
};

use super::client::API_PREFIX;
use super::{ApiClient, ApiError, ApiRequest, FilePart};

#[derive(Serialize)]
struct CommentContent<'a> {
    content: &'a str,
}

impl ApiClient {
    fn tickets_path(suffix: &str) -> String {
        format!("{}/tickets{}", API_PREFIX, suffix)
    }

    /// Fetch a page of tickets matching `query`
    pub async fn list_tickets(&self, query: &TicketQuery) -> Result<TicketListResponse, ApiError> {
        let request = ApiRequest::get(Self::tickets_path("")).with_query(query.to_query_pairs());
        self.fetch(request).await
    }

    pub async fn get_ticket(&self, id: &str) -> Result<Ticket, ApiError> {
        self.fetch(ApiRequest::get(Self::tickets_path(&format!("/{}", id))))
            .await
    }

    pub async fn create_ticket(&self, ticket: &CreateTicketRequest) -> Result<Ticket, ApiError> {
        self.fetch(ApiRequest::post(Self::tickets_path("")).with_json(ticket)?)
            .await
    }

    pub async fn update_ticket(&self, id: &str, changes: &UpdateTicketRequest) -> Result<Ticket, ApiError> {
        let request = ApiRequest::put(Self::tickets_path(&format!("/{}", id))).with_json(changes)?;
        self.fetch(request).await
    }

    pub async fn update_ticket_status(
        &self,
        id: &str,
        status: &UpdateTicketStatusRequest,
    ) -> Result<Ticket, ApiError> {
        let request =
            ApiRequest::patch(Self::tickets_path(&format!("/{}/status", id))).with_json(status)?;
        self.fetch(request).await
    }

    pub async fn assign_ticket(&self, id: &str, assignment: &AssignTicketRequest) -> Result<Ticket, ApiError> {
        let request =
            ApiRequest::patch(Self::tickets_path(&format!("/{}/assign", id))).with_json(assignment)?;
        self.fetch(request).await
    }

    pub async fn escalate_ticket(
        &self,
        id: &str,
        escalation: &EscalateTicketRequest,
    ) -> Result<Ticket, ApiError> {
        let request = ApiRequest::patch(Self::tickets_path(&format!("/{}/escalate", id)))
            .with_json(escalation)?;
        self.fetch(request).await
    }

    pub async fn delete_ticket(&self, id: &str) -> Result<(), ApiError> {
        self.send_discarding(ApiRequest::delete(Self::tickets_path(&format!("/{}", id))))
            .await
    }

    /// Counts by status for the dashboard
    pub async fn ticket_stats(&self) -> Result<TicketStats, ApiError> {
        self.fetch(ApiRequest::get(Self::tickets_path("/stats"))).await
    }

    pub async fn categories(&self) -> Result<Vec<Category>, ApiError> {
        self.fetch(ApiRequest::get(format!("{}/categories", API_PREFIX)))
            .await
    }

    // ===== Comments =====

    pub async fn ticket_comments(&self, ticket_id: &str) -> Result<Vec<Comment>, ApiError> {
        self.fetch(ApiRequest::get(Self::tickets_path(&format!("/{}/comments", ticket_id))))
            .await
    }

    pub async fn add_comment(&self, ticket_id: &str, comment: &CreateCommentRequest) -> Result<Comment, ApiError> {
        let request = ApiRequest::post(Self::tickets_path(&format!("/{}/comments", ticket_id)))
            .with_json(comment)?;
        self.fetch(request).await
    }

    pub async fn update_comment(
        &self,
        ticket_id: &str,
        comment_id: &str,
        content: &str,
    ) -> Result<Comment, ApiError> {
        let request = ApiRequest::put(Self::tickets_path(&format!(
            "/{}/comments/{}",
            ticket_id, comment_id
        )))
        .with_json(&CommentContent { content })?;
        self.fetch(request).await
    }

    pub async fn delete_comment(&self, ticket_id: &str, comment_id: &str) -> Result<(), ApiError> {
        self.send_discarding(ApiRequest::delete(Self::tickets_path(&format!(
            "/{}/comments/{}",
            ticket_id, comment_id
        ))))
        .await
    }

    // ===== Attachments =====

    pub async fn upload_attachment(&self, ticket_id: &str, file: FilePart) -> Result<Attachment, ApiError> {
        let request =
            ApiRequest::post(Self::tickets_path(&format!("/{}/attachments", ticket_id))).with_file(file);
        self.fetch(request).await
    }

    pub async fn delete_attachment(&self, ticket_id: &str, attachment_id: &str) -> Result<(), ApiError> {
        self.send_discarding(ApiRequest::delete(Self::tickets_path(&format!(
            "/{}/attachments/{}",
            ticket_id, attachment_id
        ))))
        .await
    }
}
