//! Data models for help desk entities.
//!
//! - `User`, `UserRole` and the auth request/response bodies
//! - `Ticket` with its `Comment`s, `Attachment`s and `Category`
//! - Request bodies and list/stat responses for the ticket endpoints

pub mod ticket;
pub mod user;

pub use ticket::{
    AssignTicketRequest, Attachment, Category, Comment, CreateCommentRequest,
    CreateTicketRequest, EscalateTicketRequest, Ticket, TicketListResponse, TicketPriority,
    TicketQuery, TicketStats, TicketStatus, UpdateTicketRequest, UpdateTicketStatusRequest,
    DEFAULT_PAGE_SIZE,
};
pub use user::{
    AuthResponse, ForgotPasswordRequest, LoginRequest, RegisterRequest, ResetPasswordRequest,
    SuccessResponse, User, UserRole, VerifyEmailRequest,
};
