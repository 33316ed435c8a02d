//! Plain-text rendering helpers for terminal output.

use helpdesk_core::models::{Ticket, TicketStats};

/// Shorten `s` to at most `max_len` characters, ending in "..." when cut
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    }
}

pub fn or_dash(value: Option<&str>) -> &str {
    value.filter(|v| !v.is_empty()).unwrap_or("-")
}

/// Render an RFC 3339 timestamp as "Mar 01, 2025"
pub fn format_date(date: &str) -> String {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(date) {
        dt.format("%b %d, %Y").to_string()
    } else if date.len() >= 10 && date.is_char_boundary(10) {
        date[..10].to_string()
    } else if date.is_empty() {
        "-".to_string()
    } else {
        date.to_string()
    }
}

pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{} B", bytes)
    } else if b < KB * KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{:.1} MB", b / (KB * KB))
    }
}

pub fn ticket_header() -> String {
    format!(
        "{:<12} {:<40} {:<12} {:<9} {:<20} {}",
        "ID", "TITLE", "STATUS", "PRIORITY", "ASSIGNEE", "OPENED"
    )
}

/// One line of the ticket table. Escalated tickets are flagged with "!".
pub fn ticket_row(ticket: &Ticket) -> String {
    let flag = if ticket.is_escalated() { "!" } else { " " };
    let assignee = ticket.assignee_name();
    format!(
        "{:<12} {:<40} {:<12} {:<9} {:<20} {}{}",
        truncate(&ticket.id, 12),
        truncate(&ticket.title, 40),
        ticket.status.display_name(),
        ticket.priority.as_str(),
        truncate(or_dash(assignee.as_deref()), 20),
        format_date(&ticket.creation_time),
        flag,
    )
}

pub fn stats_lines(stats: &TicketStats) -> Vec<String> {
    vec![
        format!("Total        {:>6}", stats.total_tickets),
        format!("Open         {:>6}", stats.open_tickets),
        format!("In progress  {:>6}", stats.in_progress_tickets),
        format!("Resolved     {:>6}", stats.resolved_tickets),
        format!("Closed       {:>6}", stats.closed_tickets),
        format!("Escalated    {:>6}", stats.escalated_tickets),
        format!("Overdue      {:>6}", stats.overdue_tickets),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("Hello", 10), "Hello");
        assert_eq!(truncate("Hello World", 8), "Hello...");
        assert_eq!(truncate("Hi", 2), "Hi");
        assert_eq!(truncate("Ünïcödé text", 6), "Ünï...");
    }

    #[test]
    fn test_format_date() {
        assert_eq!(format_date("2025-03-01T10:00:00Z"), "Mar 01, 2025");
        assert_eq!(format_date("2025-03-01 10:00"), "2025-03-01");
        assert_eq!(format_date(""), "-");
        assert_eq!(format_date("soon"), "soon");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_or_dash() {
        assert_eq!(or_dash(None), "-");
        assert_eq!(or_dash(Some("")), "-");
        assert_eq!(or_dash(Some("Sam")), "Sam");
    }

    #[test]
    fn test_ticket_row_flags_escalation() {
        let ticket: Ticket = serde_json::from_value(serde_json::json!({
            "id": "t-1",
            "title": "VPN down",
            "description": "",
            "status": "IN_PROGRESS",
            "priority": "HIGH",
            "category_id": "c-1",
            "created_by_id": "u-1",
            "creation_time": "2025-03-01T10:00:00Z",
            "escalated_at": "2025-03-02T10:00:00Z"
        }))
        .unwrap();
        let row = ticket_row(&ticket);
        assert!(row.starts_with("t-1"));
        assert!(row.contains("HIGH"));
        assert!(row.ends_with("Mar 01, 2025!"));
    }
}
