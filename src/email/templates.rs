//! HTML and plain-text bodies for ticket lifecycle emails.

use crate::core::shared::enums::TicketPriority;

#[derive(Debug, Clone, PartialEq)]
pub struct EmailContent {
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[derive(Debug, Clone)]
pub struct TicketEmailContext {
    pub ticket_id: i32,
    pub client_name: String,
    pub query: String,
    pub priority: TicketPriority,
    pub developer_name: Option<String>,
    /// Completion notes, pass reason or cancellation reason.
    pub notes: Option<String>,
}

fn priority_color(priority: TicketPriority) -> &'static str {
    match priority {
        TicketPriority::High | TicketPriority::Critical => "#dc2626",
        TicketPriority::Medium => "#f59e0b",
        TicketPriority::Low => "#10b981",
    }
}

fn layout(accent: &str, heading: &str, rows: &[(&str, String)], sections: &[(&str, &str)]) -> String {
    let rows_html: String = rows
        .iter()
        .map(|(label, value)| format!("<p><strong>{label}:</strong> {value}</p>"))
        .collect();
    let sections_html: String = sections
        .iter()
        .map(|(title, body)| {
            format!(
                r#"<div style="background:#fff;border:1px solid #e5e7eb;padding:15px;border-radius:8px;margin-top:16px;">
<h3 style="margin-top:0;color:#374151;">{title}</h3>
<p style="background:#f9fafb;padding:10px;border-left:4px solid {accent};margin:0;white-space:pre-wrap;">{}</p>
</div>"#,
                html_escape(body)
            )
        })
        .collect();

    format!(
        r#"<html>
<body style="font-family:Arial,sans-serif;line-height:1.6;color:#333;">
<div style="max-width:600px;margin:0 auto;padding:20px;">
<h2 style="color:{accent};border-bottom:2px solid #e5e7eb;padding-bottom:10px;">{heading}</h2>
<div style="background:#f8fafc;padding:15px;border-radius:8px;margin:20px 0;">{rows_html}</div>
{sections_html}
<p style="color:#6b7280;font-size:12px;margin-top:24px;">This is an automated message from the IT support desk.</p>
</div>
</body>
</html>"#
    )
}

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn developer(ctx: &TicketEmailContext) -> &str {
    ctx.developer_name.as_deref().unwrap_or("a developer")
}

pub fn ticket_created(ctx: &TicketEmailContext) -> EmailContent {
    let priority = format!(
        r#"<span style="color:{};">{}</span>"#,
        priority_color(ctx.priority),
        ctx.priority
    );
    EmailContent {
        subject: format!("Support Ticket #{} Created", ctx.ticket_id),
        text: format!(
            "Hello {},\n\nYour support ticket #{} has been created with {} priority.\n\nQuery:\n{}\n\nOur team will review it shortly.",
            ctx.client_name, ctx.ticket_id, ctx.priority, ctx.query
        ),
        html: layout(
            "#2563eb",
            "Support Ticket Created",
            &[
                ("Ticket ID", format!("#{}", ctx.ticket_id)),
                ("Client", html_escape(&ctx.client_name)),
                ("Priority", priority),
            ],
            &[("Your Query", ctx.query.as_str())],
        ),
    }
}

pub fn developer_assigned(ctx: &TicketEmailContext) -> EmailContent {
    let dev = developer(ctx);
    EmailContent {
        subject: format!("Developer Assigned to Ticket #{}", ctx.ticket_id),
        text: format!(
            "Hello {},\n\n{} has been assigned to your ticket #{} and is working on it.\n\nQuery:\n{}",
            ctx.client_name, dev, ctx.ticket_id, ctx.query
        ),
        html: layout(
            "#7c3aed",
            "Developer Assigned",
            &[
                ("Ticket ID", format!("#{}", ctx.ticket_id)),
                ("Assigned Developer", html_escape(dev)),
                ("Status", "IN_PROGRESS".to_string()),
            ],
            &[("Your Query", ctx.query.as_str())],
        ),
    }
}

pub fn ticket_completed(ctx: &TicketEmailContext) -> EmailContent {
    let dev = developer(ctx);
    let notes = ctx.notes.as_deref().unwrap_or("");
    EmailContent {
        subject: format!("Ticket #{} Resolved", ctx.ticket_id),
        text: format!(
            "Hello {},\n\nYour ticket #{} has been resolved by {}.\n\nResolution:\n{}",
            ctx.client_name, ctx.ticket_id, dev, notes
        ),
        html: layout(
            "#10b981",
            "Ticket Resolved",
            &[
                ("Ticket ID", format!("#{}", ctx.ticket_id)),
                ("Resolved By", html_escape(dev)),
            ],
            &[("Your Query", ctx.query.as_str()), ("Resolution", notes)],
        ),
    }
}

pub fn ticket_passed(ctx: &TicketEmailContext) -> EmailContent {
    let dev = developer(ctx);
    let reason = ctx.notes.as_deref().unwrap_or("");
    EmailContent {
        subject: format!("Ticket #{} Passed by Developer", ctx.ticket_id),
        text: format!(
            "Ticket #{} was passed back by {} and needs reassignment.\n\nReason:\n{}\n\nQuery:\n{}",
            ctx.ticket_id, dev, reason, ctx.query
        ),
        html: layout(
            "#f59e0b",
            "Ticket Passed Back",
            &[
                ("Ticket ID", format!("#{}", ctx.ticket_id)),
                ("Passed By", html_escape(dev)),
                ("Client", html_escape(&ctx.client_name)),
            ],
            &[("Reason", reason), ("Query", ctx.query.as_str())],
        ),
    }
}

pub fn ticket_cancelled(ctx: &TicketEmailContext) -> EmailContent {
    let reason = ctx.notes.as_deref().unwrap_or("");
    EmailContent {
        subject: format!("Ticket #{} Cancelled", ctx.ticket_id),
        text: format!(
            "Hello {},\n\nYour ticket #{} was cancelled.\n\nReason:\n{}",
            ctx.client_name, ctx.ticket_id, reason
        ),
        html: layout(
            "#dc2626",
            "Ticket Cancelled",
            &[("Ticket ID", format!("#{}", ctx.ticket_id))],
            &[("Reason", reason), ("Your Query", ctx.query.as_str())],
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> TicketEmailContext {
        TicketEmailContext {
            ticket_id: 42,
            client_name: "alice <ceo>".into(),
            query: "VPN <script>alert(1)</script> drops".into(),
            priority: TicketPriority::High,
            developer_name: Some("bob".into()),
            notes: Some("Replaced the cert & rebooted".into()),
        }
    }

    #[test]
    fn test_subjects() {
        let c = ctx();
        assert_eq!(ticket_created(&c).subject, "Support Ticket #42 Created");
        assert_eq!(developer_assigned(&c).subject, "Developer Assigned to Ticket #42");
        assert_eq!(ticket_completed(&c).subject, "Ticket #42 Resolved");
        assert_eq!(ticket_passed(&c).subject, "Ticket #42 Passed by Developer");
        assert_eq!(ticket_cancelled(&c).subject, "Ticket #42 Cancelled");
    }

    #[test]
    fn test_values_are_escaped_in_html() {
        let email = ticket_created(&ctx());
        assert!(!email.html.contains("<script>"));
        assert!(email.html.contains("&lt;script&gt;"));
        assert!(email.html.contains("alice &lt;ceo&gt;"));
        assert!(email.html.contains("#dc2626"));
        // plain text stays raw
        assert!(email.text.contains("<script>"));
    }

    #[test]
    fn test_completed_includes_notes() {
        let email = ticket_completed(&ctx());
        assert!(email.html.contains("Replaced the cert &amp; rebooted"));
        assert!(email.text.contains("resolved by bob"));
    }

    #[test]
    fn test_missing_developer_name() {
        let mut c = ctx();
        c.developer_name = None;
        assert!(developer_assigned(&c).text.contains("a developer has been assigned"));
    }
}
