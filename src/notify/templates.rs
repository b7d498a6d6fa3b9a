use time::{macros::format_description, OffsetDateTime};

use super::{Notification, OutgoingEmail};
use crate::{auth::repo_types::Role, issues::repo_types::IssueStatus};

const SIGNATURE_TEXT: &str = "Best regards,\nThe Citizen Issue Tracker Team";
const SIGNATURE_HTML: &str = "<p>Best regards,<br>The Citizen Issue Tracker Team</p>";

pub(super) fn render(to: &str, notification: &Notification, base_url: &str) -> OutgoingEmail {
    let (subject, text, html) = match notification {
        Notification::Welcome { name, role } => welcome(name, *role, base_url),
        Notification::Login { name, at } => login(name, to, *at),
        Notification::IssueUpdate {
            name,
            issue_id,
            issue_title,
            status,
            message,
        } => {
            let link = format!("{base_url}/issue/{issue_id}");
            issue_update(name, issue_title, *status, message, &link)
        }
    };
    OutgoingEmail {
        to: to.to_string(),
        subject,
        text,
        html,
    }
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn page(title: &str, body: &str, footer: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{title}</title></head>\
         <body><div class=\"container\"><div class=\"header\"><h1>{title}</h1></div>\
         <div class=\"content\">{body}{SIGNATURE_HTML}</div>\
         <div class=\"footer\"><p>{footer}</p></div></div></body></html>"
    )
}

fn welcome(name: &str, role: Role, base_url: &str) -> (String, String, String) {
    let abilities: &[&str] = match role {
        Role::Citizen => &[
            "Report issues in your local area (potholes, garbage, streetlights, etc.)",
            "Track the progress of your reported issues",
            "Receive updates when issues are resolved",
            "View the status of all your submissions",
        ],
        Role::Admin => &[
            "View and manage all reported issues",
            "Update issue status and assign them to team members",
            "Add comments and progress updates",
            "Access analytics and reporting tools",
        ],
    };
    let as_who = match role {
        Role::Citizen => "As a citizen, you can:",
        Role::Admin => "As an administrator, you can:",
    };

    let subject = "Welcome to Citizen Issue Tracker!".to_string();
    let text = format!(
        "Welcome to Citizen Issue Tracker!\n\nHello {name}!\n\n\
         Welcome to the Citizen Issue Tracker platform! We're excited to have you join our community.\n\n\
         {as_who}\n{list}\n\n\
         Your account has been successfully created and you can now start using the platform.\n\n\
         Visit: {base_url}\n\n{SIGNATURE_TEXT}\n",
        list = abilities.iter().map(|a| format!("- {a}")).collect::<Vec<_>>().join("\n"),
    );
    let items: String = abilities.iter().map(|a| format!("<li>{a}</li>")).collect();
    let body = format!(
        "<h2>Hello {name}!</h2>\
         <p>Welcome to the Citizen Issue Tracker platform! We're excited to have you join our community.</p>\
         <p>{as_who}</p><ul>{items}</ul>\
         <p>Your account has been successfully created and you can now start using the platform.</p>\
         <a href=\"{base_url}\" class=\"button\">Get Started</a>",
        name = escape(name),
    );
    let html = page(
        "Welcome to Citizen Issue Tracker!",
        &body,
        "This email was sent from Citizen Issue Tracker. If you didn't create an account, please ignore this email.",
    );
    (subject, text, html)
}

fn login(name: &str, email: &str, at: OffsetDateTime) -> (String, String, String) {
    let when = format_login_time(at);
    let subject = "Login Notification - Citizen Issue Tracker".to_string();
    let text = format!(
        "Login Notification - Citizen Issue Tracker\n\nHello {name}!\n\n\
         We're notifying you that someone has logged into your Citizen Issue Tracker account.\n\n\
         Login Details:\n- Account: {email}\n- Time: {when}\n\n\
         If this was you, you can safely ignore this email.\n\n\
         If this wasn't you:\n\
         - Your account may have been compromised\n\
         - Please change your password immediately\n\
         - Contact our support team if you need assistance\n\n{SIGNATURE_TEXT}\n"
    );
    let body = format!(
        "<h2>Hello {name}!</h2>\
         <p>We're notifying you that someone has logged into your Citizen Issue Tracker account.</p>\
         <div class=\"alert\"><strong>Login Details:</strong><br>Account: {email}<br>Time: {when}</div>\
         <p>If this was you, you can safely ignore this email.</p>\
         <p><strong>If this wasn't you:</strong></p><ul>\
         <li>Your account may have been compromised</li>\
         <li>Please change your password immediately</li>\
         <li>Contact our support team if you need assistance</li></ul>",
        name = escape(name),
        email = escape(email),
    );
    let html = page(
        "Login Notification",
        &body,
        "This is an automated security notification. If you have concerns, please contact support.",
    );
    (subject, text, html)
}

fn format_login_time(at: OffsetDateTime) -> String {
    let fmt = format_description!("[year]-[month]-[day] [hour]:[minute]:[second] UTC");
    at.to_offset(time::UtcOffset::UTC)
        .format(fmt)
        .unwrap_or_else(|_| at.to_string())
}

fn status_label(status: IssueStatus) -> &'static str {
    match status {
        IssueStatus::Pending => "Pending",
        IssueStatus::InProgress => "In Progress",
        IssueStatus::Completed => "Completed",
        IssueStatus::Rejected => "Rejected",
    }
}

fn status_color(status: IssueStatus) -> &'static str {
    match status {
        IssueStatus::Pending => "#ffc107",
        IssueStatus::InProgress => "#17a2b8",
        IssueStatus::Completed => "#28a745",
        IssueStatus::Rejected => "#dc3545",
    }
}

fn issue_update(
    name: &str,
    title: &str,
    status: IssueStatus,
    message: &str,
    link: &str,
) -> (String, String, String) {
    let label = status_label(status);
    let closing = match status {
        IssueStatus::Completed => "Your issue has been resolved. Thank you for helping improve our community!",
        IssueStatus::Rejected => "This issue will not be pursued further. Reply to the issue if you think this was a mistake.",
        IssueStatus::Pending | IssueStatus::InProgress => {
            "Thank you for using Citizen Issue Tracker to help improve our community!"
        }
    };

    let subject = format!("Issue Update: {title}");
    let text = format!(
        "Issue Update: {title}\n\nHello {name}!\n\n\
         We have an update on your reported issue.\n\n\
         Issue: {title}\nStatus: {label}\nUpdate: {message}\n\n\
         You can view more details about this issue at: {link}\n\n\
         {closing}\n\n{SIGNATURE_TEXT}\n"
    );
    let body = format!(
        "<h2>Hello {name}!</h2><p>We have an update on your reported issue.</p>\
         <div class=\"issue-card\"><h3>{title}</h3>\
         <div class=\"status-badge\" style=\"background-color: {color}\">Status: {label}</div>\
         <p><strong>Update:</strong> {message}</p></div>\
         <a href=\"{link}\" class=\"button\">View Issue Details</a><p>{closing}</p>",
        name = escape(name),
        title = escape(title),
        message = escape(message),
        color = status_color(status),
    );
    let html = page(
        "Issue Update",
        &body,
        "This email was sent regarding your reported issue.",
    );
    (subject, text, html)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use uuid::Uuid;

    #[test]
    fn welcome_branches_on_role() {
        let citizen = render(
            "c@x.com",
            &Notification::Welcome { name: "Cee".into(), role: Role::Citizen },
            "http://app",
        );
        let admin = render(
            "a@x.com",
            &Notification::Welcome { name: "Ada".into(), role: Role::Admin },
            "http://app",
        );
        assert_eq!(citizen.subject, "Welcome to Citizen Issue Tracker!");
        assert!(citizen.text.contains("As a citizen"));
        assert!(admin.html.contains("As an administrator"));
        assert!(!admin.text.contains("As a citizen"));
    }

    #[test]
    fn login_time_is_utc_formatted() {
        let mail = render(
            "a@x.com",
            &Notification::Login {
                name: "A".into(),
                at: datetime!(2024-03-05 14:07:09 UTC),
            },
            "http://app",
        );
        assert_eq!(mail.subject, "Login Notification - Citizen Issue Tracker");
        assert!(mail.text.contains("2024-03-05 14:07:09 UTC"));
    }

    #[test]
    fn issue_update_escapes_user_content() {
        let mail = render(
            "a@x.com",
            &Notification::IssueUpdate {
                name: "A".into(),
                issue_id: Uuid::nil(),
                issue_title: "<b>Hole</b>".into(),
                status: IssueStatus::InProgress,
                message: "crew & truck".into(),
            },
            "http://app",
        );
        assert_eq!(mail.subject, "Issue Update: <b>Hole</b>");
        assert!(mail.html.contains("&lt;b&gt;Hole&lt;/b&gt;"));
        assert!(mail.html.contains("crew &amp; truck"));
        assert!(mail.text.contains("Status: In Progress"));
    }

    #[test]
    fn completed_and_rejected_close_differently() {
        let make = |status| {
            render(
                "a@x.com",
                &Notification::IssueUpdate {
                    name: "A".into(),
                    issue_id: Uuid::nil(),
                    issue_title: "Lamp".into(),
                    status,
                    message: "done".into(),
                },
                "http://app",
            )
        };
        assert!(make(IssueStatus::Completed).text.contains("has been resolved"));
        assert!(make(IssueStatus::Rejected).text.contains("will not be pursued"));
    }
}
