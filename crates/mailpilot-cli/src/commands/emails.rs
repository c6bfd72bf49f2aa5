//! Email listing and detail command implementations

use anyhow::Result;
use mailpilot_core::db::Database;
use mailpilot_core::SyncCoordinator;

use super::{open_vault, truncate};

pub fn cmd_emails_list(
    db: &Database,
    account: Option<i64>,
    limit: i64,
    offset: i64,
) -> Result<()> {
    let emails = db.list_emails(account, limit, offset)?;

    if emails.is_empty() {
        println!("No emails found. Pull new mail with: mailpilot sync");
        return Ok(());
    }

    println!();
    println!("📨 Emails");
    println!("   ─────────────────────────────────────────────────────────────");

    for email in emails {
        let category = email
            .category
            .map(|c| c.as_str())
            .unwrap_or("unclassified");
        let marker = match email.priority {
            Some(1) | Some(2) => "🔴",
            _ if email.needs_reply == Some(true) => "↩️ ",
            _ => "  ",
        };
        println!(
            "   [{}] {} {:14} {:28} {}",
            email.id,
            marker,
            category,
            truncate(&email.from_address, 28),
            truncate(email.subject.as_deref().unwrap_or("(no subject)"), 50),
        );
    }

    println!();
    Ok(())
}

pub async fn cmd_emails_show(db: &Database, id: i64, body: bool) -> Result<()> {
    let email = db.get_email(id)?;

    println!();
    println!("📧 Email {}", email.id);
    println!("   ─────────────────────────────────────────────────────────────");
    if let Some(name) = &email.from_name {
        println!("   From: {} <{}>", name, email.from_address);
    } else {
        println!("   From: {}", email.from_address);
    }
    if let Some(to) = &email.to_address {
        println!("   To: {}", to);
    }
    println!(
        "   Subject: {}",
        email.subject.as_deref().unwrap_or("(no subject)")
    );
    if let Some(received) = email.received_at {
        println!("   Received: {}", received.format("%Y-%m-%d %H:%M"));
    }

    match email.category {
        Some(category) => {
            println!();
            println!("   Category: {}", category.as_str());
            if let Some(priority) = email.priority {
                println!("   Priority: {} (1 = most urgent)", priority);
            }
            if let Some(confidence) = email.confidence {
                println!("   Confidence: {:.2}", confidence);
            }
            if let Some(summary) = &email.summary {
                println!("   Summary: {}", summary);
            }
            if email.needs_reply == Some(true) {
                println!("   ↩️  Needs a reply");
            }
            if let Some(deadline) = email.deadline {
                println!("   ⏰ Deadline: {}", deadline.format("%Y-%m-%d %H:%M"));
            }
            if let Some(action) = email.suggested_action {
                println!("   Suggested: {}", action.as_str());
            }
        }
        None => {
            println!();
            println!("   Category: unclassified (run 'mailpilot classify')");
        }
    }

    if body {
        // Served from storage when already fetched, otherwise pulled from
        // the provider and persisted.
        let vault = open_vault()?;
        let coordinator = SyncCoordinator::new(db.clone(), vault);
        let fetched = coordinator.fetch_body(id).await?;
        println!();
        match fetched.text.or(fetched.html) {
            Some(content) => println!("{}", content),
            None => println!("   (empty body)"),
        }
    } else if let Some(snippet) = &email.snippet {
        println!();
        println!("   {}", truncate(snippet, 200));
    }

    println!();
    Ok(())
}
