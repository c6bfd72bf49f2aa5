//! Classification and feedback command implementations

use std::path::Path;

use anyhow::{bail, Result};
use mailpilot_core::classify::{ClassifierClient, ClassifyBatchOptions};
use mailpilot_core::db::Database;
use mailpilot_core::models::Category;
use mailpilot_core::{ClassificationEngine, FeedbackLoop};

use super::open_db;

pub async fn cmd_classify(
    db_path: &Path,
    limit: i64,
    ids: Option<&str>,
    no_encrypt: bool,
) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;

    let client = match ClassifierClient::from_env() {
        Some(client) => client,
        None => {
            println!("❌ No classifier backend configured.");
            println!("   Set CLASSIFIER_BACKEND=http with CLASSIFIER_HOST and CLASSIFIER_MODEL,");
            println!("   or CLASSIFIER_BACKEND=mock for the deterministic keyword backend.");
            return Ok(());
        }
    };

    let engine = ClassificationEngine::new(db.clone(), client)?;
    println!("🤖 Classifier backend: {}", engine.backend_name());

    let ids: Vec<i64> = match ids {
        Some(raw) => {
            let mut parsed = Vec::new();
            for part in raw.split(',') {
                let part = part.trim();
                match part.parse::<i64>() {
                    Ok(id) => parsed.push(id),
                    Err(_) => bail!("Invalid email ID: {}", part),
                }
            }
            parsed
        }
        None => db.unclassified_email_ids(limit)?,
    };

    if ids.is_empty() {
        println!("✅ Nothing to classify.");
        return Ok(());
    }

    println!("   Classifying {} emails...", ids.len());
    let outcome = engine
        .classify_batch(&ids, &ClassifyBatchOptions::default())
        .await;

    println!();
    println!("📊 Classified: {}", outcome.classified);
    for err in &outcome.errors {
        println!("   ⚠️  {}", err);
    }
    if !outcome.remaining.is_empty() {
        println!(
            "   ⏳ {} left (time budget ran out). Run 'mailpilot classify' again.",
            outcome.remaining.len()
        );
    }

    Ok(())
}

pub fn cmd_correct(db: &Database, email_id: i64, category: &str) -> Result<()> {
    let category: Category = category
        .parse()
        .map_err(|_| anyhow::anyhow!("Unknown category: {}", category))?;

    let feedback = FeedbackLoop::new(db.clone());
    let outcome = feedback.record_correction(email_id, category)?;

    if outcome.recorded {
        println!(
            "✅ Corrected email {}: {} → {}",
            email_id,
            outcome.original.as_str(),
            outcome.corrected.as_str()
        );
        if outcome.corrected == Category::Spam {
            println!("   Sender blacklisted for future mail.");
        } else if outcome.original == Category::Spam {
            println!("   Sender whitelisted for future mail.");
        }
    } else {
        println!(
            "Email {} is already categorized as {}.",
            email_id,
            outcome.corrected.as_str()
        );
    }
    Ok(())
}

pub fn cmd_feedback(db: &Database, limit: i64) -> Result<()> {
    let feedback = FeedbackLoop::new(db.clone());
    let records = feedback.history(limit, 0)?;

    if records.is_empty() {
        println!("No corrections recorded yet.");
        return Ok(());
    }

    println!();
    println!("📝 Correction History");
    println!("   ─────────────────────────────────────────────────────────────");

    for record in records {
        println!(
            "   [{}] email {} from {}: {} → {} ({})",
            record.id,
            record.email_id,
            record.sender,
            record.original_category.as_str(),
            record.corrected_category.as_str(),
            record.created_at.format("%Y-%m-%d %H:%M"),
        );
    }

    println!();
    Ok(())
}

pub fn cmd_accuracy(db: &Database) -> Result<()> {
    let feedback = FeedbackLoop::new(db.clone());
    let report = feedback.accuracy_report()?;

    if report.is_empty() {
        println!("No classifications recorded yet.");
        return Ok(());
    }

    println!();
    println!("🎯 Classification Accuracy");
    println!("   ─────────────────────────────────────────────────────────────");

    for row in report {
        println!(
            "   {:14} {:>5.1}%  ({} classified, {} corrected)",
            row.category.as_str(),
            row.accuracy * 100.0,
            row.total,
            row.corrected,
        );
    }

    println!();
    Ok(())
}
