//! Append-only feedback log and accuracy queries

use rusqlite::{params, Row};
use std::collections::HashMap;

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::{Category, CategoryAccuracy, FeedbackRecord};

fn row_to_feedback(row: &Row) -> rusqlite::Result<FeedbackRecord> {
    let original_str: String = row.get(3)?;
    let corrected_str: String = row.get(4)?;
    let created_str: String = row.get(5)?;

    Ok(FeedbackRecord {
        id: row.get(0)?,
        email_id: row.get(1)?,
        sender: row.get(2)?,
        original_category: original_str.parse().unwrap_or(Category::Uncategorized),
        corrected_category: corrected_str.parse().unwrap_or(Category::Uncategorized),
        created_at: parse_datetime(&created_str),
    })
}

impl Database {
    /// Append one correction record. The log is never updated or deleted.
    pub fn append_feedback(
        &self,
        email_id: i64,
        sender: &str,
        original: Category,
        corrected: Category,
    ) -> Result<i64> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO feedback (email_id, sender, original_category, corrected_category)
            VALUES (?, ?, ?, ?)
            "#,
            params![
                email_id,
                sender.to_lowercase(),
                original.as_str(),
                corrected.as_str()
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// List feedback records, newest first
    pub fn list_feedback(&self, limit: i64, offset: i64) -> Result<Vec<FeedbackRecord>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, email_id, sender, original_category, corrected_category, created_at
             FROM feedback ORDER BY id DESC LIMIT ? OFFSET ?",
        )?;
        let rows = stmt.query_map(params![limit, offset], row_to_feedback)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Per-category accuracy, recomputed from the classified totals and the
    /// correction log on every call. A correction counts against the category
    /// the classifier originally produced.
    pub fn accuracy_by_category(&self) -> Result<Vec<CategoryAccuracy>> {
        let conn = self.conn()?;

        let mut totals: HashMap<String, i64> = HashMap::new();
        {
            let mut stmt = conn.prepare(
                "SELECT category, COUNT(*) FROM emails
                 WHERE classified_at IS NOT NULL AND category IS NOT NULL
                 GROUP BY category",
            )?;
            let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get(1)?)))?;
            for row in rows {
                let (category, count) = row?;
                totals.insert(category, count);
            }
        }

        let mut corrections: HashMap<String, i64> = HashMap::new();
        {
            let mut stmt = conn.prepare(
                "SELECT original_category, COUNT(*) FROM feedback GROUP BY original_category",
            )?;
            let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get(1)?)))?;
            for row in rows {
                let (category, count) = row?;
                corrections.insert(category, count);
            }
        }

        let mut report = Vec::new();
        for category in Category::all() {
            let name = category.as_str();
            let total = totals.get(name).copied().unwrap_or(0);
            if total == 0 && !corrections.contains_key(name) {
                continue;
            }
            // Corrected emails now carry their corrected category, so the
            // original bucket is the classified total plus its corrections.
            let corrected = corrections.get(name).copied().unwrap_or(0);
            let attempted = total + corrected;
            let accuracy = if attempted > 0 {
                (attempted - corrected) as f64 / attempted as f64
            } else {
                1.0
            };
            report.push(CategoryAccuracy {
                category: *category,
                total: attempted,
                corrected,
                accuracy,
            });
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::{Database, EmailInsertResult};
    use crate::models::{
        Category, ClassificationResult, Direction, NewEmail, NewSourceAccount, Protocol,
    };

    fn insert_classified(db: &Database, account_id: i64, pid: &str, category: Category) -> i64 {
        let id = match db
            .insert_email(&NewEmail {
                account_id,
                provider_message_id: pid.into(),
                direction: Direction::Inbound,
                from_name: None,
                from_address: "sender@example.com".into(),
                to_address: None,
                subject: Some("subject".into()),
                snippet: None,
                list_unsubscribe: None,
                precedence: None,
                received_at: None,
            })
            .unwrap()
        {
            EmailInsertResult::Inserted(id) => id,
            _ => panic!("expected insert"),
        };

        let mut result = ClassificationResult::fallback();
        result.category = category;
        result.confidence = 0.8;
        db.write_classification(id, &result).unwrap();
        id
    }

    fn setup() -> (Database, i64) {
        let db = Database::in_memory().unwrap();
        let account_id = db
            .create_account(&NewSourceAccount {
                user_id: "default".into(),
                address: "me@example.com".into(),
                protocol: Protocol::Imap,
                credentials: "blob".into(),
            })
            .unwrap();
        (db, account_id)
    }

    #[test]
    fn test_append_and_list() {
        let (db, account_id) = setup();
        let email_id = insert_classified(&db, account_id, "m1", Category::Spam);

        db.append_feedback(email_id, "Sender@Example.com", Category::Spam, Category::Work)
            .unwrap();

        let records = db.list_feedback(10, 0).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sender, "sender@example.com");
        assert_eq!(records[0].original_category, Category::Spam);
        assert_eq!(records[0].corrected_category, Category::Work);
    }

    #[test]
    fn test_accuracy_counts_corrections_against_original() {
        let (db, account_id) = setup();

        // Three classified as work, one of them corrected away
        for i in 0..3 {
            insert_classified(&db, account_id, &format!("w{}", i), Category::Work);
        }
        let corrected = insert_classified(&db, account_id, "w-bad", Category::Work);
        db.append_feedback(corrected, "sender@example.com", Category::Work, Category::Finance)
            .unwrap();
        db.set_email_category(corrected, Category::Finance).unwrap();

        let report = db.accuracy_by_category().unwrap();
        let work = report
            .iter()
            .find(|r| r.category == Category::Work)
            .unwrap();
        assert_eq!(work.total, 4);
        assert_eq!(work.corrected, 1);
        assert!((work.accuracy - 0.75).abs() < 1e-9);
    }
}
