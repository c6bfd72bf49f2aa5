//! Email persistence, dedup, and classification writes

use rusqlite::{params, Row};

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{ClassificationResult, Direction, Email, NewEmail};

/// Result of attempting to insert a fetched message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailInsertResult {
    /// New row created
    Inserted(i64),
    /// Message already present for this (account, provider id) pair
    Duplicate,
}

const EMAIL_COLUMNS: &str = "id, account_id, provider_message_id, direction, from_name, \
     from_address, to_address, subject, snippet, body_text, body_html, body_fetched, \
     list_unsubscribe, precedence, received_at, priority, category, confidence, summary, \
     deadline, needs_reply, suggested_action, key_entities, classified_at, is_read, starred, \
     archived, deleted, created_at";

fn row_to_email(row: &Row) -> rusqlite::Result<Email> {
    let direction_str: String = row.get(3)?;
    let received_str: Option<String> = row.get(14)?;
    let category_str: Option<String> = row.get(16)?;
    let deadline_str: Option<String> = row.get(19)?;
    let action_str: Option<String> = row.get(21)?;
    let entities_json: Option<String> = row.get(22)?;
    let classified_str: Option<String> = row.get(23)?;
    let created_str: String = row.get(28)?;

    Ok(Email {
        id: row.get(0)?,
        account_id: row.get(1)?,
        provider_message_id: row.get(2)?,
        direction: direction_str.parse().unwrap_or(Direction::Inbound),
        from_name: row.get(4)?,
        from_address: row.get(5)?,
        to_address: row.get(6)?,
        subject: row.get(7)?,
        snippet: row.get(8)?,
        body_text: row.get(9)?,
        body_html: row.get(10)?,
        body_fetched: row.get(11)?,
        list_unsubscribe: row.get(12)?,
        precedence: row.get(13)?,
        received_at: received_str.map(|s| parse_datetime(&s)),
        priority: row.get(15)?,
        category: category_str.and_then(|s| s.parse().ok()),
        confidence: row.get(17)?,
        summary: row.get(18)?,
        deadline: deadline_str.map(|s| parse_datetime(&s)),
        needs_reply: row.get(20)?,
        suggested_action: action_str.and_then(|s| s.parse().ok()),
        key_entities: entities_json.and_then(|j| serde_json::from_str(&j).ok()),
        classified_at: classified_str.map(|s| parse_datetime(&s)),
        is_read: row.get(24)?,
        starred: row.get(25)?,
        archived: row.get(26)?,
        deleted: row.get(27)?,
        created_at: parse_datetime(&created_str),
    })
}

impl Database {
    /// Insert a fetched message, deduplicating on (account_id, provider_message_id)
    pub fn insert_email(&self, email: &NewEmail) -> Result<EmailInsertResult> {
        let conn = self.conn()?;
        let changed = Self::insert_email_on(&conn, email)?;
        if changed {
            Ok(EmailInsertResult::Inserted(conn.last_insert_rowid()))
        } else {
            Ok(EmailInsertResult::Duplicate)
        }
    }

    /// Insert a whole fetched batch in one transaction.
    ///
    /// Either every message lands or none do, so the caller can safely
    /// advance the sync cursor on success. Duplicates within the batch
    /// are skipped, not errors. Returns the number of new rows.
    pub fn insert_email_batch(&self, emails: &[NewEmail]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let mut inserted = 0;
        for email in emails {
            if Self::insert_email_on(&tx, email)? {
                inserted += 1;
            }
        }

        tx.commit()?;
        Ok(inserted)
    }

    fn insert_email_on(conn: &rusqlite::Connection, email: &NewEmail) -> Result<bool> {
        let changed = conn.execute(
            r#"
            INSERT INTO emails (
                account_id, provider_message_id, direction, from_name, from_address,
                to_address, subject, snippet, list_unsubscribe, precedence, received_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(account_id, provider_message_id) DO NOTHING
            "#,
            params![
                email.account_id,
                email.provider_message_id,
                email.direction.as_str(),
                email.from_name,
                email.from_address.to_lowercase(),
                email.to_address,
                email.subject,
                email.snippet,
                email.list_unsubscribe,
                email.precedence,
                email
                    .received_at
                    .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string()),
            ],
        )?;
        Ok(changed > 0)
    }

    /// Get an email by ID
    pub fn get_email(&self, id: i64) -> Result<Email> {
        let conn = self.conn()?;

        conn.query_row(
            &format!("SELECT {} FROM emails WHERE id = ?", EMAIL_COLUMNS),
            params![id],
            row_to_email,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                Error::NotFound(format!("Email {} not found", id))
            }
            other => other.into(),
        })
    }

    /// List emails, newest first, optionally scoped to one account
    pub fn list_emails(
        &self,
        account_id: Option<i64>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Email>> {
        let conn = self.conn()?;

        let mut emails = Vec::new();
        match account_id {
            Some(account) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM emails WHERE account_id = ? AND deleted = 0 \
                     ORDER BY received_at DESC, id DESC LIMIT ? OFFSET ?",
                    EMAIL_COLUMNS
                ))?;
                let rows = stmt.query_map(params![account, limit, offset], row_to_email)?;
                for row in rows {
                    emails.push(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM emails WHERE deleted = 0 \
                     ORDER BY received_at DESC, id DESC LIMIT ? OFFSET ?",
                    EMAIL_COLUMNS
                ))?;
                let rows = stmt.query_map(params![limit, offset], row_to_email)?;
                for row in rows {
                    emails.push(row?);
                }
            }
        }

        Ok(emails)
    }

    /// IDs of emails never classified, oldest first (batch classification queue)
    pub fn unclassified_email_ids(&self, limit: i64) -> Result<Vec<i64>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id FROM emails WHERE classified_at IS NULL AND deleted = 0 \
             ORDER BY id LIMIT ?",
        )?;
        let rows = stmt.query_map(params![limit], |row| row.get(0))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    /// Persist a lazily fetched body and flip the fetched flag
    pub fn set_email_body(
        &self,
        id: i64,
        text: Option<&str>,
        html: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE emails SET body_text = ?, body_html = ?, body_fetched = 1 WHERE id = ?",
            params![text, html, id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("Email {} not found", id)));
        }
        Ok(())
    }

    /// Persist a classification result. Overwrites any previous one, so
    /// re-classifying the same message is idempotent.
    pub fn write_classification(&self, id: i64, result: &ClassificationResult) -> Result<()> {
        let conn = self.conn()?;

        let entities_json = if result.key_entities.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&result.key_entities)?)
        };

        let updated = conn.execute(
            r#"
            UPDATE emails SET
                priority = ?, category = ?, confidence = ?, summary = ?,
                deadline = ?, needs_reply = ?, suggested_action = ?,
                key_entities = ?, classified_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
            params![
                result.priority,
                result.category.as_str(),
                result.confidence,
                result.summary,
                result
                    .deadline
                    .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string()),
                result.needs_reply,
                result.suggested_action.as_str(),
                entities_json,
                id,
            ],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("Email {} not found", id)));
        }
        Ok(())
    }

    /// Rewrite just the category after a user correction.
    /// Confidence becomes 1.0: the user said so.
    pub fn set_email_category(&self, id: i64, category: crate::models::Category) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE emails SET category = ?, confidence = 1.0 WHERE id = ?",
            params![category.as_str(), id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("Email {} not found", id)));
        }
        Ok(())
    }

    /// Update a mailbox flag (is_read, starred, archived, deleted)
    pub fn set_email_flag(&self, id: i64, flag: &str, value: bool) -> Result<()> {
        // Column name is interpolated, so restrict to the known flag set
        let column = match flag {
            "is_read" | "starred" | "archived" | "deleted" => flag,
            other => {
                return Err(Error::InvalidData(format!("Unknown email flag: {}", other)));
            }
        };

        let conn = self.conn()?;
        let updated = conn.execute(
            &format!("UPDATE emails SET {} = ? WHERE id = ?", column),
            params![value, id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("Email {} not found", id)));
        }
        Ok(())
    }

    /// Total stored emails (status/debug surface)
    pub fn count_emails(&self) -> Result<i64> {
        let conn = self.conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM emails", [], |row| row.get(0))?)
    }
}

#[cfg(test)]
mod tests {
    use super::EmailInsertResult;
    use crate::db::Database;
    use crate::models::{
        Category, ClassificationResult, Direction, KeyEntities, NewEmail, NewSourceAccount,
        Protocol, SuggestedAction,
    };

    fn setup() -> (Database, i64) {
        let db = Database::in_memory().unwrap();
        let account_id = db
            .create_account(&NewSourceAccount {
                user_id: "default".into(),
                address: "me@example.com".into(),
                protocol: Protocol::Rest,
                credentials: "blob".into(),
            })
            .unwrap();
        (db, account_id)
    }

    fn new_email(account_id: i64, provider_id: &str) -> NewEmail {
        NewEmail {
            account_id,
            provider_message_id: provider_id.into(),
            direction: Direction::Inbound,
            from_name: Some("Alice".into()),
            from_address: "alice@example.com".into(),
            to_address: Some("me@example.com".into()),
            subject: Some("Hello".into()),
            snippet: Some("Hello there".into()),
            list_unsubscribe: None,
            precedence: None,
            received_at: None,
        }
    }

    #[test]
    fn test_insert_dedupes_on_provider_id() {
        let (db, account_id) = setup();

        let first = db.insert_email(&new_email(account_id, "msg-1")).unwrap();
        assert!(matches!(first, EmailInsertResult::Inserted(_)));

        let second = db.insert_email(&new_email(account_id, "msg-1")).unwrap();
        assert_eq!(second, EmailInsertResult::Duplicate);

        assert_eq!(db.count_emails().unwrap(), 1);
    }

    #[test]
    fn test_same_provider_id_different_accounts() {
        let (db, account_id) = setup();
        let other = db
            .create_account(&NewSourceAccount {
                user_id: "default".into(),
                address: "work@example.com".into(),
                protocol: Protocol::Imap,
                credentials: "blob".into(),
            })
            .unwrap();

        db.insert_email(&new_email(account_id, "msg-1")).unwrap();
        let second = db.insert_email(&new_email(other, "msg-1")).unwrap();
        assert!(matches!(second, EmailInsertResult::Inserted(_)));
        assert_eq!(db.count_emails().unwrap(), 2);
    }

    #[test]
    fn test_batch_insert_skips_duplicates() {
        let (db, account_id) = setup();
        db.insert_email(&new_email(account_id, "msg-1")).unwrap();

        let batch = vec![
            new_email(account_id, "msg-1"),
            new_email(account_id, "msg-2"),
            new_email(account_id, "msg-3"),
        ];
        let inserted = db.insert_email_batch(&batch).unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(db.count_emails().unwrap(), 3);
    }

    #[test]
    fn test_classification_write_is_idempotent() {
        let (db, account_id) = setup();
        let id = match db.insert_email(&new_email(account_id, "msg-1")).unwrap() {
            EmailInsertResult::Inserted(id) => id,
            _ => panic!("expected insert"),
        };

        let result = ClassificationResult {
            category: Category::Work,
            priority: 2,
            confidence: 0.9,
            summary: "Project update".into(),
            needs_reply: true,
            deadline: None,
            suggested_action: SuggestedAction::Reply,
            key_entities: KeyEntities {
                people: vec!["Alice".into()],
                ..Default::default()
            },
        };

        db.write_classification(id, &result).unwrap();
        db.write_classification(id, &result).unwrap();

        let email = db.get_email(id).unwrap();
        assert_eq!(email.category, Some(Category::Work));
        assert_eq!(email.priority, Some(2));
        assert_eq!(email.needs_reply, Some(true));
        assert_eq!(email.suggested_action, Some(SuggestedAction::Reply));
        assert_eq!(
            email.key_entities.unwrap().people,
            vec!["Alice".to_string()]
        );
        assert!(email.classified_at.is_some());
    }

    #[test]
    fn test_unclassified_queue_drains() {
        let (db, account_id) = setup();
        let id = match db.insert_email(&new_email(account_id, "msg-1")).unwrap() {
            EmailInsertResult::Inserted(id) => id,
            _ => panic!("expected insert"),
        };
        db.insert_email(&new_email(account_id, "msg-2")).unwrap();

        assert_eq!(db.unclassified_email_ids(10).unwrap().len(), 2);

        db.write_classification(id, &ClassificationResult::fallback())
            .unwrap();
        assert_eq!(db.unclassified_email_ids(10).unwrap().len(), 1);
    }

    #[test]
    fn test_body_persists_permanently() {
        let (db, account_id) = setup();
        let id = match db.insert_email(&new_email(account_id, "msg-1")).unwrap() {
            EmailInsertResult::Inserted(id) => id,
            _ => panic!("expected insert"),
        };

        assert!(!db.get_email(id).unwrap().body_fetched);
        db.set_email_body(id, Some("plain body"), Some("<p>html</p>"))
            .unwrap();

        let email = db.get_email(id).unwrap();
        assert!(email.body_fetched);
        assert_eq!(email.body_text.as_deref(), Some("plain body"));
    }

    #[test]
    fn test_flag_updates_reject_unknown_columns() {
        let (db, account_id) = setup();
        let id = match db.insert_email(&new_email(account_id, "msg-1")).unwrap() {
            EmailInsertResult::Inserted(id) => id,
            _ => panic!("expected insert"),
        };

        db.set_email_flag(id, "is_read", true).unwrap();
        assert!(db.get_email(id).unwrap().is_read);
        assert!(db.set_email_flag(id, "category", true).is_err());
    }
}
