//! Sender and domain reputation storage
//!
//! Counter updates are single-statement atomic upserts
//! (`INSERT .. ON CONFLICT .. DO UPDATE SET c = c + 1`), never
//! read-modify-write, so concurrent sync workers cannot lose increments.

use rusqlite::{params, Row};

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{ReputationCounters, ReputationEvent, ReputationRow, TrustOverride};

const REPUTATION_COLUMNS: &str = "id, user_id, key, received, opened, replied, archived, \
                                  deleted, spam_marked, confidence, trust_override, updated_at";

fn row_to_reputation(row: &Row) -> rusqlite::Result<ReputationRow> {
    let override_str: Option<String> = row.get(10)?;
    let updated_str: String = row.get(11)?;

    Ok(ReputationRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        key: row.get(2)?,
        counters: ReputationCounters {
            received: row.get(3)?,
            opened: row.get(4)?,
            replied: row.get(5)?,
            archived: row.get(6)?,
            deleted: row.get(7)?,
            spam_marked: row.get(8)?,
        },
        confidence: row.get(9)?,
        trust_override: override_str.and_then(|s| s.parse().ok()),
        updated_at: parse_datetime(&updated_str),
    })
}

// Counter column for an event. Kept separate from as_str() because these
// are interpolated into SQL and must stay inside the known column set.
fn event_column(event: ReputationEvent) -> &'static str {
    match event {
        ReputationEvent::Received => "received",
        ReputationEvent::Opened => "opened",
        ReputationEvent::Replied => "replied",
        ReputationEvent::Archived => "archived",
        ReputationEvent::Deleted => "deleted",
        ReputationEvent::SpamMarked => "spam_marked",
    }
}

impl Database {
    fn increment_event(
        &self,
        table: &str,
        user_id: &str,
        key: &str,
        event: ReputationEvent,
    ) -> Result<()> {
        let column = event_column(event);
        let conn = self.conn()?;

        conn.execute(
            &format!(
                r#"
                INSERT INTO {table} (user_id, key, {column})
                VALUES (?, ?, 1)
                ON CONFLICT(user_id, key) DO UPDATE SET
                    {column} = {column} + 1,
                    updated_at = CURRENT_TIMESTAMP
                "#,
                table = table,
                column = column,
            ),
            params![user_id, key.to_lowercase()],
        )?;
        Ok(())
    }

    fn get_reputation(&self, table: &str, user_id: &str, key: &str) -> Result<Option<ReputationRow>> {
        let conn = self.conn()?;

        let result = conn.query_row(
            &format!(
                "SELECT {} FROM {} WHERE user_id = ? AND key = ?",
                REPUTATION_COLUMNS, table
            ),
            params![user_id, key.to_lowercase()],
            row_to_reputation,
        );

        match result {
            Ok(row) => Ok(Some(row)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_override(
        &self,
        table: &str,
        user_id: &str,
        key: &str,
        value: Option<TrustOverride>,
    ) -> Result<()> {
        let conn = self.conn()?;

        conn.execute(
            &format!(
                r#"
                INSERT INTO {table} (user_id, key, trust_override)
                VALUES (?, ?, ?)
                ON CONFLICT(user_id, key) DO UPDATE SET
                    trust_override = excluded.trust_override,
                    updated_at = CURRENT_TIMESTAMP
                "#,
                table = table,
            ),
            params![user_id, key.to_lowercase(), value.map(|v| v.as_str())],
        )?;
        Ok(())
    }

    fn update_confidence(&self, table: &str, id: i64, confidence: f64) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            &format!(
                "UPDATE {} SET confidence = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
                table
            ),
            params![confidence, id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!(
                "Reputation row {} not found in {}",
                id, table
            )));
        }
        Ok(())
    }

    /// Id-ordered batch of rows after `after_id`, for interruptible rebuilds
    fn reputation_rows_after(
        &self,
        table: &str,
        user_id: &str,
        after_id: i64,
        limit: i64,
    ) -> Result<Vec<ReputationRow>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {} WHERE user_id = ? AND id > ? ORDER BY id LIMIT ?",
            REPUTATION_COLUMNS, table
        ))?;
        let rows = stmt.query_map(params![user_id, after_id, limit], row_to_reputation)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn increment_sender_event(
        &self,
        user_id: &str,
        sender: &str,
        event: ReputationEvent,
    ) -> Result<()> {
        self.increment_event("sender_reputation", user_id, sender, event)
    }

    pub fn increment_domain_event(
        &self,
        user_id: &str,
        domain: &str,
        event: ReputationEvent,
    ) -> Result<()> {
        self.increment_event("domain_reputation", user_id, domain, event)
    }

    pub fn get_sender_reputation(&self, user_id: &str, sender: &str) -> Result<Option<ReputationRow>> {
        self.get_reputation("sender_reputation", user_id, sender)
    }

    pub fn get_domain_reputation(&self, user_id: &str, domain: &str) -> Result<Option<ReputationRow>> {
        self.get_reputation("domain_reputation", user_id, domain)
    }

    pub fn set_sender_override(
        &self,
        user_id: &str,
        sender: &str,
        value: Option<TrustOverride>,
    ) -> Result<()> {
        self.set_override("sender_reputation", user_id, sender, value)
    }

    pub fn set_domain_override(
        &self,
        user_id: &str,
        domain: &str,
        value: Option<TrustOverride>,
    ) -> Result<()> {
        self.set_override("domain_reputation", user_id, domain, value)
    }

    pub fn update_sender_confidence(&self, id: i64, confidence: f64) -> Result<()> {
        self.update_confidence("sender_reputation", id, confidence)
    }

    pub fn update_domain_confidence(&self, id: i64, confidence: f64) -> Result<()> {
        self.update_confidence("domain_reputation", id, confidence)
    }

    pub fn sender_rows_after(
        &self,
        user_id: &str,
        after_id: i64,
        limit: i64,
    ) -> Result<Vec<ReputationRow>> {
        self.reputation_rows_after("sender_reputation", user_id, after_id, limit)
    }

    pub fn domain_rows_after(
        &self,
        user_id: &str,
        after_id: i64,
        limit: i64,
    ) -> Result<Vec<ReputationRow>> {
        self.reputation_rows_after("domain_reputation", user_id, after_id, limit)
    }

    /// Classified category histogram for a sender's mail (consistency input)
    pub fn sender_category_counts(&self, user_id: &str, sender: &str) -> Result<Vec<(String, i64)>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT e.category, COUNT(*)
            FROM emails e
            JOIN accounts a ON a.id = e.account_id
            WHERE a.user_id = ? AND e.from_address = ? AND e.category IS NOT NULL
            GROUP BY e.category
            "#,
        )?;
        let rows = stmt.query_map(params![user_id, sender.to_lowercase()], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?;

        let mut counts = Vec::new();
        for row in rows {
            counts.push(row?);
        }
        Ok(counts)
    }

    /// Classified category histogram across a whole domain
    pub fn domain_category_counts(&self, user_id: &str, domain: &str) -> Result<Vec<(String, i64)>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT e.category, COUNT(*)
            FROM emails e
            JOIN accounts a ON a.id = e.account_id
            WHERE a.user_id = ? AND e.from_address LIKE '%@' || ? AND e.category IS NOT NULL
            GROUP BY e.category
            "#,
        )?;
        let rows = stmt.query_map(params![user_id, domain.to_lowercase()], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?;

        let mut counts = Vec::new();
        for row in rows {
            counts.push(row?);
        }
        Ok(counts)
    }
}
