//! Source account operations

use rusqlite::{params, Row};

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{NewSourceAccount, Protocol, SourceAccount};

fn row_to_account(row: &Row) -> rusqlite::Result<SourceAccount> {
    let protocol_str: String = row.get(3)?;
    let last_synced_str: Option<String> = row.get(7)?;
    let created_str: String = row.get(9)?;

    Ok(SourceAccount {
        id: row.get(0)?,
        user_id: row.get(1)?,
        address: row.get(2)?,
        protocol: protocol_str.parse().unwrap_or(Protocol::Imap),
        credentials: row.get(4)?,
        active: row.get(5)?,
        last_error: row.get(6)?,
        last_synced_at: last_synced_str.map(|s| parse_datetime(&s)),
        cursor: row.get(8)?,
        created_at: parse_datetime(&created_str),
    })
}

const ACCOUNT_COLUMNS: &str = "id, user_id, address, protocol, credentials, active, \
                               last_error, last_synced_at, cursor, created_at";

impl Database {
    /// Link a new source account. The credential blob must already be encrypted.
    pub fn create_account(&self, account: &NewSourceAccount) -> Result<i64> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO accounts (user_id, address, protocol, credentials)
            VALUES (?, ?, ?, ?)
            "#,
            params![
                account.user_id,
                account.address.to_lowercase(),
                account.protocol.as_str(),
                account.credentials,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Get an account by ID
    pub fn get_account(&self, id: i64) -> Result<SourceAccount> {
        let conn = self.conn()?;

        conn.query_row(
            &format!("SELECT {} FROM accounts WHERE id = ?", ACCOUNT_COLUMNS),
            params![id],
            row_to_account,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                Error::NotFound(format!("Account {} not found", id))
            }
            other => other.into(),
        })
    }

    /// List accounts, optionally scoped to a user
    pub fn list_accounts(&self, user_id: Option<&str>) -> Result<Vec<SourceAccount>> {
        let conn = self.conn()?;

        let mut accounts = Vec::new();
        match user_id {
            Some(user) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM accounts WHERE user_id = ? ORDER BY id",
                    ACCOUNT_COLUMNS
                ))?;
                let rows = stmt.query_map(params![user], row_to_account)?;
                for row in rows {
                    accounts.push(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM accounts ORDER BY id",
                    ACCOUNT_COLUMNS
                ))?;
                let rows = stmt.query_map([], row_to_account)?;
                for row in rows {
                    accounts.push(row?);
                }
            }
        }

        Ok(accounts)
    }

    /// List only active accounts for a user (sync candidates)
    pub fn list_active_accounts(&self, user_id: &str) -> Result<Vec<SourceAccount>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM accounts WHERE user_id = ? AND active = 1 ORDER BY id",
            ACCOUNT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![user_id], row_to_account)?;

        let mut accounts = Vec::new();
        for row in rows {
            accounts.push(row?);
        }
        Ok(accounts)
    }

    /// Advance an account's sync cursor
    pub fn update_account_cursor(&self, id: i64, cursor: &str) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE accounts SET cursor = ? WHERE id = ?",
            params![cursor, id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("Account {} not found", id)));
        }
        Ok(())
    }

    /// Mark a successful sync: stamp last_synced_at and clear any stored error
    pub fn mark_account_synced(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE accounts SET last_synced_at = CURRENT_TIMESTAMP, last_error = NULL WHERE id = ?",
            params![id],
        )?;
        Ok(())
    }

    /// Record a transient sync error without deactivating the account
    pub fn record_account_error(&self, id: i64, error: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE accounts SET last_error = ? WHERE id = ?",
            params![error, id],
        )?;
        Ok(())
    }

    /// Deactivate an account after a permanent auth failure.
    /// Accounts are never deleted, so their emails stay queryable.
    pub fn deactivate_account(&self, id: i64, error: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE accounts SET active = 0, last_error = ? WHERE id = ?",
            params![error, id],
        )?;
        Ok(())
    }

    /// Replace an account's credential blob and reactivate it (re-auth flow)
    pub fn update_account_credentials(&self, id: i64, credentials: &str) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE accounts SET credentials = ?, active = 1, last_error = NULL WHERE id = ?",
            params![credentials, id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("Account {} not found", id)));
        }
        Ok(())
    }
}
