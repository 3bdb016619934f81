//! Identity tables: user email to member id, and group rosters. Replaced wholesale per sync.

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::{IdentityGroup, IdentityUser};

/// Replace all identity rows with `users` and `groups` in one transaction.
pub fn replace_identities(
    conn: &mut Connection,
    users: &[IdentityUser],
    groups: &[IdentityGroup],
) -> Result<()> {
    let tx = conn.transaction().context("begin transaction")?;
    tx.execute_batch(
        "DELETE FROM identity_memberships; DELETE FROM identity_groups; DELETE FROM identity_users;",
    )
    .context("clear identities")?;
    {
        let mut user_stmt = tx
            .prepare("INSERT OR REPLACE INTO identity_users (email, external_id) VALUES (?1, ?2)")
            .context("prepare user insert")?;
        for user in users {
            user_stmt.execute((user.index_identity.as_str(), user.external_identity.as_str()))?;
        }
        let mut group_stmt = tx
            .prepare("INSERT OR IGNORE INTO identity_groups (name) VALUES (?1)")
            .context("prepare group insert")?;
        let mut member_stmt = tx
            .prepare(
                "INSERT OR IGNORE INTO identity_memberships (group_name, email) VALUES (?1, ?2)",
            )
            .context("prepare membership insert")?;
        for group in groups {
            group_stmt.execute([group.name.as_str()])?;
            for email in &group.members {
                member_stmt.execute((group.name.as_str(), email.as_str()))?;
            }
        }
    }
    tx.commit().context("commit identities")?;
    Ok(())
}

/// `(users, groups, memberships)` row counts.
pub fn identity_counts(conn: &Connection) -> Result<(usize, usize, usize)> {
    let count = |table: &str| -> Result<usize> {
        let n: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .with_context(|| format!("count {table}"))?;
        Ok(n.max(0) as usize)
    };
    Ok((
        count("identity_users")?,
        count("identity_groups")?,
        count("identity_memberships")?,
    ))
}
