use super::client::{db_err, DbClient};
use crate::types::Result;
use libsql::params;

impl DbClient {
    /// Records a revoked token hash until `expires_at`, purging entries that
    /// have already expired.
    pub async fn revoke_token(&self, token_hash: &str, expires_at: i64, now: i64) -> Result<()> {
        let conn = self.writer().await?;

        conn.execute(
            "DELETE FROM revoked_tokens WHERE expires_at < ?",
            params![now],
        )
        .await
        .map_err(db_err)?;

        conn.execute(
            "INSERT OR REPLACE INTO revoked_tokens (token_hash, expires_at) VALUES (?, ?)",
            params![token_hash, expires_at],
        )
        .await
        .map_err(db_err)?;

        Ok(())
    }

    pub async fn is_token_revoked(&self, token_hash: &str) -> Result<bool> {
        let conn = self.connection().await?;
        let mut rows = conn
            .query(
                "SELECT 1 FROM revoked_tokens WHERE token_hash = ?",
                params![token_hash],
            )
            .await
            .map_err(db_err)?;

        Ok(rows.next().await.map_err(db_err)?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_revoke_and_purge() {
        let db = DbClient::new_memory().await.unwrap();

        db.revoke_token("old", 100, 50).await.unwrap();
        assert!(db.is_token_revoked("old").await.unwrap());

        db.revoke_token("new", 1_000, 200).await.unwrap();
        assert!(!db.is_token_revoked("old").await.unwrap());
        assert!(db.is_token_revoked("new").await.unwrap());
    }
}
