//! Repository layer for the position ledger.
//!
//! One document per position keyed by `position_mint`; rows are never
//! physically deleted, and updates only ever append. The engine is the
//! only writer, so no cross-process locking is needed.

use crate::domain::{Decimal, Mint};
use crate::engine::{LedgerEntry, NewLedgerEntry, PositionUpdate};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use tracing::warn;

/// Repository for ledger operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    /// Record a newly opened position with its initial update.
    ///
    /// Idempotent per mint: a duplicate insert for an already-tracked
    /// position is a no-op and writes nothing.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert_open(&self, entry: &NewLedgerEntry) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO positions
            (position_mint, pool_address, token_a_mint, token_b_mint, is_open,
             usd_amount, token_a_usd, token_b_usd, range_percent, opened_at)
            VALUES (?, ?, ?, ?, 1, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.position_mint.as_str())
        .bind(&entry.pool_address)
        .bind(entry.token_a_mint.as_str())
        .bind(entry.token_b_mint.as_str())
        .bind(entry.usd_amount.to_canonical_string())
        .bind(entry.token_a_usd.to_canonical_string())
        .bind(entry.token_b_usd.to_canonical_string())
        .bind(entry.range_percent as i64)
        .bind(entry.opened_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() > 0 {
            let initial = PositionUpdate::initial(entry);
            insert_update(&mut tx, &entry.position_mint, &initial).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Append one per-cycle update to a position's history.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn append_update(
        &self,
        position_mint: &Mint,
        update: &PositionUpdate,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        insert_update(&mut tx, position_mint, update).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Flip a position's open flag to closed. The transition is one-way;
    /// a closed entry is never reopened and re-closing is a no-op.
    pub async fn close_position(&self, position_mint: &Mint) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE positions SET is_open = 0 WHERE position_mint = ? AND is_open = 1")
            .bind(position_mint.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Fetch a currently-open entry by mint, with its full update history.
    pub async fn get_open_by_mint(
        &self,
        position_mint: &Mint,
    ) -> Result<Option<LedgerEntry>, sqlx::Error> {
        self.get_by_mint_filtered(position_mint, true).await
    }

    /// Fetch an entry regardless of its open flag.
    pub async fn get_by_mint(
        &self,
        position_mint: &Mint,
    ) -> Result<Option<LedgerEntry>, sqlx::Error> {
        self.get_by_mint_filtered(position_mint, false).await
    }

    async fn get_by_mint_filtered(
        &self,
        position_mint: &Mint,
        open_only: bool,
    ) -> Result<Option<LedgerEntry>, sqlx::Error> {
        let sql = if open_only {
            "SELECT * FROM positions WHERE position_mint = ? AND is_open = 1"
        } else {
            "SELECT * FROM positions WHERE position_mint = ?"
        };
        let row = sqlx::query(sql)
            .bind(position_mint.as_str())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut entry = entry_from_row(&row);
        entry.updates = self.load_updates(position_mint).await?;
        Ok(Some(entry))
    }

    /// Mints of every entry still flagged open, oldest first.
    pub async fn list_open_mints(&self) -> Result<Vec<Mint>, sqlx::Error> {
        let rows =
            sqlx::query("SELECT position_mint FROM positions WHERE is_open = 1 ORDER BY opened_at")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|row| Mint::new(row.get::<String, _>("position_mint")))
            .collect())
    }

    async fn load_updates(&self, position_mint: &Mint) -> Result<Vec<PositionUpdate>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT * FROM position_updates WHERE position_mint = ? ORDER BY id ASC",
        )
        .bind(position_mint.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(update_from_row).collect())
    }
}

async fn insert_update(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    position_mint: &Mint,
    update: &PositionUpdate,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO position_updates
        (position_mint, recorded_at, token_a_usd, token_b_usd, usd_amount,
         usd_pnl, usd_percent_pnl, peak_usd_amount, stop_trailing_usd, stop_trailing_percent)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(position_mint.as_str())
    .bind(update.recorded_at.to_rfc3339())
    .bind(update.token_a_usd.to_canonical_string())
    .bind(update.token_b_usd.to_canonical_string())
    .bind(update.usd_amount.to_canonical_string())
    .bind(update.usd_pnl.to_canonical_string())
    .bind(update.usd_percent_pnl.to_canonical_string())
    .bind(update.peak_usd_amount.to_canonical_string())
    .bind(update.stop_trailing_usd.to_canonical_string())
    .bind(update.stop_trailing_percent.to_canonical_string())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn entry_from_row(row: &SqliteRow) -> LedgerEntry {
    LedgerEntry {
        position_mint: Mint::new(row.get::<String, _>("position_mint")),
        pool_address: row.get::<String, _>("pool_address"),
        token_a_mint: Mint::new(row.get::<String, _>("token_a_mint")),
        token_b_mint: Mint::new(row.get::<String, _>("token_b_mint")),
        is_open: row.get::<i64, _>("is_open") != 0,
        usd_amount: parse_decimal(row, "usd_amount"),
        token_a_usd: parse_decimal(row, "token_a_usd"),
        token_b_usd: parse_decimal(row, "token_b_usd"),
        range_percent: row.get::<i64, _>("range_percent") as u8,
        opened_at: parse_timestamp(row, "opened_at"),
        updates: Vec::new(),
    }
}

fn update_from_row(row: &SqliteRow) -> PositionUpdate {
    PositionUpdate {
        recorded_at: parse_timestamp(row, "recorded_at"),
        token_a_usd: parse_decimal(row, "token_a_usd"),
        token_b_usd: parse_decimal(row, "token_b_usd"),
        usd_amount: parse_decimal(row, "usd_amount"),
        usd_pnl: parse_decimal(row, "usd_pnl"),
        usd_percent_pnl: parse_decimal(row, "usd_percent_pnl"),
        peak_usd_amount: parse_decimal(row, "peak_usd_amount"),
        stop_trailing_usd: parse_decimal(row, "stop_trailing_usd"),
        stop_trailing_percent: parse_decimal(row, "stop_trailing_percent"),
    }
}

fn parse_decimal(row: &SqliteRow, column: &str) -> Decimal {
    let raw = row.get::<String, _>(column);
    Decimal::from_str_canonical(&raw).unwrap_or_else(|e| {
        warn!("Corrupt decimal in column {}: {} ({})", column, raw, e);
        Decimal::zero()
    })
}

fn parse_timestamp(row: &SqliteRow, column: &str) -> DateTime<Utc> {
    let raw = row.get::<String, _>(column);
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp in column {}: {} ({})", column, raw, e);
            DateTime::<Utc>::UNIX_EPOCH
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use tempfile::TempDir;

    async fn test_repo() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("ledger.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (Repository::new(pool), temp_dir)
    }

    fn new_entry(mint: &str) -> NewLedgerEntry {
        NewLedgerEntry {
            position_mint: Mint::new(mint),
            pool_address: "pool1".to_string(),
            token_a_mint: Mint::new("tokenA"),
            token_b_mint: Mint::new("tokenB"),
            usd_amount: Decimal::from_str_canonical("100.5").unwrap(),
            token_a_usd: Decimal::from_str_canonical("50.25").unwrap(),
            token_b_usd: Decimal::from_str_canonical("50.25").unwrap(),
            range_percent: 3,
            opened_at: Utc::now(),
        }
    }

    fn update(usd: &str, peak: &str) -> PositionUpdate {
        let usd = Decimal::from_str_canonical(usd).unwrap();
        let peak = Decimal::from_str_canonical(peak).unwrap();
        PositionUpdate {
            recorded_at: Utc::now(),
            token_a_usd: usd,
            token_b_usd: Decimal::zero(),
            usd_amount: usd,
            usd_pnl: Decimal::zero(),
            usd_percent_pnl: Decimal::zero(),
            peak_usd_amount: peak,
            stop_trailing_usd: usd - peak,
            stop_trailing_percent: (usd - peak).percent_of(peak),
        }
    }

    #[tokio::test]
    async fn insert_open_writes_entry_with_initial_update() {
        let (repo, _tmp) = test_repo().await;
        repo.insert_open(&new_entry("mint1")).await.unwrap();

        let entry = repo
            .get_open_by_mint(&Mint::new("mint1"))
            .await
            .unwrap()
            .expect("entry missing");
        assert!(entry.is_open);
        assert_eq!(entry.usd_amount.to_canonical_string(), "100.5");
        assert_eq!(entry.updates.len(), 1);
        assert_eq!(entry.updates[0].usd_amount, entry.usd_amount);
        assert!(entry.updates[0].usd_pnl.is_zero());
    }

    #[tokio::test]
    async fn duplicate_insert_is_noop() {
        let (repo, _tmp) = test_repo().await;
        repo.insert_open(&new_entry("mint1")).await.unwrap();

        let mut changed = new_entry("mint1");
        changed.usd_amount = Decimal::from_str_canonical("999").unwrap();
        repo.insert_open(&changed).await.unwrap();

        let entry = repo
            .get_open_by_mint(&Mint::new("mint1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.usd_amount.to_canonical_string(), "100.5");
        // No second initial update either.
        assert_eq!(entry.updates.len(), 1);
    }

    #[tokio::test]
    async fn updates_append_in_order() {
        let (repo, _tmp) = test_repo().await;
        let mint = Mint::new("mint1");
        repo.insert_open(&new_entry("mint1")).await.unwrap();
        repo.append_update(&mint, &update("110", "110")).await.unwrap();
        repo.append_update(&mint, &update("95", "110")).await.unwrap();

        let entry = repo.get_open_by_mint(&mint).await.unwrap().unwrap();
        let amounts: Vec<String> = entry
            .updates
            .iter()
            .map(|u| u.usd_amount.to_canonical_string())
            .collect();
        assert_eq!(amounts, vec!["100.5", "110", "95"]);
    }

    #[tokio::test]
    async fn close_is_one_way_and_idempotent() {
        let (repo, _tmp) = test_repo().await;
        let mint = Mint::new("mint1");
        repo.insert_open(&new_entry("mint1")).await.unwrap();

        repo.close_position(&mint).await.unwrap();
        assert!(repo.get_open_by_mint(&mint).await.unwrap().is_none());
        let entry = repo.get_by_mint(&mint).await.unwrap().unwrap();
        assert!(!entry.is_open);

        // Re-closing changes nothing; the entry itself is retained.
        repo.close_position(&mint).await.unwrap();
        let entry = repo.get_by_mint(&mint).await.unwrap().unwrap();
        assert!(!entry.is_open);

        // A later insert for the same mint does not reopen it.
        repo.insert_open(&new_entry("mint1")).await.unwrap();
        let entry = repo.get_by_mint(&mint).await.unwrap().unwrap();
        assert!(!entry.is_open);
    }

    #[tokio::test]
    async fn list_open_mints_excludes_closed() {
        let (repo, _tmp) = test_repo().await;
        repo.insert_open(&new_entry("mint1")).await.unwrap();
        repo.insert_open(&new_entry("mint2")).await.unwrap();
        repo.close_position(&Mint::new("mint1")).await.unwrap();

        let open = repo.list_open_mints().await.unwrap();
        assert_eq!(open, vec![Mint::new("mint2")]);
    }
}
