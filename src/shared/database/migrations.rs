//! スキーママイグレーション
//!
//! 名前付きのマイグレーションを定義順に適用し、`schema_migrations` テーブルに
//! 適用記録（SHA-256チェックサム付き）を残す。

use crate::shared::errors::{AppError, AppResult};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};

/// マイグレーション定義
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    /// マイグレーション名（一意、適用順に並ぶ）
    pub name: &'static str,
    /// 実行するSQL
    pub sql: &'static str,
}

impl Migration {
    /// マイグレーション内容のチェックサムを計算
    ///
    /// # 戻り値
    /// SHA-256チェックサム（16進数文字列）
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.sql.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// 適用済みマイグレーションの記録
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedMigration {
    pub name: String,
    pub checksum: String,
    pub applied_at: String,
}

/// 登録されたマイグレーション（この順に適用される）
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "0001_create_subscriptions",
        sql: "CREATE TABLE IF NOT EXISTS subscriptions (
            id TEXT PRIMARY KEY,
            service_name TEXT NOT NULL,
            price INTEGER NOT NULL CHECK(price > 0),
            user_id TEXT NOT NULL,
            start_date CHAR(7) NOT NULL,
            end_date CHAR(7),
            start_month INTEGER NOT NULL,
            end_month INTEGER,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            CHECK(end_month IS NULL OR end_month >= start_month)
        )",
    },
    Migration {
        name: "0002_create_subscription_indexes",
        sql: "CREATE INDEX IF NOT EXISTS idx_subscriptions_user_id ON subscriptions(user_id);
              CREATE INDEX IF NOT EXISTS idx_subscriptions_service_name ON subscriptions(service_name);
              CREATE INDEX IF NOT EXISTS idx_subscriptions_months ON subscriptions(start_month, end_month);",
    },
];

/// すべての未適用マイグレーションを実行する
///
/// # 引数
/// * `conn` - データベース接続
///
/// # 戻り値
/// 今回適用したマイグレーション数、または失敗時はエラー
pub fn run_migrations(conn: &Connection) -> AppResult<usize> {
    run_migration_set(conn, MIGRATIONS)
}

fn run_migration_set(conn: &Connection, migrations: &[Migration]) -> AppResult<usize> {
    ensure_migration_table(conn)?;

    let mut applied = 0;
    for migration in migrations {
        let recorded: Option<String> = conn
            .query_row(
                "SELECT checksum FROM schema_migrations WHERE name = ?1",
                params![migration.name],
                |row| row.get(0),
            )
            .optional()?;

        let checksum = migration.checksum();
        match recorded {
            Some(existing) if existing == checksum => continue,
            Some(existing) => {
                return Err(AppError::Database(format!(
                    "適用済みマイグレーション '{}' の内容が変更されています (記録: {existing}, 現在: {checksum})",
                    migration.name
                )));
            }
            None => {}
        }

        log::info!("マイグレーションを適用します: {}", migration.name);

        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration.sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (name, checksum, applied_at) VALUES (?1, ?2, ?3)",
            params![migration.name, checksum, Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;

        applied += 1;
    }

    if applied > 0 {
        log::info!("{applied}件のマイグレーションを適用しました");
    } else {
        log::debug!("適用が必要なマイグレーションはありません");
    }

    Ok(applied)
}

/// schema_migrationsテーブルを初期化する
fn ensure_migration_table(conn: &Connection) -> AppResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            name TEXT PRIMARY KEY,
            checksum TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

/// 適用済みマイグレーション一覧を取得する
pub fn applied_migrations(conn: &Connection) -> AppResult<Vec<AppliedMigration>> {
    ensure_migration_table(conn)?;

    let mut stmt =
        conn.prepare("SELECT name, checksum, applied_at FROM schema_migrations ORDER BY name")?;
    let rows = stmt.query_map([], |row| {
        Ok(AppliedMigration {
            name: row.get(0)?,
            checksum: row.get(1)?,
            applied_at: row.get(2)?,
        })
    })?;

    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::Database(e.to_string()))
}
