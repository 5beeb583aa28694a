use super::models::{ReportingPeriod, Subscription, SubscriptionDto, SubscriptionFilter};
use crate::shared::errors::{AppError, AppResult};
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

const SELECT_COLUMNS: &str =
    "id, service_name, price, user_id, start_date, end_date, created_at, updated_at";

/// サブスクリプションの保存先
///
/// サービス層はこのトレイトのみに依存し、具体的なストレージを知らない。
pub trait SubscriptionRepository: Send + Sync {
    /// 新しいサブスクリプションを保存し、IDを採番して返す
    fn save(&self, dto: &SubscriptionDto) -> AppResult<Subscription>;

    /// IDでサブスクリプションを取得する
    fn find_by_id(&self, id: Uuid) -> AppResult<Subscription>;

    /// サブスクリプションの全フィールドを置き換える
    fn update(&self, id: Uuid, dto: &SubscriptionDto) -> AppResult<Subscription>;

    /// サブスクリプションを削除する
    fn delete(&self, id: Uuid) -> AppResult<()>;

    /// サブスクリプション一覧を取得する（サービス名、ID順）
    fn list(&self, offset: u32, limit: u32) -> AppResult<Vec<Subscription>>;

    /// 保存されているサブスクリプションの件数
    fn count(&self) -> AppResult<i64>;

    /// 絞り込み条件に一致し、集計期間と重なり得るサブスクリプションを取得する
    fn find_overlapping(
        &self,
        filter: &SubscriptionFilter,
        period: &ReportingPeriod,
    ) -> AppResult<Vec<Subscription>>;
}

/// SQLiteによるサブスクリプションリポジトリ
#[derive(Clone)]
pub struct SqliteSubscriptionRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSubscriptionRepository {
    /// マイグレーション済みの接続からリポジトリを作成する
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| AppError::concurrency(format!("データベースロックエラー: {e}")))
    }
}

impl SubscriptionRepository for SqliteSubscriptionRepository {
    fn save(&self, dto: &SubscriptionDto) -> AppResult<Subscription> {
        let conn = self.lock()?;
        create(&conn, dto)
    }

    fn find_by_id(&self, id: Uuid) -> AppResult<Subscription> {
        let conn = self.lock()?;
        find_by_id(&conn, id)
    }

    fn update(&self, id: Uuid, dto: &SubscriptionDto) -> AppResult<Subscription> {
        let conn = self.lock()?;
        update(&conn, id, dto)
    }

    fn delete(&self, id: Uuid) -> AppResult<()> {
        let conn = self.lock()?;
        delete(&conn, id)
    }

    fn list(&self, offset: u32, limit: u32) -> AppResult<Vec<Subscription>> {
        let conn = self.lock()?;
        find_page(&conn, offset, limit)
    }

    fn count(&self) -> AppResult<i64> {
        let conn = self.lock()?;
        count(&conn)
    }

    fn find_overlapping(
        &self,
        filter: &SubscriptionFilter,
        period: &ReportingPeriod,
    ) -> AppResult<Vec<Subscription>> {
        let conn = self.lock()?;
        find_overlapping(&conn, filter, period)
    }
}

/// サブスクリプションを作成する
///
/// # 引数
/// * `conn` - データベース接続
/// * `dto` - 検証済みのサブスクリプションDTO
///
/// # 戻り値
/// 作成されたサブスクリプション、または失敗時はエラー
pub fn create(conn: &Connection, dto: &SubscriptionDto) -> AppResult<Subscription> {
    let id = Uuid::new_v4();
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO subscriptions (id, service_name, price, user_id, start_date, end_date, start_month, end_month, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            id.to_string(),
            dto.service_name,
            dto.price,
            dto.user_id.to_string(),
            dto.start_date,
            dto.end_date,
            dto.start_date.month_index(),
            dto.end_date.map(|end| end.month_index()),
            now,
            now
        ],
    )?;

    find_by_id(conn, id)
}

/// IDでサブスクリプションを取得する
///
/// # 引数
/// * `conn` - データベース接続
/// * `id` - サブスクリプションID
///
/// # 戻り値
/// サブスクリプション、存在しない場合はNotFound
pub fn find_by_id(conn: &Connection, id: Uuid) -> AppResult<Subscription> {
    conn.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM subscriptions WHERE id = ?1"),
        params![id.to_string()],
        map_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => not_found(id),
        _ => AppError::Database(e.to_string()),
    })
}

/// サブスクリプションを更新する（全フィールドを置き換え）
///
/// # 引数
/// * `conn` - データベース接続
/// * `id` - サブスクリプションID
/// * `dto` - 検証済みのサブスクリプションDTO
///
/// # 戻り値
/// 更新されたサブスクリプション、存在しない場合はNotFound
pub fn update(conn: &Connection, id: Uuid, dto: &SubscriptionDto) -> AppResult<Subscription> {
    let now = Utc::now().to_rfc3339();

    let rows_affected = conn.execute(
        "UPDATE subscriptions
         SET service_name = ?1, price = ?2, user_id = ?3, start_date = ?4, end_date = ?5,
             start_month = ?6, end_month = ?7, updated_at = ?8
         WHERE id = ?9",
        params![
            dto.service_name,
            dto.price,
            dto.user_id.to_string(),
            dto.start_date,
            dto.end_date,
            dto.start_date.month_index(),
            dto.end_date.map(|end| end.month_index()),
            now,
            id.to_string()
        ],
    )?;

    if rows_affected == 0 {
        return Err(not_found(id));
    }

    find_by_id(conn, id)
}

/// サブスクリプションを削除する
///
/// # 戻り値
/// 成功時はOk(())、存在しない場合はNotFound
pub fn delete(conn: &Connection, id: Uuid) -> AppResult<()> {
    let rows_affected = conn.execute(
        "DELETE FROM subscriptions WHERE id = ?1",
        params![id.to_string()],
    )?;

    if rows_affected == 0 {
        return Err(not_found(id));
    }

    Ok(())
}

/// サブスクリプション一覧を1ページ分取得する
///
/// # 引数
/// * `conn` - データベース接続
/// * `offset` - 読み飛ばす件数
/// * `limit` - 最大取得件数
pub fn find_page(conn: &Connection, offset: u32, limit: u32) -> AppResult<Vec<Subscription>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_COLUMNS} FROM subscriptions ORDER BY service_name, id LIMIT ?1 OFFSET ?2"
    ))?;
    let subscriptions = stmt.query_map(params![limit, offset], map_row)?;

    subscriptions
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::Database(e.to_string()))
}

/// サブスクリプションの件数を取得する
pub fn count(conn: &Connection) -> AppResult<i64> {
    let total = conn.query_row("SELECT COUNT(*) FROM subscriptions", [], |row| row.get(0))?;
    Ok(total)
}

/// 集計期間と重なり得るサブスクリプションを取得する
///
/// 開始月 <= 期間の終了月 かつ（終了月なし または 終了月 >= 期間の開始月）で絞り込む。
/// ユーザーIDとサービス名は指定された場合のみ完全一致で絞り込む。
///
/// # 引数
/// * `conn` - データベース接続
/// * `filter` - 絞り込み条件
/// * `period` - 集計期間
pub fn find_overlapping(
    conn: &Connection,
    filter: &SubscriptionFilter,
    period: &ReportingPeriod,
) -> AppResult<Vec<Subscription>> {
    let mut query = format!(
        "SELECT {SELECT_COLUMNS} FROM subscriptions
         WHERE start_month <= ?1 AND (end_month IS NULL OR end_month >= ?2)"
    );

    let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![
        Box::new(period.end().month_index()),
        Box::new(period.start().month_index()),
    ];

    // ユーザーフィルター
    if let Some(user_id) = filter.user_id {
        query.push_str(" AND user_id = ?");
        params.push(Box::new(user_id.to_string()));
    }

    // サービス名フィルター
    if let Some(service_name) = &filter.service_name {
        query.push_str(" AND service_name = ?");
        params.push(Box::new(service_name.clone()));
    }

    query.push_str(" ORDER BY start_month, id");

    let mut stmt = conn.prepare(&query)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let subscriptions = stmt.query_map(param_refs.as_slice(), map_row)?;

    subscriptions
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::Database(e.to_string()))
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<Subscription> {
    Ok(Subscription {
        id: get_uuid(row, 0)?,
        service_name: row.get(1)?,
        price: row.get(2)?,
        user_id: get_uuid(row, 3)?,
        start_date: row.get(4)?,
        end_date: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn get_uuid(row: &Row<'_>, index: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(index)?;
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e)))
}

fn not_found(id: Uuid) -> AppError {
    AppError::not_found(format!("ID {id} のサブスクリプション"))
}

/// テスト用のメモリ上リポジトリ
#[cfg(test)]
pub mod memory {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 呼び出し回数を記録するメモリ上の実装
    #[derive(Default)]
    pub struct InMemorySubscriptionRepository {
        items: Mutex<Vec<Subscription>>,
        overlap_queries: AtomicUsize,
    }

    impl InMemorySubscriptionRepository {
        pub fn new() -> Self {
            Self::default()
        }

        /// find_overlapping が呼ばれた回数
        pub fn overlap_queries(&self) -> usize {
            self.overlap_queries.load(Ordering::SeqCst)
        }

        fn items(&self) -> AppResult<MutexGuard<'_, Vec<Subscription>>> {
            self.items
                .lock()
                .map_err(|e| AppError::concurrency(format!("ロックエラー: {e}")))
        }
    }

    impl SubscriptionRepository for InMemorySubscriptionRepository {
        fn save(&self, dto: &SubscriptionDto) -> AppResult<Subscription> {
            let now = Utc::now().to_rfc3339();
            let subscription = Subscription {
                id: Uuid::new_v4(),
                service_name: dto.service_name.clone(),
                price: dto.price,
                user_id: dto.user_id,
                start_date: dto.start_date,
                end_date: dto.end_date,
                created_at: now.clone(),
                updated_at: now,
            };
            self.items()?.push(subscription.clone());
            Ok(subscription)
        }

        fn find_by_id(&self, id: Uuid) -> AppResult<Subscription> {
            self.items()?
                .iter()
                .find(|s| s.id == id)
                .cloned()
                .ok_or_else(|| not_found(id))
        }

        fn update(&self, id: Uuid, dto: &SubscriptionDto) -> AppResult<Subscription> {
            let mut items = self.items()?;
            let existing = items
                .iter_mut()
                .find(|s| s.id == id)
                .ok_or_else(|| not_found(id))?;

            existing.service_name = dto.service_name.clone();
            existing.price = dto.price;
            existing.user_id = dto.user_id;
            existing.start_date = dto.start_date;
            existing.end_date = dto.end_date;
            existing.updated_at = Utc::now().to_rfc3339();

            Ok(existing.clone())
        }

        fn delete(&self, id: Uuid) -> AppResult<()> {
            let mut items = self.items()?;
            let before = items.len();
            items.retain(|s| s.id != id);

            if items.len() == before {
                return Err(not_found(id));
            }
            Ok(())
        }

        fn list(&self, offset: u32, limit: u32) -> AppResult<Vec<Subscription>> {
            let mut items = self.items()?.clone();
            items.sort_by(|a, b| (&a.service_name, a.id).cmp(&(&b.service_name, b.id)));
            Ok(items
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect())
        }

        fn count(&self) -> AppResult<i64> {
            Ok(self.items()?.len() as i64)
        }

        // 期間による絞り込みは行わず、重ならないものは集計側で0になる
        fn find_overlapping(
            &self,
            filter: &SubscriptionFilter,
            _period: &ReportingPeriod,
        ) -> AppResult<Vec<Subscription>> {
            self.overlap_queries.fetch_add(1, Ordering::SeqCst);

            Ok(self
                .items()?
                .iter()
                .filter(|s| filter.user_id.map_or(true, |id| s.user_id == id))
                .filter(|s| {
                    filter
                        .service_name
                        .as_ref()
                        .map_or(true, |name| &s.service_name == name)
                })
                .cloned()
                .collect())
        }
    }
}
