use super::month_year::MonthYear;
use crate::shared::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// サブスクリプションデータモデル
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Subscription {
    pub id: Uuid,
    pub service_name: String,           // サービス名、100文字以内
    pub price: i64,                     // 1か月あたりの金額（最小通貨単位）、正の整数
    pub user_id: Uuid,                  // 所有ユーザー
    pub start_date: MonthYear,          // 開始月（この月を含む）
    pub end_date: Option<MonthYear>,    // 終了月（この月を含む）、Noneは継続中
    pub created_at: String,             // RFC3339形式（UTC）
    pub updated_at: String,             // RFC3339形式（UTC）
}

/// サブスクリプション作成・更新用DTO
///
/// 更新は全フィールドの置き換えとして扱うため、作成と同じ形を使う。
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SubscriptionDto {
    pub service_name: String,
    pub price: i64,
    pub user_id: Uuid,
    pub start_date: MonthYear,
    pub end_date: Option<MonthYear>,
}

/// 集計期間（開始月・終了月ともに含む）
///
/// 生成時に `start <= end` が検証されるため、この型の値は常に有効な期間を表す。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportingPeriod {
    start: MonthYear,
    end: MonthYear,
}

impl ReportingPeriod {
    /// 集計期間を作成する
    ///
    /// # 引数
    /// * `start` - 開始月
    /// * `end` - 終了月
    ///
    /// # 戻り値
    /// 集計期間、終了月が開始月より前の場合は期間エラー
    pub fn new(start: MonthYear, end: MonthYear) -> AppResult<Self> {
        if end.is_before(&start) {
            return Err(AppError::period_order(format!(
                "終了月({end})は開始月({start})以降である必要があります"
            )));
        }

        Ok(Self { start, end })
    }

    pub fn start(&self) -> MonthYear {
        self.start
    }

    pub fn end(&self) -> MonthYear {
        self.end
    }
}

/// 合計金額計算の絞り込み条件
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionFilter {
    pub user_id: Option<Uuid>,
    pub service_name: Option<String>,
}

/// 合計金額計算のクエリ
#[derive(Debug, Clone, PartialEq)]
pub struct TotalCostQuery {
    pub start_date: MonthYear,
    pub end_date: MonthYear,
    pub filter: SubscriptionFilter,
}

/// サブスクリプション一覧の1ページ分
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct SubscriptionPage {
    pub subscriptions: Vec<Subscription>,
    pub total: i64,
    pub offset: u32,
    pub limit: u32,
}
