/// サブスクリプション機能モジュール
///
/// このモジュールは、サブスクリプション管理に関連するすべての機能を提供します：
/// - 月単位の日付型（MM-YYYY）
/// - サブスクリプションの作成、読み取り、更新、削除
/// - 集計期間内の稼働月数に基づく合計金額の計算
/// - HTTP APIハンドラー
pub mod aggregator;
pub mod handlers;
pub mod models;
pub mod month_year;
pub mod repository;
pub mod service;

// 公開インターフェース
pub use aggregator::{active_months, calculate_total_cost, total_cost, OverlapEntry};
pub use handlers::{handle_request, API_PREFIX};
pub use models::{
    ReportingPeriod, Subscription, SubscriptionDto, SubscriptionFilter, SubscriptionPage,
    TotalCostQuery,
};
pub use month_year::MonthYear;
pub use repository::{SqliteSubscriptionRepository, SubscriptionRepository};
pub use service::{validate_subscription_dto, SubscriptionService};
