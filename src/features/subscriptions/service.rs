use super::aggregator;
use super::models::{
    ReportingPeriod, Subscription, SubscriptionDto, SubscriptionPage, TotalCostQuery,
};
use super::repository::SubscriptionRepository;
use crate::shared::errors::{AppError, AppResult};
use uuid::Uuid;

/// 一覧取得の既定件数
pub const DEFAULT_PAGE_LIMIT: u32 = 50;

/// 一覧取得の最大件数
pub const MAX_PAGE_LIMIT: u32 = 500;

/// サービス名の最大文字数
const MAX_SERVICE_NAME_CHARS: usize = 100;

/// 金額の上限（10桁）
const MAX_PRICE: i64 = 9_999_999_999;

/// サブスクリプションのユースケースをまとめたサービス
///
/// 入力の検証とログ出力を担当し、保存は `SubscriptionRepository` に委譲する。
pub struct SubscriptionService<R: SubscriptionRepository> {
    repository: R,
}

impl<R: SubscriptionRepository> SubscriptionService<R> {
    pub fn new(repository: R) -> Self {
        Self { repository }
    }

    /// サブスクリプションを追加する
    ///
    /// # 引数
    /// * `dto` - サブスクリプション作成用DTO
    ///
    /// # 戻り値
    /// 採番されたサブスクリプションID、または失敗時はエラー
    pub fn add_subscription(&self, dto: &SubscriptionDto) -> AppResult<Uuid> {
        const OP: &str = "service.subscription.add_subscription";
        log::info!(
            "op={OP} service_name={} user_id={} サブスクリプションを追加します",
            dto.service_name,
            dto.user_id
        );

        let result = validate_subscription_dto(dto).and_then(|_| self.repository.save(dto));

        match result {
            Ok(subscription) => {
                log::info!("op={OP} id={} サブスクリプションを保存しました", subscription.id);
                Ok(subscription.id)
            }
            Err(e) => {
                log::error!("op={OP} サブスクリプションの保存に失敗: {e}");
                Err(e)
            }
        }
    }

    /// サブスクリプションを取得する
    pub fn get_subscription(&self, id: Uuid) -> AppResult<Subscription> {
        const OP: &str = "service.subscription.get_subscription";
        log::info!("op={OP} id={id} サブスクリプションを取得します");

        self.repository
            .find_by_id(id)
            .map(|subscription| {
                log::info!("op={OP} id={id} サブスクリプションを取得しました");
                subscription
            })
            .map_err(|e| {
                log::error!("op={OP} id={id} サブスクリプションの取得に失敗: {e}");
                e
            })
    }

    /// サブスクリプションを更新する（全フィールドを置き換え）
    ///
    /// # 引数
    /// * `id` - サブスクリプションID
    /// * `dto` - 置き換え後の内容
    pub fn update_subscription(&self, id: Uuid, dto: &SubscriptionDto) -> AppResult<()> {
        const OP: &str = "service.subscription.update_subscription";
        log::info!("op={OP} id={id} サブスクリプションを更新します");

        let result = validate_subscription_dto(dto).and_then(|_| self.repository.update(id, dto));

        match result {
            Ok(_) => {
                log::info!("op={OP} id={id} サブスクリプションを更新しました");
                Ok(())
            }
            Err(e) => {
                log::error!("op={OP} id={id} サブスクリプションの更新に失敗: {e}");
                Err(e)
            }
        }
    }

    /// サブスクリプションを削除する
    pub fn delete_subscription(&self, id: Uuid) -> AppResult<()> {
        const OP: &str = "service.subscription.delete_subscription";
        log::info!("op={OP} id={id} サブスクリプションを削除します");

        match self.repository.delete(id) {
            Ok(()) => {
                log::info!("op={OP} id={id} サブスクリプションを削除しました");
                Ok(())
            }
            Err(e) => {
                log::error!("op={OP} id={id} サブスクリプションの削除に失敗: {e}");
                Err(e)
            }
        }
    }

    /// サブスクリプション一覧を取得する
    ///
    /// # 引数
    /// * `offset` - 読み飛ばす件数（未指定は0）
    /// * `limit` - 最大取得件数（未指定は既定値、上限を超える場合は上限に丸める）
    ///
    /// # 戻り値
    /// 1ページ分のサブスクリプションと総件数
    pub fn list_subscriptions(
        &self,
        offset: Option<u32>,
        limit: Option<u32>,
    ) -> AppResult<SubscriptionPage> {
        const OP: &str = "service.subscription.list_subscriptions";

        let offset = offset.unwrap_or(0);
        let limit = match limit {
            Some(0) => return Err(AppError::validation("limitは1以上である必要があります")),
            Some(limit) => limit.min(MAX_PAGE_LIMIT),
            None => DEFAULT_PAGE_LIMIT,
        };
        log::info!("op={OP} offset={offset} limit={limit} サブスクリプション一覧を取得します");

        let result = self.repository.list(offset, limit).and_then(|subscriptions| {
            let total = self.repository.count()?;
            Ok(SubscriptionPage {
                subscriptions,
                total,
                offset,
                limit,
            })
        });

        match result {
            Ok(page) => {
                log::info!(
                    "op={OP} count={} total={} サブスクリプション一覧を取得しました",
                    page.subscriptions.len(),
                    page.total
                );
                Ok(page)
            }
            Err(e) => {
                log::error!("op={OP} サブスクリプション一覧の取得に失敗: {e}");
                Err(e)
            }
        }
    }

    /// 集計期間内の合計金額を計算する
    ///
    /// 期間の終了月が開始月より前の場合は、リポジトリを呼ばずに期間エラーを返す。
    ///
    /// # 引数
    /// * `query` - 集計期間と絞り込み条件
    ///
    /// # 戻り値
    /// 合計金額（最小通貨単位）
    pub fn total_cost(&self, query: &TotalCostQuery) -> AppResult<i64> {
        const OP: &str = "service.subscription.total_cost";
        log::info!(
            "op={OP} start_date={} end_date={} user_id={:?} service_name={:?} 合計金額を計算します",
            query.start_date,
            query.end_date,
            query.filter.user_id,
            query.filter.service_name
        );

        let result = ReportingPeriod::new(query.start_date, query.end_date).and_then(|period| {
            let candidates = self.repository.find_overlapping(&query.filter, &period)?;

            for entry in aggregator::overlap_breakdown(&candidates, &period)? {
                log::debug!(
                    "op={OP} id={} months={} cost={}",
                    entry.subscription_id,
                    entry.months,
                    entry.cost
                );
            }

            Ok((candidates.len(), aggregator::total_cost(&candidates, &period)?))
        });

        match result {
            Ok((candidates, total)) => {
                log::info!("op={OP} candidates={candidates} total_sum={total} 合計金額を計算しました");
                Ok(total)
            }
            Err(e) => {
                log::error!("op={OP} 合計金額の計算に失敗: {e}");
                Err(e)
            }
        }
    }
}

/// サブスクリプションDTOのバリデーション
///
/// # 引数
/// * `dto` - サブスクリプション作成・更新用DTO
///
/// # 戻り値
/// バリデーション成功時はOk(())、失敗時はバリデーションエラー
pub fn validate_subscription_dto(dto: &SubscriptionDto) -> AppResult<()> {
    // バリデーション: サービス名は必須
    if dto.service_name.trim().is_empty() {
        return Err(AppError::validation("サービス名を入力してください"));
    }

    // バリデーション: サービス名は100文字以内
    if dto.service_name.chars().count() > MAX_SERVICE_NAME_CHARS {
        return Err(AppError::validation(
            "サービス名は100文字以内で入力してください",
        ));
    }

    // バリデーション: 金額は正の整数
    if dto.price <= 0 {
        return Err(AppError::validation("金額は正の整数である必要があります"));
    }

    // バリデーション: 金額は10桁以内
    if dto.price > MAX_PRICE {
        return Err(AppError::validation("金額は10桁以内で入力してください"));
    }

    // バリデーション: 終了月は開始月以降
    if let Some(end_date) = dto.end_date {
        if end_date.is_before(&dto.start_date) {
            return Err(AppError::validation(format!(
                "終了月({end_date})は開始月({})以降である必要があります",
                dto.start_date
            )));
        }
    }

    Ok(())
}
