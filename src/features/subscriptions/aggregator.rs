//! 稼働月の重なり集計
//!
//! 集計期間とサブスクリプションの稼働範囲（月単位、両端を含む）が重なる月数を求め、
//! 期間内の合計金額 `Σ(price × 重なり月数)` を計算する。
//! すべて副作用のない純粋関数で、ストレージには依存しない。

use super::models::{ReportingPeriod, Subscription};
use super::month_year::MonthYear;
use crate::shared::errors::{AppError, AppResult};
use serde::Serialize;
use uuid::Uuid;

/// サブスクリプションごとの集計結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverlapEntry {
    pub subscription_id: Uuid,
    pub months: u32,
    pub cost: i64,
}

/// 稼働範囲と集計期間が重なる月数を計算する
///
/// # 引数
/// * `start` - 稼働開始月（含む）
/// * `end` - 稼働終了月（含む）、Noneの場合は期間の終わりまで稼働中とみなす
/// * `period` - 集計期間
///
/// # 戻り値
/// 重なる月数（重ならない場合は0）
pub fn active_months(start: MonthYear, end: Option<MonthYear>, period: &ReportingPeriod) -> u32 {
    let effective_start = start.max(period.start());
    let effective_end = match end {
        Some(end) => end.min(period.end()),
        None => period.end(),
    };

    // month_difference は開始 <= 終了 の場合のみ使う
    if effective_end.is_before(&effective_start) {
        return 0;
    }

    (effective_start.month_difference(&effective_end) + 1) as u32
}

/// サブスクリプションが集計期間内に稼働していた月数を計算する
pub fn overlap_months(subscription: &Subscription, period: &ReportingPeriod) -> u32 {
    active_months(subscription.start_date, subscription.end_date, period)
}

/// サブスクリプション1件の集計期間内の金額を計算する
///
/// # 戻り値
/// 金額（最小通貨単位）、i64に収まらない場合はバリデーションエラー
pub fn subscription_cost(subscription: &Subscription, period: &ReportingPeriod) -> AppResult<i64> {
    let months = overlap_months(subscription, period);
    subscription
        .price
        .checked_mul(i64::from(months))
        .ok_or_else(overflow_error)
}

/// 集計期間内の合計金額を計算する
///
/// 期間と重ならないサブスクリプションは0として扱われるため、
/// 事前に絞り込まれているかどうかに関わらず結果は同じになる。
///
/// # 引数
/// * `subscriptions` - 集計対象のサブスクリプション
/// * `period` - 検証済みの集計期間
///
/// # 戻り値
/// 合計金額（最小通貨単位）、i64に収まらない場合はバリデーションエラー
pub fn total_cost(subscriptions: &[Subscription], period: &ReportingPeriod) -> AppResult<i64> {
    subscriptions.iter().try_fold(0i64, |total, sub| {
        total
            .checked_add(subscription_cost(sub, period)?)
            .ok_or_else(overflow_error)
    })
}

/// 期間を検証してから合計金額を計算する
///
/// 終了月が開始月より前の場合は、サブスクリプションを一切参照せずに期間エラーを返す。
pub fn calculate_total_cost(
    start: MonthYear,
    end: MonthYear,
    subscriptions: &[Subscription],
) -> AppResult<i64> {
    let period = ReportingPeriod::new(start, end)?;
    total_cost(subscriptions, &period)
}

/// サブスクリプションごとの重なり月数と金額の内訳を作成する
pub fn overlap_breakdown(
    subscriptions: &[Subscription],
    period: &ReportingPeriod,
) -> AppResult<Vec<OverlapEntry>> {
    subscriptions
        .iter()
        .map(|sub| {
            Ok(OverlapEntry {
                subscription_id: sub.id,
                months: overlap_months(sub, period),
                cost: subscription_cost(sub, period)?,
            })
        })
        .collect()
}

fn overflow_error() -> AppError {
    AppError::validation("合計金額が上限を超えました。期間または条件を絞り込んでください")
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn my(text: &str) -> MonthYear {
        MonthYear::parse(text).unwrap()
    }

    fn period(start: &str, end: &str) -> ReportingPeriod {
        ReportingPeriod::new(my(start), my(end)).unwrap()
    }

    fn subscription(price: i64, start: &str, end: Option<&str>) -> Subscription {
        Subscription {
            id: Uuid::new_v4(),
            service_name: "Yandex Plus".to_string(),
            price,
            user_id: Uuid::new_v4(),
            start_date: my(start),
            end_date: end.map(my),
            created_at: "2024-01-01T00:00:00+00:00".to_string(),
            updated_at: "2024-01-01T00:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn test_bounded_subscription_inside_period() {
        let sub = subscription(100, "03-2024", Some("05-2024"));
        let period = period("01-2024", "12-2024");

        assert_eq!(overlap_months(&sub, &period), 3);
        assert_eq!(total_cost(&[sub], &period).unwrap(), 300);
    }

    #[test]
    fn test_open_ended_subscription_runs_to_period_end() {
        let sub = subscription(200, "06-2024", None);
        let period = period("01-2024", "08-2024");

        assert_eq!(overlap_months(&sub, &period), 3);
        assert_eq!(total_cost(&[sub], &period).unwrap(), 600);
    }

    #[test]
    fn test_subscription_before_period_contributes_nothing() {
        let sub = subscription(100, "01-2023", Some("02-2023"));
        let period = period("01-2024", "12-2024");

        assert_eq!(overlap_months(&sub, &period), 0);
        assert_eq!(total_cost(&[sub], &period).unwrap(), 0);
    }

    #[test]
    fn test_subscription_after_period_contributes_nothing() {
        let sub = subscription(100, "01-2025", None);
        let period = period("01-2024", "12-2024");

        assert_eq!(overlap_months(&sub, &period), 0);
    }

    #[test]
    fn test_start_on_period_end_month_counts_once() {
        let sub = subscription(400, "12-2024", None);
        let period = period("01-2024", "12-2024");

        assert_eq!(overlap_months(&sub, &period), 1);
        assert_eq!(total_cost(&[sub], &period).unwrap(), 400);
    }

    #[test]
    fn test_end_on_period_start_month_counts_once() {
        let sub = subscription(400, "05-2023", Some("01-2024"));
        let period = period("01-2024", "12-2024");

        assert_eq!(overlap_months(&sub, &period), 1);
    }

    #[test]
    fn test_subscription_spanning_whole_period_is_clipped() {
        let sub = subscription(50, "01-2020", Some("12-2030"));
        let period = period("11-2023", "02-2024");

        assert_eq!(overlap_months(&sub, &period), 4);
    }

    #[test]
    fn test_reversed_period_fails_before_aggregation() {
        let subs = vec![subscription(100, "01-2024", None)];
        let result = calculate_total_cost(my("12-2024"), my("01-2024"), &subs);

        assert!(matches!(result, Err(AppError::PeriodOrder(_))));
    }

    #[test]
    fn test_total_sums_mixed_subscriptions() {
        let subs = vec![
            subscription(100, "03-2024", Some("05-2024")), // 3か月
            subscription(200, "06-2024", None),            // 7か月
            subscription(999, "01-2023", Some("02-2023")), // 0か月
        ];

        let total = calculate_total_cost(my("01-2024"), my("12-2024"), &subs).unwrap();
        assert_eq!(total, 300 + 1400);
    }

    #[test]
    fn test_empty_candidate_set() {
        assert_eq!(total_cost(&[], &period("01-2024", "12-2024")).unwrap(), 0);
    }

    #[test]
    fn test_overlap_breakdown() {
        let subs = vec![
            subscription(100, "03-2024", Some("05-2024")),
            subscription(999, "01-2023", Some("02-2023")),
        ];
        let breakdown = overlap_breakdown(&subs, &period("01-2024", "12-2024")).unwrap();

        assert_eq!(breakdown.len(), 2);
        assert_eq!(breakdown[0].subscription_id, subs[0].id);
        assert_eq!((breakdown[0].months, breakdown[0].cost), (3, 300));
        assert_eq!((breakdown[1].months, breakdown[1].cost), (0, 0));
    }

    #[test]
    fn test_overflow_is_reported_instead_of_wrapping() {
        let period = period("01-2000", "12-2100");

        // 1件の金額がi64を超える
        let huge = subscription(i64::MAX / 2, "01-2000", None);
        assert!(matches!(
            subscription_cost(&huge, &period),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            overlap_breakdown(&[huge], &period),
            Err(AppError::Validation(_))
        ));

        // 1件ずつは収まるが合計がi64を超える
        let monthly = i64::MAX / 1212;
        let subs = vec![
            subscription(monthly, "01-2000", None),
            subscription(monthly, "01-2000", None),
        ];
        assert!(subscription_cost(&subs[0], &period).is_ok());
        assert!(matches!(
            total_cost(&subs, &period),
            Err(AppError::Validation(_))
        ));
    }

    fn ordered(a: MonthYear, b: MonthYear) -> (MonthYear, MonthYear) {
        if b.is_before(&a) {
            (b, a)
        } else {
            (a, b)
        }
    }

    #[quickcheck]
    fn prop_overlap_matches_month_by_month_count(
        a: MonthYear,
        b: MonthYear,
        c: MonthYear,
        d: MonthYear,
        open_ended: bool,
    ) -> bool {
        let (sub_start, sub_end) = ordered(a, b);
        let (period_start, period_end) = ordered(c, d);
        let sub_end = (!open_ended).then_some(sub_end);
        let period = ReportingPeriod::new(period_start, period_end).unwrap();

        let expected = (period_start.month_index()..=period_end.month_index())
            .filter(|m| {
                *m >= sub_start.month_index()
                    && sub_end.map_or(true, |end| *m <= end.month_index())
            })
            .count() as u32;

        active_months(sub_start, sub_end, &period) == expected
    }

    #[quickcheck]
    fn prop_overlap_symmetric_between_ranges(
        a: MonthYear,
        b: MonthYear,
        c: MonthYear,
        d: MonthYear,
    ) -> bool {
        let (first_start, first_end) = ordered(a, b);
        let (second_start, second_end) = ordered(c, d);
        let first = ReportingPeriod::new(first_start, first_end).unwrap();
        let second = ReportingPeriod::new(second_start, second_end).unwrap();

        active_months(first_start, Some(first_end), &second)
            == active_months(second_start, Some(second_end), &first)
    }
}
