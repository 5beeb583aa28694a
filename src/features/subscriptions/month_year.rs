use crate::shared::errors::{AppError, AppResult};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// 受け付ける最小の年
pub const MIN_YEAR: i32 = 2000;

/// 受け付ける最大の年
pub const MAX_YEAR: i32 = 2100;

/// 日を持たない暦月（年・月の組）
///
/// 年を優先して比較される全順序を持つ。
/// テキスト表現は常に `MM-YYYY`（例: `07-2025`）で、APIのリクエスト・レスポンスと
/// データベースの保存形式の両方でこの表現を使用する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonthYear {
    // フィールドの宣言順が比較順（年→月）になる
    year: i32,
    month: u32,
}

impl MonthYear {
    /// 年と月から値を作成する
    ///
    /// # 引数
    /// * `year` - 年（2000〜2100）
    /// * `month` - 月（1〜12）
    ///
    /// # 戻り値
    /// 作成された値、範囲外の場合はバリデーションエラー
    pub fn new(year: i32, month: u32) -> AppResult<Self> {
        if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
            return Err(AppError::validation(format!(
                "年は{MIN_YEAR}年から{MAX_YEAR}年の間で入力してください: {year}"
            )));
        }
        if !(1..=12).contains(&month) {
            return Err(AppError::validation(format!(
                "月は1から12の間で入力してください: {month}"
            )));
        }

        Ok(Self { year, month })
    }

    /// `MM-YYYY` 形式の文字列を解析する
    ///
    /// # 引数
    /// * `text` - 解析対象の文字列
    ///
    /// # 戻り値
    /// 解析された値、形式または範囲が不正な場合はバリデーションエラー
    pub fn parse(text: &str) -> AppResult<Self> {
        let parts: Vec<&str> = text.split('-').collect();
        if parts.len() != 2 {
            return Err(AppError::validation(format!(
                "日付はMM-YYYY形式で入力してください: {text}"
            )));
        }

        let month = parse_segment(parts[0], 2, "月")?;
        let year = parse_segment(parts[1], 4, "年")?;

        Self::new(year as i32, month)
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// `other` より厳密に前の月かどうか
    pub fn is_before(&self, other: &MonthYear) -> bool {
        self < other
    }

    /// `self` から `other` までの月数
    ///
    /// `other` が `self` より前の場合は負の値になる。
    pub fn month_difference(&self, other: &MonthYear) -> i32 {
        (other.year - self.year) * 12 + (other.month as i32 - self.month as i32)
    }

    /// 月単位の通し番号（`year * 12 + month - 1`）
    ///
    /// 比較順と一致するため、データベースでの範囲絞り込みに使用する。
    pub fn month_index(&self) -> i64 {
        i64::from(self.year) * 12 + i64::from(self.month) - 1
    }
}

/// 年・月の各セグメントを解析する（符号・空白・桁数違いは受け付けない）
fn parse_segment(segment: &str, digits: usize, label: &str) -> AppResult<u32> {
    if segment.len() != digits || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AppError::validation(format!(
            "{label}は{digits}桁の数値で入力してください: {segment}"
        )));
    }

    segment
        .parse::<u32>()
        .map_err(|_| AppError::validation(format!("{label}は数値で入力してください: {segment}")))
}

impl fmt::Display for MonthYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}-{:04}", self.month, self.year)
    }
}

impl FromStr for MonthYear {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for MonthYear {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MonthYear {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        MonthYear::parse(&text).map_err(|e| de::Error::custom(e.user_message()))
    }
}

/// データベースには `MM-YYYY` のTEXTとして保存する
impl ToSql for MonthYear {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for MonthYear {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        MonthYear::parse(text).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

#[cfg(test)]
impl quickcheck::Arbitrary for MonthYear {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        let span = (MAX_YEAR - MIN_YEAR + 1) as u32;
        MonthYear {
            year: MIN_YEAR + (u32::arbitrary(g) % span) as i32,
            month: u32::arbitrary(g) % 12 + 1,
        }
    }
}
