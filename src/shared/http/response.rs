use crate::shared::errors::AppError;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use serde::Serialize;
use serde_json::json;

/// JSONレスポンスを作成する
///
/// # 引数
/// * `status` - ステータスコード
/// * `body` - シリアライズ済みのJSON文字列
pub fn json_response(status: StatusCode, body: String) -> Response<String> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/json; charset=utf-8"),
    );
    response
}

/// 値をJSONにシリアライズして200レスポンスを作成する
///
/// シリアライズに失敗した場合は500レスポンスになる。
pub fn ok_json<T: Serialize>(value: &T) -> Response<String> {
    match serde_json::to_string(value) {
        Ok(body) => json_response(StatusCode::OK, body),
        Err(e) => app_error_response(&AppError::from(e)),
    }
}

/// エラーレスポンスを作成する
///
/// # 引数
/// * `status` - ステータスコード
/// * `error` - エラーの概要
/// * `details` - 詳細（省略可）
pub fn error_response(status: StatusCode, error: &str, details: Option<&str>) -> Response<String> {
    let body = match details {
        Some(details) => json!({ "error": error, "details": details }),
        None => json!({ "error": error }),
    };
    json_response(status, body.to_string())
}

/// AppErrorに対応するステータスコードを取得する
pub fn status_for(error: &AppError) -> StatusCode {
    match error {
        AppError::Validation(_) | AppError::PeriodOrder(_) => StatusCode::BAD_REQUEST,
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// AppErrorからエラーレスポンスを作成する
///
/// 内部エラーの詳細はログにのみ出力し、レスポンスには概要だけを含める。
pub fn app_error_response(error: &AppError) -> Response<String> {
    let status = status_for(error);

    let summary = match error {
        AppError::Validation(_) => "リクエストが不正です",
        AppError::PeriodOrder(_) => "集計期間が不正です",
        AppError::NotFound(_) => "リソースが見つかりません",
        _ => "内部エラーが発生しました",
    };

    if error.is_client_error() {
        log::debug!("クライアントエラー応答: status={status}, {}", error.details());
    } else {
        log::error!(
            "サーバーエラー応答: status={status}, severity={:?}, {}",
            error.severity(),
            error.details()
        );
    }

    error_response(status, summary, Some(error.user_message()))
}
