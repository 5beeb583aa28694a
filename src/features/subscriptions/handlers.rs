//! サブスクリプションAPIのHTTPハンドラー
//!
//! `/api/v1` 以下のルートを解決し、リクエストの解析とレスポンスの組み立てを行う。
//! 業務ロジックは `SubscriptionService` に委譲する。

use super::models::{SubscriptionDto, SubscriptionFilter, TotalCostQuery};
use super::month_year::MonthYear;
use super::repository::SubscriptionRepository;
use super::service::SubscriptionService;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::http::{app_error_response, error_response, ok_json};
use http_body_util::{BodyExt, Limited};
use hyper::body::Body;
use hyper::header::{HeaderValue, ALLOW};
use hyper::{Method, Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;
use uuid::Uuid;

/// APIのベースパス
pub const API_PREFIX: &str = "/api/v1";

/// リクエストボディの最大サイズ
const MAX_BODY_BYTES: usize = 64 * 1024;

/// ハンドラー間で共有するサービス
pub type SharedService<R> = Arc<SubscriptionService<R>>;

/// サブスクリプション作成リクエスト
///
/// 日付とIDは文字列で受け取り、変換時に検証する。
#[derive(Debug, Deserialize)]
struct CreateSubscriptionRequest {
    service_name: String,
    price: i64,
    user_id: String,
    start_date: String,
    #[serde(default)]
    end_date: Option<String>,
}

impl CreateSubscriptionRequest {
    fn into_dto(self) -> AppResult<SubscriptionDto> {
        Ok(SubscriptionDto {
            service_name: self.service_name,
            price: self.price,
            user_id: parse_uuid("user_id", &self.user_id)?,
            start_date: parse_month("start_date", &self.start_date)?,
            end_date: parse_optional_month("end_date", self.end_date.as_deref())?,
        })
    }
}

/// サブスクリプション更新リクエスト（全フィールドを置き換え）
#[derive(Debug, Deserialize)]
struct UpdateSubscriptionRequest {
    id: String,
    #[serde(flatten)]
    subscription: CreateSubscriptionRequest,
}

#[derive(Debug, Clone, PartialEq)]
enum Route {
    Health,
    Create,
    List,
    Update,
    Total,
    Item(String),
}

impl Route {
    /// パスからルートを解決する
    fn resolve(path: &str) -> Option<Route> {
        let rest = path.strip_prefix(API_PREFIX)?.strip_prefix('/')?;
        let rest = rest.strip_suffix('/').unwrap_or(rest);

        let route = match rest {
            "health" => Route::Health,
            "create" => Route::Create,
            "all" => Route::List,
            "update" => Route::Update,
            "total" => Route::Total,
            id if !id.is_empty() && !id.contains('/') => Route::Item(id.to_string()),
            _ => return None,
        };

        Some(route)
    }

    fn allowed_methods(&self) -> &'static [Method] {
        match self {
            Route::Health | Route::List | Route::Total => &[Method::GET],
            Route::Create => &[Method::POST],
            Route::Update => &[Method::PUT],
            Route::Item(_) => &[Method::GET, Method::DELETE],
        }
    }
}

/// HTTPリクエストを処理する
///
/// # 引数
/// * `req` - HTTPリクエスト
/// * `service` - サブスクリプションサービス
///
/// # 戻り値
/// JSONレスポンス（エラー時もJSON形式）
pub async fn handle_request<R, B>(req: Request<B>, service: SharedService<R>) -> Response<String>
where
    R: SubscriptionRepository + 'static,
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    log::debug!("リクエストを受信: {method} {path}");

    let Some(route) = Route::resolve(&path) else {
        return error_response(StatusCode::NOT_FOUND, "ルートが見つかりません", Some(&path));
    };

    let allowed = route.allowed_methods();
    if !allowed.contains(&method) {
        return method_not_allowed(&method, &path, allowed);
    }

    let result = match route {
        Route::Health => Ok(ok_json(&json!({ "status": "ok" }))),
        Route::Create => create_subscription(req, &service).await,
        Route::List => list_subscriptions(req, &service).await,
        Route::Update => update_subscription(req, &service).await,
        Route::Total => total_cost(req, &service).await,
        Route::Item(id) if method == Method::DELETE => delete_subscription(&id, &service).await,
        Route::Item(id) => get_subscription(&id, &service).await,
    };

    let response = result.unwrap_or_else(|e| app_error_response(&e));
    log::debug!("レスポンスを返却: {method} {path} status={}", response.status());
    response
}

async fn create_subscription<R, B>(
    req: Request<B>,
    service: &SharedService<R>,
) -> AppResult<Response<String>>
where
    R: SubscriptionRepository + 'static,
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let request: CreateSubscriptionRequest = read_json(req.into_body()).await?;
    let dto = request.into_dto()?;

    let id = run_blocking(service, move |service| service.add_subscription(&dto)).await?;

    Ok(ok_json(&json!({
        "message": "サブスクリプションを追加しました",
        "subscription_id": id,
    })))
}

async fn get_subscription<R>(raw_id: &str, service: &SharedService<R>) -> AppResult<Response<String>>
where
    R: SubscriptionRepository + 'static,
{
    let id = parse_uuid("id", raw_id)?;
    let subscription = run_blocking(service, move |service| service.get_subscription(id)).await?;

    Ok(ok_json(&json!({ "subscription": subscription })))
}

async fn list_subscriptions<R, B>(
    req: Request<B>,
    service: &SharedService<R>,
) -> AppResult<Response<String>>
where
    R: SubscriptionRepository + 'static,
{
    let params = parse_query(req.uri().query())?;
    let offset = parse_optional_u32(&params, "offset")?;
    let limit = parse_optional_u32(&params, "limit")?;

    let page = run_blocking(service, move |service| service.list_subscriptions(offset, limit)).await?;

    Ok(ok_json(&page))
}

async fn update_subscription<R, B>(
    req: Request<B>,
    service: &SharedService<R>,
) -> AppResult<Response<String>>
where
    R: SubscriptionRepository + 'static,
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let request: UpdateSubscriptionRequest = read_json(req.into_body()).await?;
    let id = parse_uuid("id", &request.id)?;
    let dto = request.subscription.into_dto()?;

    run_blocking(service, move |service| service.update_subscription(id, &dto)).await?;

    Ok(ok_json(&json!({ "message": "サブスクリプションを更新しました" })))
}

async fn delete_subscription<R>(
    raw_id: &str,
    service: &SharedService<R>,
) -> AppResult<Response<String>>
where
    R: SubscriptionRepository + 'static,
{
    let id = parse_uuid("id", raw_id)?;
    run_blocking(service, move |service| service.delete_subscription(id)).await?;

    Ok(ok_json(&json!({ "message": "サブスクリプションを削除しました" })))
}

async fn total_cost<R, B>(req: Request<B>, service: &SharedService<R>) -> AppResult<Response<String>>
where
    R: SubscriptionRepository + 'static,
{
    let params = parse_query(req.uri().query())?;

    let start_date = parse_month("start_date", required(&params, "start_date")?)?;
    let end_date = parse_month("end_date", required(&params, "end_date")?)?;

    // 空文字のフィルターは指定なしとして扱う
    let user_id = match optional(&params, "user_id") {
        Some(raw) => Some(parse_uuid("user_id", raw)?),
        None => None,
    };
    let service_name = optional(&params, "service_name").map(str::to_string);

    let query = TotalCostQuery {
        start_date,
        end_date,
        filter: SubscriptionFilter {
            user_id,
            service_name,
        },
    };

    let total = run_blocking(service, move |service| service.total_cost(&query)).await?;

    Ok(ok_json(&json!({ "total_sum": total })))
}

/// サービス呼び出しをブロッキング用スレッドで実行する
///
/// SQLiteへのアクセスは同期処理のため、非同期ランタイムのワーカーを占有しないようにする。
async fn run_blocking<R, T, F>(service: &SharedService<R>, f: F) -> AppResult<T>
where
    R: SubscriptionRepository + 'static,
    T: Send + 'static,
    F: FnOnce(&SubscriptionService<R>) -> AppResult<T> + Send + 'static,
{
    let service = Arc::clone(service);
    tokio::task::spawn_blocking(move || f(service.as_ref()))
        .await
        .map_err(|e| AppError::concurrency(format!("ブロッキングタスクの実行に失敗: {e}")))?
}

async fn read_json<T, B>(body: B) -> AppResult<T>
where
    T: DeserializeOwned,
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let bytes = Limited::new(body, MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| AppError::validation(format!("リクエストボディを読み取れません: {e}")))?
        .to_bytes();

    serde_json::from_slice(&bytes)
        .map_err(|e| AppError::validation(format!("リクエストボディが不正です: {e}")))
}

/// クエリ文字列をキーと値の組に分解する（同じキーは後の値が優先）
fn parse_query(query: Option<&str>) -> AppResult<HashMap<String, String>> {
    let url = Url::parse(&format!("http://localhost/?{}", query.unwrap_or("")))
        .map_err(|e| AppError::validation(format!("クエリ文字列が不正です: {e}")))?;

    Ok(url
        .query_pairs()
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect())
}

/// 値はそのまま返す（空文字のみ指定なしとみなす）
fn optional<'a>(params: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .map(String::as_str)
        .filter(|value| !value.is_empty())
}

fn required<'a>(params: &'a HashMap<String, String>, key: &str) -> AppResult<&'a str> {
    optional(params, key).ok_or_else(|| AppError::validation(format!("{key}は必須です")))
}

fn parse_optional_u32(params: &HashMap<String, String>, key: &str) -> AppResult<Option<u32>> {
    optional(params, key)
        .map(|raw| {
            raw.parse::<u32>().map_err(|_| {
                AppError::validation(format!("{key}は0以上の整数である必要があります: {raw}"))
            })
        })
        .transpose()
}

fn parse_uuid(field: &str, raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|e| AppError::validation(format!("{field}が不正なUUIDです: {e}")))
}

fn parse_month(field: &str, raw: &str) -> AppResult<MonthYear> {
    MonthYear::parse(raw).map_err(|e| {
        AppError::validation(format!("{field}の形式が不正です: {}", e.user_message()))
    })
}

/// 省略または空文字の場合はNone
fn parse_optional_month(field: &str, raw: Option<&str>) -> AppResult<Option<MonthYear>> {
    match raw {
        Some(raw) if !raw.is_empty() => parse_month(field, raw).map(Some),
        _ => Ok(None),
    }
}

fn method_not_allowed(method: &Method, path: &str, allowed: &[Method]) -> Response<String> {
    let allow = allowed
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(", ");

    let mut response = error_response(
        StatusCode::METHOD_NOT_ALLOWED,
        "許可されていないメソッドです",
        Some(&format!("{method} {path}")),
    );
    if let Ok(value) = HeaderValue::from_str(&allow) {
        response.headers_mut().insert(ALLOW, value);
    }
    response
}
