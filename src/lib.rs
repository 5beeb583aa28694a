pub mod features;
pub mod shared;

use features::subscriptions::{handle_request, SqliteSubscriptionRepository, SubscriptionService};
use log::{error, info};
use shared::config::{initialize_logging_system, load_environment_variables, EnvironmentConfig};
use shared::database::initialize_database;
use shared::errors::AppResult;
use shared::http::{serve, shutdown_signal};
use std::sync::Arc;
use tokio::net::TcpListener;

/// アプリケーションを起動する
///
/// # 処理内容
/// 1. 環境変数の読み込みと設定の構築
/// 2. ログシステムの初期化
/// 3. データベースの初期化（マイグレーション含む）
/// 4. HTTPサーバーの起動（SIGINT/SIGTERMで終了）
pub async fn run() -> AppResult<()> {
    load_environment_variables();

    let config = EnvironmentConfig::from_env()?;
    initialize_logging_system(&config);

    info!("アプリケーション初期化を開始します...");

    info!("データベースを初期化しています: {:?}", config.database_path);
    let db_conn = initialize_database(&config.database_path).map_err(|e| {
        error!("データベースの初期化に失敗しました: {e}");
        e
    })?;
    info!("データベースの初期化が完了しました");

    let service = Arc::new(SubscriptionService::new(SqliteSubscriptionRepository::new(
        db_conn,
    )));

    let addr = config.socket_addr()?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!("ポートのバインドに失敗しました: {addr} ({e})");
        e
    })?;

    info!(
        "アプリケーション初期化が完了しました: environment={}",
        config.environment.as_str()
    );

    serve(
        listener,
        move |req| handle_request(req, Arc::clone(&service)),
        shutdown_signal(),
    )
    .await?;

    info!("アプリケーションを終了しました");
    Ok(())
}
