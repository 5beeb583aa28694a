use super::migrations::run_migrations;
use crate::shared::config::Environment;
use crate::shared::errors::{AppError, AppResult};
use rusqlite::Connection;
use std::path::{Path, PathBuf};

/// アプリケーションデータを置くディレクトリ名
const APP_DIR_NAME: &str = "subscription-aggregator";

/// データベース接続を初期化し、マイグレーションを実行する
///
/// # 引数
/// * `database_path` - データベースファイルのパス
///
/// # 戻り値
/// データベース接続、または失敗時はエラー
///
/// # 処理内容
/// 1. 親ディレクトリの確保
/// 2. データベース接続の開設
/// 3. マイグレーションの実行
pub fn initialize_database(database_path: &Path) -> AppResult<Connection> {
    if let Some(parent) = database_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::configuration(format!("データディレクトリの作成に失敗: {e}"))
            })?;
            log::info!("データディレクトリを作成: {parent:?}");
        }
    }

    let is_first_run = !database_path.exists();

    let conn = Connection::open(database_path)?;

    run_migrations(&conn)?;

    if is_first_run {
        log::info!("新規データベースを作成しました: {database_path:?}");
    } else {
        log::info!("既存のデータベースを使用します: {database_path:?}");
    }

    Ok(conn)
}

/// 環境に応じた既定のデータベースファイルパスを取得する
///
/// ローカルデータディレクトリが取得できない場合はカレントディレクトリを使用する。
pub fn default_database_path(env: &Environment) -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join(APP_DIR_NAME).join(get_database_filename(env))
}

/// 環境に応じたデータベースファイル名を取得する
///
/// # ファイル名の規則
/// - 開発環境: "dev_subscriptions.db"
/// - プロダクション環境: "subscriptions.db"
pub fn get_database_filename(env: &Environment) -> &'static str {
    match env {
        Environment::Development => "dev_subscriptions.db",
        Environment::Production => "subscriptions.db",
    }
}
