use crate::shared::database::default_database_path;
use crate::shared::errors::{AppError, AppResult};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// 既定の待ち受けホスト
pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";

/// 既定の待ち受けポート
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// アプリケーションの実行環境を表す列挙型
#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    /// 開発環境
    Development,
    /// プロダクション環境
    Production,
}

impl Environment {
    fn from_name(name: &str) -> Self {
        match name {
            "production" => Environment::Production,
            _ => Environment::Development,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

/// 環境設定を管理する構造体
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    /// 実行環境
    pub environment: Environment,
    /// ログレベル
    pub log_level: String,
    /// 待ち受けホスト
    pub server_host: String,
    /// 待ち受けポート
    pub server_port: u16,
    /// データベースファイルのパス
    pub database_path: PathBuf,
}

impl EnvironmentConfig {
    /// 環境変数から設定を読み込む
    ///
    /// # 戻り値
    /// 環境設定、または値が不正な場合は設定エラー
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 任意の取得関数から設定を読み込む
    ///
    /// # 引数
    /// * `lookup` - 変数名から値を返す関数（未設定の場合はNone）
    ///
    /// # 戻り値
    /// 環境設定、または値が不正な場合は設定エラー
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = resolve_environment(
            option_env!("EMBEDDED_ENVIRONMENT"),
            lookup("ENVIRONMENT").as_deref(),
        );

        let log_level = lookup("LOG_LEVEL").unwrap_or_else(|| match environment {
            Environment::Development => "debug".to_string(),
            Environment::Production => "info".to_string(),
        });

        let server_host = lookup("SERVER_HOST").unwrap_or_else(|| DEFAULT_SERVER_HOST.to_string());

        let server_port = match lookup("SERVER_PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|e| {
                AppError::configuration(format!("SERVER_PORTが不正です: {raw} ({e})"))
            })?,
            None => DEFAULT_SERVER_PORT,
        };

        let database_path = lookup("DATABASE_PATH")
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| default_database_path(&environment));

        Ok(Self {
            environment,
            log_level,
            server_host,
            server_port,
            database_path,
        })
    }

    /// 待ち受けアドレスを取得する
    pub fn socket_addr(&self) -> AppResult<SocketAddr> {
        let ip: IpAddr = self.server_host.parse().map_err(|e| {
            AppError::configuration(format!("SERVER_HOSTが不正です: {} ({e})", self.server_host))
        })?;

        Ok(SocketAddr::new(ip, self.server_port))
    }

    /// ログレベル文字列をフィルターに変換する（不明な値はinfo）
    pub fn level_filter(&self) -> log::LevelFilter {
        match self.log_level.to_lowercase().as_str() {
            "error" => log::LevelFilter::Error,
            "warn" => log::LevelFilter::Warn,
            "info" => log::LevelFilter::Info,
            "debug" => log::LevelFilter::Debug,
            "trace" => log::LevelFilter::Trace,
            _ => log::LevelFilter::Info,
        }
    }
}

/// 実行環境を判定する
///
/// # 判定ロジック
/// 1. コンパイル時埋め込み環境変数 EMBEDDED_ENVIRONMENT を最優先
/// 2. 実行時環境変数 ENVIRONMENT を確認
/// 3. デバッグビルドの場合は Development
/// 4. リリースビルドの場合は Production
fn resolve_environment(embedded: Option<&str>, runtime: Option<&str>) -> Environment {
    if let Some(embedded_env) = embedded {
        return Environment::from_name(embedded_env);
    }

    if let Some(env_var) = runtime {
        return Environment::from_name(env_var);
    }

    if cfg!(debug_assertions) {
        Environment::Development
    } else {
        Environment::Production
    }
}

/// 環境に応じた.envファイルを読み込む
///
/// ログシステムの初期化前に呼ばれるため、出力は標準エラーに行う。
///
/// # 処理内容
/// 1. ENVIRONMENT に応じて `.env.production` または `.env` を選択
/// 2. 環境固有のファイルがない場合はデフォルトの `.env` を試行
pub fn load_environment_variables() {
    let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

    let env_file = match environment.as_str() {
        "production" => ".env.production",
        _ => ".env",
    };

    match dotenv::from_filename(env_file) {
        Ok(path) => {
            eprintln!("環境ファイルを読み込みました: {}", path.display());
        }
        Err(_) if env_file != ".env" => match dotenv::dotenv() {
            Ok(path) => {
                eprintln!(
                    "{env_file}が見つからないため、デフォルトの環境ファイルを読み込みました: {}",
                    path.display()
                );
            }
            Err(_) => {
                eprintln!("環境変数ファイルが見つかりません。直接設定された環境変数を使用します。");
            }
        },
        Err(_) => {
            eprintln!(".envファイルが見つかりません。直接設定された環境変数を使用します。");
        }
    }
}

/// ログシステムを初期化する
///
/// # 引数
/// * `config` - 環境設定
pub fn initialize_logging_system(config: &EnvironmentConfig) {
    let result = env_logger::Builder::from_default_env()
        .filter_level(config.level_filter())
        .format_timestamp_secs()
        .format_module_path(false)
        .format_target(false)
        .try_init();

    if result.is_err() {
        log::debug!("ログシステムは既に初期化されています");
        return;
    }

    log::info!(
        "ログシステムを初期化しました: level={}, environment={}",
        config.log_level,
        config.environment.as_str()
    );
}
