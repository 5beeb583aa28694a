/// データベース接続の初期化
pub mod connection;

/// スキーママイグレーション
pub mod migrations;

pub use connection::{default_database_path, get_database_filename, initialize_database};
pub use migrations::run_migrations;
