/// 環境設定関連のモジュール
pub mod environment;

// 便利な再エクスポート
pub use environment::{
    initialize_logging_system, load_environment_variables, Environment, EnvironmentConfig,
};
