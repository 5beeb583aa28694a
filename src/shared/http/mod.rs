/// JSONレスポンスの組み立て
pub mod response;

/// HTTP/1サーバーの実行とシャットダウン
pub mod server;

pub use response::{app_error_response, error_response, json_response, ok_json, status_for};
pub use server::{serve, shutdown_signal};
