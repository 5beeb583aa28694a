use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match subscription_aggregator::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // ログシステムの初期化前に失敗する場合もあるため標準エラーにも出力する
            log::error!("アプリケーションの実行に失敗しました: {e}");
            eprintln!("アプリケーションの実行に失敗しました: {e}");
            ExitCode::FAILURE
        }
    }
}
