use super::response::error_response;
use crate::shared::errors::AppResult;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::server::graceful::GracefulShutdown;
use std::convert::Infallible;
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpListener;

/// リクエストヘッダーの読み取りタイムアウト
pub const HEADER_READ_TIMEOUT: Duration = Duration::from_secs(15);

/// 1リクエストあたりの処理タイムアウト
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// シャットダウン時に処理中の接続を待つ最大時間
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTPサーバーを実行する
///
/// `shutdown` が完了すると新規接続の受け付けを止め、処理中の接続の終了を
/// 最大 `SHUTDOWN_TIMEOUT` まで待ってから戻る。
///
/// # 引数
/// * `listener` - バインド済みのTCPリスナー
/// * `handler` - リクエストを処理する関数
/// * `shutdown` - 完了時にシャットダウンを開始するFuture
pub async fn serve<H, Fut, S>(listener: TcpListener, handler: H, shutdown: S) -> AppResult<()>
where
    H: Fn(Request<Incoming>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Response<String>> + Send + 'static,
    S: Future<Output = ()>,
{
    let addr = listener.local_addr()?;
    log::info!("HTTPサーバーを開始しました: http://{addr}");

    let graceful = GracefulShutdown::new();
    let mut shutdown = std::pin::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        log::error!("接続受け入れエラー: {e}");
                        continue;
                    }
                };

                let handler = handler.clone();
                let service = service_fn(move |req| with_timeout(handler.clone(), req));

                let connection = http1::Builder::new()
                    .timer(TokioTimer::new())
                    .header_read_timeout(HEADER_READ_TIMEOUT)
                    .serve_connection(TokioIo::new(stream), service);
                let connection = graceful.watch(connection);

                tokio::spawn(async move {
                    if let Err(err) = connection.await {
                        log::debug!("HTTP接続処理エラー: peer={peer}, {err}");
                    }
                });
            }
            _ = &mut shutdown => {
                log::info!("シャットダウンを開始します。新規接続の受け付けを停止しました");
                break;
            }
        }
    }

    drop(listener);

    tokio::select! {
        _ = graceful.shutdown() => {
            log::info!("すべての接続が終了しました");
        }
        _ = tokio::time::sleep(SHUTDOWN_TIMEOUT) => {
            log::warn!(
                "{}秒以内に終了しなかった接続を打ち切ります",
                SHUTDOWN_TIMEOUT.as_secs()
            );
        }
    }

    Ok(())
}

async fn with_timeout<H, Fut>(
    handler: H,
    req: Request<Incoming>,
) -> Result<Response<String>, Infallible>
where
    H: Fn(Request<Incoming>) -> Fut,
    Fut: Future<Output = Response<String>>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    match tokio::time::timeout(REQUEST_TIMEOUT, handler(req)).await {
        Ok(response) => Ok(response),
        Err(_) => {
            log::warn!("リクエスト処理がタイムアウトしました: {method} {path}");
            Ok(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "リクエスト処理がタイムアウトしました",
                None,
            ))
        }
    }
}

/// SIGINTまたはSIGTERMを受信するまで待機する
pub async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => log::info!("SIGINTを受信しました"),
            Err(e) => {
                log::error!("SIGINTハンドラーの登録に失敗: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                log::info!("SIGTERMを受信しました");
            }
            Err(e) => {
                log::error!("SIGTERMハンドラーの登録に失敗: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::{BodyExt, Empty};
    use hyper::body::Bytes;
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    async fn echo_path(req: Request<Incoming>) -> Response<String> {
        Response::new(req.uri().path().to_string())
    }

    #[tokio::test]
    async fn test_serve_handles_request_and_shuts_down() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let server = tokio::spawn(serve(listener, echo_path, async move {
            let _ = stop_rx.await;
        }));

        let stream = TcpStream::connect(addr).await.unwrap();
        let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .unwrap();
        tokio::spawn(connection);

        let request = Request::builder()
            .uri("/api/v1/health")
            .header("host", addr.to_string())
            .body(Empty::<Bytes>::new())
            .unwrap();
        let response = sender.send_request(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"/api/v1/health");

        drop(sender);
        stop_tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }
}
