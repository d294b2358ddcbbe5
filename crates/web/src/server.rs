//! Web server implementation

use std::future::Future;

use anyhow::Context;
use axum::{
    http::Method,
    response::{Html, IntoResponse},
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::config::ResponderConfig;

/// The page served for every request.
pub const HELLO_PAGE: &str = "<html><body>Hello World</body></html>";

/// Build the responder router.
///
/// There are no routes: a single fallback answers every method and path.
pub fn router() -> Router {
    Router::new()
        .fallback(hello_handler)
        .layer(TraceLayer::new_for_http())
}

/// Bind `config.addr` and serve until the process is terminated or receives
/// SIGTERM / Ctrl-C.
pub async fn serve(config: ResponderConfig) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;

    serve_with_shutdown(listener, shutdown_signal()).await
}

/// Serve on an already-bound listener until `signal` resolves.
pub async fn serve_with_shutdown<F>(listener: TcpListener, signal: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!("Responder listening on http://{}", addr);

    axum::serve(listener, router())
        .with_graceful_shutdown(signal)
        .await?;

    info!("Responder on {} stopped", addr);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn hello_handler(method: Method, uri: axum::http::Uri) -> impl IntoResponse {
    debug!(%method, %uri, "serving hello page");
    Html(HELLO_PAGE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    async fn request(method: Method, uri: &str) -> (StatusCode, String, Option<String>) {
        let resp = router()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = resp.status();
        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap(), content_type)
    }

    #[tokio::test]
    async fn test_root_serves_hello_page() {
        let (status, body, content_type) = request(Method::GET, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, HELLO_PAGE);
        assert!(content_type.unwrap().starts_with("text/html"));
    }

    #[tokio::test]
    async fn test_any_path_and_method_serves_hello_page() {
        for (method, uri) in [
            (Method::GET, "/does/not/exist"),
            (Method::POST, "/"),
            (Method::PUT, "/submit?x=1"),
            (Method::DELETE, "/items/42"),
        ] {
            let (status, body, _) = request(method.clone(), uri).await;
            assert_eq!(status, StatusCode::OK, "{} {}", method, uri);
            assert_eq!(body, HELLO_PAGE, "{} {}", method, uri);
        }
    }

    #[tokio::test]
    async fn test_serve_with_shutdown_stops_on_signal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let task = tokio::spawn(serve_with_shutdown(listener, async {
            let _ = rx.await;
        }));

        // The listener is bound before serving starts, so connecting succeeds.
        tokio::net::TcpStream::connect(addr).await.unwrap();

        tx.send(()).unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_serve_reports_bind_conflict() {
        let holder = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = holder.local_addr().unwrap();

        let err = serve(ResponderConfig { addr }).await.unwrap_err();
        assert!(err.to_string().contains(&addr.to_string()));
    }
}
