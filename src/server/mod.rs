mod routes;

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use axum::http::StatusCode;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, TraceLayer};
use tracing::{error, Level};

use crate::app::App;
use crate::error::{AppError, Result};

/// Status and visitor-facing message for an error. Internal details are
/// logged, never shown.
fn error_status(e: &AppError) -> (StatusCode, String) {
    match e {
        AppError::Validation(message) => (StatusCode::BAD_REQUEST, message.clone()),
        AppError::Duplicate(_) => (StatusCode::CONFLICT, "This blog is already known".into()),
        AppError::NotFound(_) => (StatusCode::NOT_FOUND, "Nothing here yet".into()),
        AppError::Fetch(_) | AppError::FeedParse(_) | AppError::Http(_) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "No usable feed was found at that address".into(),
        ),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Something went wrong".into(),
        ),
    }
}

async fn convert_errors<F, R>(fut: F) -> axum::response::Result<R>
where
    F: Future<Output = Result<R>>,
{
    match fut.await {
        Ok(r) => Ok(r),

        Err(e) => {
            let (status, message) = error_status(&e);
            if status.is_server_error() {
                error!("Error occured while processing an HTTP request: {e}");
            } else {
                tracing::debug!("Request failed: {e}");
            }

            Err((status, message).into())
        }
    }
}

pub struct Server {
    socket: TcpListener,
    router: Router,
}

impl Server {
    pub async fn new(app: Arc<App>, bind_addr: &str) -> Result<Self> {
        use axum::routing::{get, post};

        let socket = TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("could not bind to `{bind_addr}`"))?;

        let router = Router::new()
            .route("/random", get(routes::random))
            .route("/seen", get(routes::seen))
            .route("/suggest", post(routes::suggest))
            .route("/export", get(routes::export))
            .route("/rss", get(routes::rss))
            .route("/stats", get(routes::stats))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                    .on_request(DefaultOnRequest::new().level(Level::INFO)),
            )
            .with_state(app);

        Ok(Self { socket, router })
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Serve until Ctrl-C.
    pub async fn serve(self) -> Result<()> {
        axum::serve(self.socket, self.router)
            .with_graceful_shutdown(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("could not listen for Ctrl-C: {e}");
                }
            })
            .await
            .context("HTTP server stopped")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_keep_their_message() {
        let (status, message) = error_status(&AppError::Validation("bad URL".into()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(message, "bad URL");

        let (status, _) = error_status(&AppError::Duplicate("abc".into()));
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[test]
    fn internal_errors_are_not_leaked() {
        let (status, message) =
            error_status(&AppError::Config("secret path /etc/x".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!message.contains("secret"));
    }

    #[tokio::test]
    async fn unusable_bind_address_is_reported() {
        let store = crate::db::Store::open_in_memory().await.unwrap();
        let app = App::with_store(crate::config::Config::default(), store).unwrap();

        let err = match Server::new(Arc::new(app), "not an address").await {
            Ok(_) => panic!("bound to an invalid address"),
            Err(e) => e,
        };
        assert!(matches!(err, AppError::Other(_)));
        assert!(err.to_string().contains("could not bind to `not an address`"));

        let (status, message) = error_status(&err);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!message.contains("not an address"));
    }

    #[tokio::test]
    async fn ephemeral_port_is_reported() {
        let store = crate::db::Store::open_in_memory().await.unwrap();
        let app = App::with_store(crate::config::Config::default(), store).unwrap();

        let server = Server::new(Arc::new(app), "127.0.0.1:0").await.unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);
    }
}
