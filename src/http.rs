use crate::repositories::{AuthorRepository, BookRepository};
use anyhow::Context;
use axum::Router;
use axum::routing::{get, post, put};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub mod handler;

#[derive(Debug, Clone)]
pub struct AppState<AR, BR> {
    pub author_repo: AR,
    pub book_repo: BR,
}

impl<AR, BR> AppState<AR, BR>
where
    AR: AuthorRepository,
    BR: BookRepository,
{
    pub const fn new(author_repo: AR, book_repo: BR) -> Self {
        Self {
            author_repo,
            book_repo,
        }
    }
}

#[derive(Debug)]
pub struct HttpServerConfig {
    port: u16,
}

impl HttpServerConfig {
    #[must_use]
    pub const fn new(port: u16) -> Self {
        Self { port }
    }
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new<AR, BR>(
        state: AppState<AR, BR>,
        config: HttpServerConfig,
    ) -> anyhow::Result<Self>
    where
        AR: AuthorRepository + Clone,
        BR: BookRepository + Clone,
    {
        let router = Router::new()
            .nest("/api/v1", api_routes())
            .layer(TraceLayer::new_for_http())
            .with_state(state);

        let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port))
            .await
            .with_context(|| format!("Failed to bind to port {}", config.port))?;

        Ok(Self { router, listener })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        tracing::info!("Listening on {}", self.listener.local_addr()?);
        axum::serve(self.listener, self.router)
            .await
            .context("Received error from running server")?;
        Ok(())
    }
}

fn api_routes<AR, BR>() -> Router<AppState<AR, BR>>
where
    AR: AuthorRepository + Clone,
    BR: BookRepository + Clone,
{
    Router::new()
        .route("/authors", post(handler::create_author::<AR, BR>))
        .route("/authors/{id}", put(handler::update_author::<AR, BR>))
        .route(
            "/authors/{id}/books",
            get(handler::list_author_books::<AR, BR>),
        )
        .route("/books", post(handler::create_book::<AR, BR>))
        .route("/books/{id}", put(handler::update_book::<AR, BR>))
}
