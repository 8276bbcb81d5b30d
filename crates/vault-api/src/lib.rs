pub mod handlers;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

pub use handlers::ApiState;

pub async fn serve(state: ApiState, bind_addr: &str, port: u16) -> anyhow::Result<()> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/roots", get(handlers::list_roots))
        .route("/roots/{label}/mkdir", post(handlers::mkdir))
        .route("/roots/{label}/link", post(handlers::link))
        .route("/roots/{label}/unlink", post(handlers::unlink))
        .route("/roots/{label}/stat", get(handlers::stat))
        .route("/roots/{label}/list", get(handlers::list))
        .route("/roots/{label}/push", post(handlers::push_root))
        .route("/roots/{label}/pull", post(handlers::pull_root))
        .route("/chunks/{hex}", get(handlers::get_chunk))
        .route(
            "/chunks",
            put(handlers::put_chunk).layer(DefaultBodyLimit::max(256 * 1024 * 1024)),
        )
        .with_state(state);

    let app = Router::new().nest("/api", api_routes).layer(cors);

    let listener = tokio::net::TcpListener::bind(format!("{bind_addr}:{port}")).await?;
    tracing::info!(bind_addr, port, "vault-api listening");
    axum::serve(listener, app).await?;
    Ok(())
}
