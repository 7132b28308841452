use axum::Router;

use crate::state::AppState;

pub mod admin;
pub mod api;
pub mod auth;
pub mod client;
pub mod doc;
pub mod health;
pub mod pages;

// Build the API router without binding state; it will be provided at the top level.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .merge(api::router())
        .nest("/auth", auth::router())
}

/// Server-rendered pages.
pub fn create_page_router() -> Router<AppState> {
    Router::new()
        .route("/", axum::routing::get(pages::home))
        .merge(auth::page_router())
        .nest("/client", client::router())
        .nest("/admin", admin::router())
}
