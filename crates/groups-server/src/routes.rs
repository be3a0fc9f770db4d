use std::sync::Arc;

use axum::{
    http::{header, HeaderValue},
    routing::get,
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

use crate::groups::GroupService;
use crate::handlers::{self, articles as article_handlers, groups as group_handlers};
use crate::store::{ArticleStore, Stores};
use crate::Config;

#[derive(Clone)]
pub struct AppState {
    pub groups: GroupService,
    pub articles: Arc<dyn ArticleStore>,
    pub config: Config,
}

pub fn create_router(stores: Stores, config: Config) -> Router {
    let production = config.is_production();
    let state = AppState {
        groups: GroupService::new(stores.groups),
        articles: stores.articles,
        config,
    };

    let group_routes = Router::new()
        .route(
            "/",
            get(group_handlers::list_groups)
                .post(group_handlers::create_group)
                .fallback(handlers::not_found),
        )
        .route(
            "/:id",
            get(group_handlers::get_group)
                .put(group_handlers::update_group)
                .delete(group_handlers::delete_group)
                .fallback(handlers::not_found),
        );

    let article_routes = Router::new()
        .route(
            "/",
            get(article_handlers::list_articles)
                .post(article_handlers::create_article)
                .fallback(handlers::not_found),
        )
        .route(
            "/:id",
            get(article_handlers::get_article)
                .patch(article_handlers::update_article)
                .delete(article_handlers::delete_article)
                .fallback(handlers::not_found),
        );

    let mut router = Router::new()
        .route("/health", get(health_check).fallback(handlers::not_found))
        .nest("/api/v1/groups", group_routes)
        .nest("/api/v1/articles", article_routes)
        .fallback(handlers::not_found);

    // Development conveniences; a proxy handles these in production
    if !production {
        router = router.layer(
            ServiceBuilder::new()
                .layer(CorsLayer::permissive())
                .layer(CompressionLayer::new()),
        );
    }

    router
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
