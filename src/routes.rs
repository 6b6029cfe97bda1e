// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    config::Config,
    handlers::{auth, comment, community, feedback, interaction, notification, oauth},
    state::AppState,
    utils::jwt::auth_middleware,
};

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Assembles the main application router.
///
/// * Everything lives under `/api/v1`.
/// * The auth middleware runs on every route; handlers pick `Claims` (required)
///   or `MaybeClaims` (optional).
/// * Applies global middleware (Trace, CORS) and injects `AppState`.
pub fn create_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/token", post(auth::login))
        .route("/token/refresh", post(auth::refresh))
        .route("/me", get(auth::get_me).put(auth::update_me))
        .route("/oauth/google", post(oauth::google_oauth));

    let post_routes = Router::new()
        .route("/", get(community::list_posts).post(community::create_post))
        .route("/saved", get(community::list_saved))
        .route(
            "/{id}",
            get(community::get_post)
                .put(community::update_post)
                .patch(community::patch_post)
                .delete(community::delete_post),
        )
        .route("/{id}/vote", post(interaction::vote_post))
        .route("/{id}/save", post(interaction::toggle_save));

    let comment_routes = Router::new()
        .route("/", get(comment::list_comments).post(comment::create_comment))
        .route(
            "/{id}",
            get(comment::get_comment)
                .put(comment::update_comment)
                .patch(comment::update_comment)
                .delete(comment::delete_comment),
        )
        .route("/{id}/vote", post(interaction::vote_comment));

    let notification_routes = Router::new()
        .route("/", get(notification::list_notifications))
        .route("/mark_all_read", post(notification::mark_all_read))
        .route("/unread_count", get(notification::unread_count))
        .route("/{id}/mark_read", post(notification::mark_read));

    let feedback_routes = Router::new().route(
        "/",
        get(feedback::list_feedback).post(feedback::create_feedback),
    );

    let api = Router::new()
        .merge(auth_routes)
        .nest("/posts", post_routes)
        .nest("/comments", comment_routes)
        .nest("/notifications", notification_routes)
        .nest("/feedback", feedback_routes);

    Router::new()
        .nest("/api/v1", api)
        // Global Middleware (outermost first)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&state.config))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                )),
        )
        .with_state(state)
}
