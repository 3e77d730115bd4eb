use crate::{
    controller::{health_check_controller, item_controller, list_controller},
    AppState,
};
use axum::{
    routing::{delete, get, post, put},
    Router,
};

pub fn define_routes(app_state: AppState) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(list_routes(app_state.clone()))
        .merge(item_routes(app_state))
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}

fn list_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/api/list", get(list_controller::index))
        .route("/api/list", post(list_controller::create))
        .route("/api/list/:list_id", get(list_controller::read))
        .route("/api/list/:list_id", put(list_controller::update))
        .route("/api/list/:list_id", delete(list_controller::delete))
        .with_state(app_state)
}

fn item_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/api/list/:list_id/item", get(item_controller::index))
        .route("/api/list/:list_id/item", post(item_controller::create))
        .route(
            "/api/list/:list_id/item/:item_id",
            put(item_controller::update),
        )
        .route(
            "/api/list/:list_id/item/:item_id",
            delete(item_controller::delete),
        )
        .route(
            "/api/list/:list_id/item/:item_id/toggle",
            post(item_controller::toggle),
        )
        .with_state(app_state)
}
