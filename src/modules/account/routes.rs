use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::AppState;

use super::controller;

pub fn account_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/me", get(controller::me))
        .route("/history", get(controller::history))
        .route("/face/request", post(controller::update_face_request))
        .route("/face/confirm", post(controller::update_face_confirm))
        .route("/delete/request", post(controller::delete_request))
        .route("/delete/confirm", post(controller::delete_confirm))
}
