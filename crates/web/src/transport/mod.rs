// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport for the control plane.

pub mod http;

use std::sync::Arc;

use axum::http::header::{HeaderValue, CACHE_CONTROL};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// REST responses must never be cached by intermediaries.
async fn no_cache(request: axum::extract::Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        CACHE_CONTROL,
        HeaderValue::from_static("no-cache, must-revalidate, private"),
    );
    response
}

/// Build the axum `Router` with all control-plane routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Libraries
        .route("/roms", get(http::list_roms))
        .route("/patches", get(http::list_patches).delete(http::recalculate_patches))
        .route(
            "/patches/{*filename}",
            get(http::applicable_patches)
                .put(http::upload_patch)
                .delete(http::recalculate_patch),
        )
        .route("/srams", get(http::list_srams).delete(http::recalculate_srams))
        .route(
            "/srams/{*filename}",
            get(http::applicable_srams).put(http::upload_sram).delete(http::recalculate_sram),
        )
        .route("/settings", get(http::list_settings).delete(http::recalculate_settings))
        .route(
            "/settings/{*filename}",
            get(http::applicable_settings).put(http::upload_setting),
        )
        // Cabinets
        .route("/cabinets", get(http::list_cabinets))
        .route(
            "/cabinets/{ip}",
            get(http::get_cabinet)
                .put(http::create_cabinet)
                .post(http::update_cabinet)
                .delete(http::delete_cabinet),
        )
        .route("/cabinets/{ip}/outlet", post(http::update_outlet))
        .route("/cabinets/{ip}/power", get(http::get_power))
        .route("/cabinets/{ip}/power/{power_state}", post(http::set_power))
        .route("/cabinets/{ip}/info", get(http::cabinet_info))
        .route("/cabinets/{ip}/games", get(http::cabinet_games).post(http::update_cabinet_games))
        .route("/cabinets/{ip}/filename", post(http::set_filename))
        // Middleware
        .layer(middleware::from_fn(no_cache))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
