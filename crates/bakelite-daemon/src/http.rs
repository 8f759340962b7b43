//! HTTP control surface.
//!
//! Thin glue over the controller: command routes invoke controller
//! operations directly (the controller serializes internally), reads return
//! the current snapshot.  There is no push endpoint; interested processes
//! poll `/api/state`, which is cheap because it never touches the player.

use crate::controller::StationController;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use bakelite_core::settings::Settings;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

type Ctrl = Arc<StationController>;

#[derive(Deserialize)]
struct PackBody {
    name: String,
}

#[derive(Deserialize)]
struct StationBody {
    name: String,
    url: String,
}

#[derive(Deserialize)]
struct ReorderBody {
    station_ids: Vec<String>,
}

// ── read routes ──────────────────────────────────────────────────────────────

async fn get_state(State(ctrl): State<Ctrl>) -> impl IntoResponse {
    Json(ctrl.snapshot().await)
}

async fn get_catalog(State(ctrl): State<Ctrl>) -> impl IntoResponse {
    Json(ctrl.catalog().await)
}

async fn get_settings(State(ctrl): State<Ctrl>) -> impl IntoResponse {
    Json(ctrl.settings().await)
}

async fn get_presets() -> impl IntoResponse {
    Json(crate::presets::preset_names())
}

// ── command routes ───────────────────────────────────────────────────────────

async fn post_station(State(ctrl): State<Ctrl>, Path(idx): Path<usize>) -> impl IntoResponse {
    ctrl.switch_to_station(idx).await;
    Json(ctrl.snapshot().await)
}

async fn post_next(State(ctrl): State<Ctrl>) -> impl IntoResponse {
    ctrl.next_station().await;
    Json(ctrl.snapshot().await)
}

async fn post_prev(State(ctrl): State<Ctrl>) -> impl IntoResponse {
    ctrl.previous_station().await;
    Json(ctrl.snapshot().await)
}

async fn post_power(State(ctrl): State<Ctrl>) -> impl IntoResponse {
    ctrl.toggle_power().await;
    Json(ctrl.snapshot().await)
}

async fn post_volume(State(ctrl): State<Ctrl>, Path(level): Path<u8>) -> impl IntoResponse {
    ctrl.set_volume(level).await;
    Json(ctrl.snapshot().await)
}

async fn post_preset(State(ctrl): State<Ctrl>, Path(name): Path<String>) -> impl IntoResponse {
    if ctrl.set_preset(&name).await {
        Json(ctrl.snapshot().await).into_response()
    } else {
        StatusCode::BAD_REQUEST.into_response()
    }
}

async fn put_settings(
    State(ctrl): State<Ctrl>,
    Json(settings): Json<Settings>,
) -> impl IntoResponse {
    ctrl.update_settings(settings).await;
    Json(ctrl.settings().await)
}

// ── pack / station CRUD ──────────────────────────────────────────────────────

async fn create_pack(State(ctrl): State<Ctrl>, Json(body): Json<PackBody>) -> impl IntoResponse {
    let id = ctrl.create_pack(&body.name).await;
    (StatusCode::CREATED, Json(serde_json::json!({ "id": id })))
}

async fn update_pack(
    State(ctrl): State<Ctrl>,
    Path(pack_id): Path<String>,
    Json(body): Json<PackBody>,
) -> StatusCode {
    if ctrl.update_pack(&pack_id, &body.name).await {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn delete_pack(State(ctrl): State<Ctrl>, Path(pack_id): Path<String>) -> StatusCode {
    if ctrl.delete_pack(&pack_id).await {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn activate_pack(State(ctrl): State<Ctrl>, Path(pack_id): Path<String>) -> StatusCode {
    if ctrl.set_active_pack(&pack_id).await {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn next_pack(State(ctrl): State<Ctrl>) -> impl IntoResponse {
    ctrl.next_pack().await;
    Json(ctrl.catalog().await)
}

async fn add_station(
    State(ctrl): State<Ctrl>,
    Path(pack_id): Path<String>,
    Json(body): Json<StationBody>,
) -> impl IntoResponse {
    match ctrl.add_station(&pack_id, &body.name, &body.url).await {
        Some(id) => (StatusCode::CREATED, Json(serde_json::json!({ "id": id }))).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn update_station(
    State(ctrl): State<Ctrl>,
    Path((pack_id, station_id)): Path<(String, String)>,
    Json(body): Json<StationBody>,
) -> StatusCode {
    if ctrl
        .update_station(&pack_id, &station_id, &body.name, &body.url)
        .await
    {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn delete_station(
    State(ctrl): State<Ctrl>,
    Path((pack_id, station_id)): Path<(String, String)>,
) -> StatusCode {
    if ctrl.delete_station(&pack_id, &station_id).await {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn reorder_stations(
    State(ctrl): State<Ctrl>,
    Path(pack_id): Path<String>,
    Json(body): Json<ReorderBody>,
) -> StatusCode {
    if ctrl.reorder_stations(&pack_id, &body.station_ids).await {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

// ── server startup ───────────────────────────────────────────────────────────

pub fn router(controller: Ctrl) -> Router {
    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/station/:idx", post(post_station))
        .route("/api/next", post(post_next))
        .route("/api/prev", post(post_prev))
        .route("/api/power", post(post_power))
        .route("/api/volume/:level", post(post_volume))
        .route("/api/presets", get(get_presets))
        .route("/api/preset/:name", post(post_preset))
        .route("/api/settings", get(get_settings).put(put_settings))
        .route("/api/packs", get(get_catalog).post(create_pack))
        .route("/api/packs/next", post(next_pack))
        .route("/api/packs/:id", put(update_pack).delete(delete_pack))
        .route("/api/packs/:id/activate", post(activate_pack))
        .route("/api/packs/:id/stations", post(add_station))
        .route("/api/packs/:id/stations/reorder", post(reorder_stations))
        .route(
            "/api/packs/:id/stations/:sid",
            put(update_station).delete(delete_station),
        )
        .with_state(controller)
}

pub fn start_server(
    bind_address: String,
    port: u16,
    controller: Ctrl,
) -> tokio::task::JoinHandle<()> {
    let app = router(controller);
    tokio::spawn(async move {
        let addr = format!("{}:{}", bind_address, port);
        info!("Control API listening on http://{}", addr);
        let listener = match tokio::net::TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                warn!("Failed to bind control API on {}: {}", addr, e);
                return;
            }
        };
        if let Err(e) = axum::serve(listener, app).await {
            warn!("Control API error: {}", e);
        }
    })
}
