pub mod manager;

use crate::config::ServerConfig;
use crate::game::room::RoomSettings;
use crate::pricing::PriceQuote;
use crate::transport::ws_session::handle_socket;
use axum::{
    extract::{State, WebSocketUpgrade},
    http::Method,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use manager::{RoomManager, RoomSummary};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub rooms: Arc<RoomManager>,
    pub prices: Arc<dyn PriceQuote>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    ok: bool,
    rooms: usize,
    rate: f64,
}

#[derive(Debug, Serialize)]
struct RoomsResponse {
    rooms: Vec<RoomSummary>,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);
    Router::new()
        .route("/api/health", get(health))
        .route("/api/rooms", get(list_rooms))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn run(config: ServerConfig, prices: Arc<dyn PriceQuote>) -> anyhow::Result<()> {
    let rooms = Arc::new(RoomManager::new(
        RoomSettings::from(&config),
        Arc::clone(&prices),
    ));
    let app = router(AppState { rooms, prices });

    let address = format!("0.0.0.0:{}", config.port);
    tracing::info!(tick_rate = config.tick_rate, "arena listening on {address}");
    let listener = tokio::net::TcpListener::bind(&address).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let rooms = Arc::clone(&state.rooms);
    ws.on_upgrade(move |socket| handle_socket(socket, rooms))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        ok: true,
        rooms: state.rooms.room_count(),
        rate: state.prices.current_rate(),
    })
}

async fn list_rooms(State(state): State<AppState>) -> impl IntoResponse {
    Json(RoomsResponse {
        rooms: state.rooms.summaries().await,
    })
}
