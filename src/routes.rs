use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::game;
use crate::shared::AppState;

/// Builds the HTTP API around the shared state
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/games", post(game::create_game))
        .route(
            "/api/games/:game_token/players",
            get(game::list_players).post(game::join_game),
        )
        .route("/api/games/:game_token/scoreboard", get(game::get_scoreboard))
        .route("/api/games/:game_token/events", get(game::stream_events))
        .route(
            "/api/games/:game_token/players/:player_token",
            get(game::get_board),
        )
        .route(
            "/api/games/:game_token/players/:player_token/ready",
            put(game::mark_ready),
        )
        .route(
            "/api/games/:game_token/players/:player_token/word",
            put(game::submit_word),
        )
        .route(
            "/api/games/:game_token/players/:player_token/guesses",
            get(game::get_guesses).put(game::submit_guesses),
        )
        .route(
            "/api/games/:game_token/players/:player_token/scored",
            put(game::mark_scored),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
