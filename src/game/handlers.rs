use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{info, instrument};

use super::{
    service::GameService,
    types::{
        Board, CreateGameResponse, GuessesPayload, JoinGameResponse, PlayerNameRequest,
        PlayersResponse, ScoreboardResponse, SubmitWordRequest,
    },
};
use crate::shared::{AppError, AppState};

fn service(state: &AppState) -> GameService {
    GameService::new(Arc::clone(&state.game_repository), state.hub.clone())
}

/// POST /api/games
#[instrument(name = "create_game", skip(state))]
pub async fn create_game(
    State(state): State<AppState>,
    Json(request): Json<PlayerNameRequest>,
) -> Result<(StatusCode, Json<CreateGameResponse>), AppError> {
    let created = service(&state).create_game(&request.player_name).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// POST /api/games/:game_token/players
#[instrument(name = "join_game", skip(state, game_token))]
pub async fn join_game(
    State(state): State<AppState>,
    Path(game_token): Path<String>,
    Json(request): Json<PlayerNameRequest>,
) -> Result<(StatusCode, Json<JoinGameResponse>), AppError> {
    let joined = service(&state)
        .join_game(&game_token, &request.player_name)
        .await?;
    Ok((StatusCode::CREATED, Json(joined)))
}

/// GET /api/games/:game_token/players
#[instrument(name = "list_players", skip_all)]
pub async fn list_players(
    State(state): State<AppState>,
    Path(game_token): Path<String>,
) -> Result<Json<PlayersResponse>, AppError> {
    Ok(Json(service(&state).list_players(&game_token).await?))
}

/// GET /api/games/:game_token/scoreboard
#[instrument(name = "get_scoreboard", skip_all)]
pub async fn get_scoreboard(
    State(state): State<AppState>,
    Path(game_token): Path<String>,
) -> Result<Json<ScoreboardResponse>, AppError> {
    Ok(Json(service(&state).get_scoreboard(&game_token).await?))
}

/// GET /api/games/:game_token/events
///
/// Server-sent events whose name tells the client what to re-fetch. The
/// subscription closes when the client disconnects and the stream is dropped.
#[instrument(name = "stream_events", skip_all)]
pub async fn stream_events(
    State(state): State<AppState>,
    Path(game_token): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let subscription = service(&state).stream_events(&game_token).await?;
    info!(game_id = subscription.game_id(), "Event stream opened");

    let events = subscription
        .into_stream()
        .map(|event| Ok(Event::default().event(event.as_ref()).data("")));
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// PUT /api/games/:game_token/players/:player_token/ready
#[instrument(name = "mark_ready", skip_all)]
pub async fn mark_ready(
    State(state): State<AppState>,
    Path((game_token, player_token)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    service(&state).mark_ready(&game_token, &player_token).await?;
    Ok(StatusCode::OK)
}

/// GET /api/games/:game_token/players/:player_token
#[instrument(name = "get_board", skip_all)]
pub async fn get_board(
    State(state): State<AppState>,
    Path((game_token, player_token)): Path<(String, String)>,
) -> Result<Json<Board>, AppError> {
    Ok(Json(
        service(&state).get_board(&game_token, &player_token).await?,
    ))
}

/// PUT /api/games/:game_token/players/:player_token/word
#[instrument(name = "submit_word", skip_all)]
pub async fn submit_word(
    State(state): State<AppState>,
    Path((game_token, player_token)): Path<(String, String)>,
    Json(request): Json<SubmitWordRequest>,
) -> Result<StatusCode, AppError> {
    service(&state)
        .submit_word(&game_token, &player_token, &request.word)
        .await?;
    Ok(StatusCode::OK)
}

/// GET /api/games/:game_token/players/:player_token/guesses
#[instrument(name = "get_guesses", skip_all)]
pub async fn get_guesses(
    State(state): State<AppState>,
    Path((game_token, player_token)): Path<(String, String)>,
) -> Result<Json<GuessesPayload>, AppError> {
    let guesses = service(&state)
        .get_guesses(&game_token, &player_token)
        .await?;
    Ok(Json(GuessesPayload { guesses }))
}

/// PUT /api/games/:game_token/players/:player_token/guesses
#[instrument(name = "submit_guesses", skip_all)]
pub async fn submit_guesses(
    State(state): State<AppState>,
    Path((game_token, player_token)): Path<(String, String)>,
    Json(request): Json<GuessesPayload>,
) -> Result<StatusCode, AppError> {
    service(&state)
        .submit_guesses(&game_token, &player_token, &request.guesses)
        .await?;
    Ok(StatusCode::OK)
}

/// PUT /api/games/:game_token/players/:player_token/scored
#[instrument(name = "mark_scored", skip_all)]
pub async fn mark_scored(
    State(state): State<AppState>,
    Path((game_token, player_token)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    service(&state)
        .mark_scored(&game_token, &player_token)
        .await?;
    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::create_router;
    use crate::shared::test_utils::AppStateBuilder;
    use axum::{body::Body, http::Request, Router};
    use serde_json::Value;
    use tower::ServiceExt; // for `oneshot`

    fn app() -> Router {
        create_router(AppStateBuilder::new().build())
    }

    fn json_request(method: &str, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_create_game_handler() {
        let app = app();

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/games", r#"{"player_name": "alice"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created: CreateGameResponse =
            serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(created.game_token.len(), 32);
        assert_ne!(created.game_token, created.player_token);

        let uri = format!("/api/games/{}/players", created.game_token);
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["players"][0], "alice");
    }

    #[tokio::test]
    async fn test_create_game_handler_invalid_name() {
        let response = app()
            .oneshot(json_request("POST", "/api/games", r#"{"player_name": "x"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "invalid_player_name");
    }

    #[tokio::test]
    async fn test_create_game_handler_invalid_json() {
        let response = app()
            .oneshot(json_request("POST", "/api/games", r#"{"name": "alice"}"#))
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_unknown_game_token() {
        let response = app()
            .oneshot(json_request(
                "POST",
                "/api/games/missing/players",
                r#"{"player_name": "bob"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "invalid game_token");
    }

    #[tokio::test]
    async fn test_submit_word_out_of_phase_is_forbidden() {
        let app = app();
        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/games", r#"{"player_name": "alice"}"#))
            .await
            .unwrap();
        let created: CreateGameResponse =
            serde_json::from_value(body_json(response).await).unwrap();

        let uri = format!(
            "/api/games/{}/players/{}/word",
            created.game_token, created.player_token
        );
        let response = app
            .oneshot(json_request("PUT", &uri, r#"{"word": "AB"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await["error"], "wrong_phase");
    }

    #[tokio::test]
    async fn test_event_stream_is_sse() {
        let app = app();
        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/games", r#"{"player_name": "alice"}"#))
            .await
            .unwrap();
        let created: CreateGameResponse =
            serde_json::from_value(body_json(response).await).unwrap();

        let uri = format!("/api/games/{}/events", created.game_token);
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"].to_str().unwrap(),
            "text/event-stream"
        );
    }
}
