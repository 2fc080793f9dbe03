use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use strum_macros::{AsRefStr, Display};
use thiserror::Error;
use tracing::error;

use crate::event::BroadcastHub;
use crate::game::repository::GameRepository;

/// Shared application state containing all dependencies
#[derive(Clone)]
pub struct AppState {
    pub game_repository: Arc<dyn GameRepository + Send + Sync>,
    pub hub: BroadcastHub,
}

impl AppState {
    pub fn new(game_repository: Arc<dyn GameRepository + Send + Sync>, hub: BroadcastHub) -> Self {
        Self {
            game_repository,
            hub,
        }
    }
}

/// Machine-readable reason for a rejected operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Rejection {
    InvalidPlayerName,
    NameTaken,
    GameAlreadyStarted,
    WrongPhase,
    EmptyWord,
    TooManyLetters,
    InvalidLetter,
    BadGuessCount,
    SelfGuess,
    DuplicateCard,
    InvalidCard,
    UnknownOpponent,
    NotYourTurn,
    NoScoringInProgress,
}

impl Rejection {
    fn status(self) -> StatusCode {
        match self {
            Rejection::GameAlreadyStarted
            | Rejection::WrongPhase
            | Rejection::SelfGuess
            | Rejection::NotYourTurn
            | Rejection::NoScoringInProgress => StatusCode::FORBIDDEN,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Rejected: {0}")]
    Rejected(Rejection),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Player token does not belong to this game")]
    TokenMismatch,

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal server error")]
    Internal,
}

impl AppError {
    /// The rejection reason, if this error is an ordinary rejection
    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            AppError::Rejected(reason) => Some(*reason),
            _ => None,
        }
    }
}

impl From<Rejection> for AppError {
    fn from(reason: Rejection) -> Self {
        AppError::Rejected(reason)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::DatabaseError(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Rejected(reason) => (reason.status(), reason.as_ref().to_string()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::TokenMismatch => (
                StatusCode::BAD_REQUEST,
                "player_token does not match associated game".to_string(),
            ),
            AppError::DatabaseError(msg) => {
                error!(error = %msg, "Storage failure while handling request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error".to_string(),
                )
            }
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error".to_string(),
            ),
        };

        let body = Json(json!({
            "error": error_message
        }));

        (status, body).into_response()
    }
}
