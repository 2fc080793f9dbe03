use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::models::{CardId, PlayerId, Round};
use super::phase::Phase;

/// Request payload for creating or joining a game
#[derive(Debug, Deserialize)]
pub struct PlayerNameRequest {
    pub player_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateGameResponse {
    pub game_token: String,
    pub player_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JoinGameResponse {
    pub player_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PlayersResponse {
    pub players: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitWordRequest {
    pub word: String,
}

/// Opponent player id to the card id guessed for that opponent's word
pub type Guesses = BTreeMap<PlayerId, CardId>;

/// Request and response body for a player's guesses
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GuessesPayload {
    pub guesses: Guesses,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreboardRow {
    pub name: String,
    pub score_total: i64,
    pub score_own_words: i64,
    pub score_correct_guesses: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScoreboardResponse {
    pub scoreboard: Vec<ScoreboardRow>,
}

/// Everything one player's client renders, as seen by that player
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Board {
    pub phase: Phase,
    pub round: Round,
    #[serde(rename = "self")]
    pub own: OwnView,
    pub players: Vec<BoardPlayer>,
    pub cards: Vec<BoardCard>,
    pub currently_scored: Option<CurrentlyScored>,
    pub scoreboard_order: Vec<PlayerId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct OwnView {
    pub card: Option<BoardCard>,
    pub letters: String,
    pub word: String,
    pub is_ready: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BoardPlayer {
    pub id: PlayerId,
    pub name: String,
    pub is_ready: bool,
    pub is_self: bool,
    pub letters: String,
    pub word: String,
    pub score_total: i64,
    pub score_own_words: i64,
    pub score_correct_guesses: i64,
    pub all_words_assigned: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BoardCard {
    pub id: CardId,
    pub text: String,
    pub is_self: bool,
    /// Owner, revealed for the viewer's own card and for scored words
    pub player_id: Option<PlayerId>,
    /// Viewer's points on this card, once scored
    pub score: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurrentlyScored {
    pub player_id: PlayerId,
    pub word: String,
    /// Guessing player id to the card they named for this word
    pub guesses: Guesses,
}
