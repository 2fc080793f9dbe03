use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub type GameId = i64;
pub type PlayerId = i64;
pub type CardId = i64;
pub type WordId = i64;
pub type Round = i64;

/// Creates an opaque access token for a game or player
pub fn generate_token() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Database model for games table
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct GameModel {
    pub id: GameId,
    pub token: String,
    pub round: Round, // Starts at 1, incremented once every owned word of the round is scored
    pub created_at: DateTime<Utc>,
}

/// Database model for players table
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct PlayerModel {
    pub id: PlayerId,
    pub game_id: GameId,
    pub token: String,
    pub name: String, // Unique within the game
    pub ready_round: Round, // Latest round the player confirmed readiness for
}

impl PlayerModel {
    pub fn is_ready_for(&self, round: Round) -> bool {
        self.ready_round >= round
    }
}

/// Database model for cards table, shared across all games
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct CardModel {
    pub id: CardId,
    pub text: String,
}

/// Database model for words table
///
/// One card assigned to a game round. Words without a player are decoys.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct WordModel {
    pub id: WordId,
    pub game_id: GameId,
    pub round: Round,
    pub card_id: CardId,
    pub player_id: Option<PlayerId>,
    pub text: String, // Empty until the owner submits
    pub letters: String,
    pub is_scored: bool,
}

impl WordModel {
    pub fn is_decoy(&self) -> bool {
        self.player_id.is_none()
    }

    pub fn is_submitted(&self) -> bool {
        !self.text.is_empty()
    }
}

/// Database model for guesses table
///
/// A player's claim that `card_id` is the card behind `word_id`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct GuessModel {
    pub id: i64,
    pub game_id: GameId,
    pub round: Round,
    pub player_id: PlayerId,
    pub word_id: WordId,
    pub card_id: CardId,
}

/// Global usage of a card, as seen from one game
#[derive(Debug, Clone, FromRow, PartialEq)]
pub struct CardUsage {
    pub card_id: CardId,
    pub total_uses: i64,
    pub used_in_game: bool,
}

/// A word row to be inserted as part of a round assignment
#[derive(Debug, Clone, PartialEq)]
pub struct NewWord {
    pub card_id: CardId,
    pub player_id: Option<PlayerId>,
    pub letters: String,
}

/// A guess row to be inserted for the calling player
#[derive(Debug, Clone, PartialEq)]
pub struct NewGuess {
    pub word_id: WordId,
    pub card_id: CardId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_tokens_are_opaque_and_distinct() {
        let first = generate_token();
        let second = generate_token();
        assert_eq!(first.len(), 32);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(first, second);
    }

    #[test]
    fn test_player_readiness() {
        let player = PlayerModel {
            id: 1,
            game_id: 1,
            token: "t".to_string(),
            name: "alice".to_string(),
            ready_round: 2,
        };
        assert!(player.is_ready_for(2));
        assert!(!player.is_ready_for(3));
    }
}
