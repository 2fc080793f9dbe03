use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum_macros::{AsRefStr, Display, EnumString};

use super::models::{GameModel, GuessModel, PlayerId, PlayerModel, WordModel};
use super::repository::GameRepository;
use crate::shared::AppError;

/// A game needs at least this many players before a round can start
pub const MIN_PLAYERS: usize = 3;

/// Stage of the current round. Never stored, always derived from a
/// [`RoundSnapshot`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Phase {
    WaitForReady,
    SubmitWord,
    AssignWords,
    Score,
}

/// Everything the phase depends on, read from the store in one go
#[derive(Debug, Clone)]
pub struct RoundSnapshot {
    pub game: GameModel,
    /// Ascending id order
    pub players: Vec<PlayerModel>,
    /// Words of `game.round` only
    pub words: Vec<WordModel>,
    /// Guesses of `game.round` only
    pub guesses: Vec<GuessModel>,
}

impl RoundSnapshot {
    pub async fn load(
        repository: &(dyn GameRepository + Send + Sync),
        game: GameModel,
    ) -> Result<Self, AppError> {
        let players = repository.list_players(game.id).await?;
        let words = repository.list_words(game.id, Some(game.round)).await?;
        let guesses = repository.list_guesses(game.id, Some(game.round)).await?;
        Ok(Self {
            game,
            players,
            words,
            guesses,
        })
    }

    pub fn phase(&self) -> Phase {
        resolve_phase(self)
    }

    /// The word `player_id` owns in this round
    pub fn word_of(&self, player_id: PlayerId) -> Option<&WordModel> {
        self.words.iter().find(|w| w.player_id == Some(player_id))
    }

    pub fn guesses_by(&self, player_id: PlayerId) -> impl Iterator<Item = &GuessModel> {
        self.guesses.iter().filter(move |g| g.player_id == player_id)
    }

    /// Everyone confirmed the round but no words were dealt yet, either
    /// because the last confirmation is still dealing or because its deal failed
    pub fn awaits_deal(&self) -> bool {
        let round = self.game.round;
        self.players.len() >= MIN_PLAYERS
            && self.players.iter().all(|p| p.is_ready_for(round))
            && self.words.is_empty()
    }
}

/// Derives the phase from the round's players, words and guesses.
///
/// Rules apply in order: readiness first, then submitted words, then the
/// guess count of every player; anything left is scoring.
pub fn resolve_phase(snapshot: &RoundSnapshot) -> Phase {
    let round = snapshot.game.round;
    let players = &snapshot.players;

    if players.len() < MIN_PLAYERS || players.iter().any(|p| !p.is_ready_for(round)) {
        return Phase::WaitForReady;
    }

    // A ready player without an assigned word counts as not yet submitted
    let all_submitted = players.iter().all(|p| {
        snapshot
            .word_of(p.id)
            .map_or(false, |word| word.is_submitted())
    });
    if !all_submitted {
        return Phase::SubmitWord;
    }

    let mut guess_counts: HashMap<PlayerId, usize> = HashMap::new();
    for guess in &snapshot.guesses {
        *guess_counts.entry(guess.player_id).or_insert(0) += 1;
    }
    let expected = players.len() - 1;
    if players
        .iter()
        .any(|p| guess_counts.get(&p.id).copied().unwrap_or(0) != expected)
    {
        return Phase::AssignWords;
    }

    Phase::Score
}
