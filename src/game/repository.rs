use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument, warn};

use super::models::{
    CardId, CardModel, CardUsage, GameId, GameModel, GuessModel, NewGuess, NewWord, PlayerId,
    PlayerModel, Round, WordId, WordModel,
};
use crate::shared::AppError;

/// Result of attempting to add a player to a game
#[derive(Debug, Clone, PartialEq)]
pub enum AddPlayerResult {
    Added(PlayerModel),
    /// Another player of the game already uses this name
    NameTaken,
    /// The game left its first round or already has words dealt
    GameStarted,
    GameNotFound,
}

/// Result of attempting to commit a round's word assignment
#[derive(Debug, Clone, PartialEq)]
pub enum InsertRoundResult {
    Inserted(Vec<WordModel>),
    /// The round already has words, another request started it first
    AlreadyStarted,
    /// One of the cards was taken by this game in the meantime
    CardConflict,
    /// The game is no longer in the given round
    StaleRound,
}

/// Result of attempting to store a word's text
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitWordResult {
    Submitted,
    /// Every owned word of the round already has a text, or the round is over
    RoundClosed,
}

/// Result of attempting to mark a word as scored
#[derive(Debug, Clone, PartialEq)]
pub enum MarkScoredResult {
    Scored { round_advanced: bool },
    AlreadyScored,
    StaleRound,
}

/// Transactional store for games, players, cards, words and guesses
///
/// Every method is atomic. Compound writes either apply fully or not at all.
#[async_trait]
pub trait GameRepository {
    /// Creates a game in round 1 together with its first player
    async fn create_game(
        &self,
        game_token: &str,
        player_name: &str,
        player_token: &str,
    ) -> Result<(GameModel, PlayerModel), AppError>;
    async fn get_game(&self, game_id: GameId) -> Result<Option<GameModel>, AppError>;
    async fn get_game_by_token(&self, token: &str) -> Result<Option<GameModel>, AppError>;
    async fn get_player_by_token(&self, token: &str) -> Result<Option<PlayerModel>, AppError>;

    /// Players of a game in ascending id order
    async fn list_players(&self, game_id: GameId) -> Result<Vec<PlayerModel>, AppError>;

    /// Adds a player unless the name is already taken within the game or
    /// the game has started
    async fn try_add_player(
        &self,
        game_id: GameId,
        name: &str,
        token: &str,
    ) -> Result<AddPlayerResult, AppError>;

    /// Sets the player's ready round to the game's current round
    async fn mark_ready(&self, player_id: PlayerId) -> Result<Option<PlayerModel>, AppError>;

    /// Words of a game in ascending id order, for one round or all rounds
    async fn list_words(
        &self,
        game_id: GameId,
        round: Option<Round>,
    ) -> Result<Vec<WordModel>, AppError>;

    /// Guesses of a game in ascending id order, for one round or all rounds
    async fn list_guesses(
        &self,
        game_id: GameId,
        round: Option<Round>,
    ) -> Result<Vec<GuessModel>, AppError>;

    async fn list_cards(&self, ids: &[CardId]) -> Result<Vec<CardModel>, AppError>;

    /// Usage of every card across all games, flagged with whether `game_id`
    /// has used it
    async fn card_usage(&self, game_id: GameId) -> Result<Vec<CardUsage>, AppError>;

    /// Inserts all words of a round at once
    async fn insert_round_words(
        &self,
        game_id: GameId,
        round: Round,
        words: &[NewWord],
    ) -> Result<InsertRoundResult, AppError>;

    /// Stores the text while the word's round is still collecting words
    async fn submit_word_text(
        &self,
        word_id: WordId,
        text: &str,
    ) -> Result<SubmitWordResult, AppError>;

    /// Replaces the player's guesses for the round
    async fn replace_guesses(
        &self,
        game_id: GameId,
        round: Round,
        player_id: PlayerId,
        guesses: &[NewGuess],
    ) -> Result<(), AppError>;

    /// Flags the word as scored and advances the game's round once no
    /// unscored owned word of the round remains
    async fn mark_word_scored(
        &self,
        game_id: GameId,
        round: Round,
        word_id: WordId,
    ) -> Result<MarkScoredResult, AppError>;

    /// Inserts cards whose text is not yet known, returns how many were new
    async fn import_cards(&self, texts: &[String]) -> Result<u64, AppError>;
}

#[derive(Default)]
struct Tables {
    games: BTreeMap<GameId, GameModel>,
    players: BTreeMap<PlayerId, PlayerModel>,
    cards: BTreeMap<CardId, CardModel>,
    words: BTreeMap<WordId, WordModel>,
    guesses: BTreeMap<i64, GuessModel>,
    last_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }
}

/// In-memory implementation of GameRepository for development and testing
///
/// All tables sit behind one mutex, so each trait method is a single
/// atomic transaction.
pub struct InMemoryGameRepository {
    tables: Mutex<Tables>,
}

impl Default for InMemoryGameRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGameRepository {
    /// Creates a new empty in-memory repository
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
        }
    }

    /// Creates an in-memory repository with pre-populated cards
    pub fn with_cards(texts: &[String]) -> Self {
        let mut tables = Tables::default();
        for text in texts {
            let id = tables.next_id();
            tables.cards.insert(
                id,
                CardModel {
                    id,
                    text: text.clone(),
                },
            );
        }
        Self {
            tables: Mutex::new(tables),
        }
    }

    /// Returns the current number of cards in the repository
    pub fn card_count(&self) -> usize {
        self.tables.lock().map(|t| t.cards.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, AppError> {
        self.tables
            .lock()
            .map_err(|_| AppError::DatabaseError("in-memory store poisoned".to_string()))
    }
}

#[async_trait]
impl GameRepository for InMemoryGameRepository {
    #[instrument(skip(self, game_token, player_token))]
    async fn create_game(
        &self,
        game_token: &str,
        player_name: &str,
        player_token: &str,
    ) -> Result<(GameModel, PlayerModel), AppError> {
        let mut tables = self.lock()?;

        let game = GameModel {
            id: tables.next_id(),
            token: game_token.to_string(),
            round: 1,
            created_at: Utc::now(),
        };
        let player = PlayerModel {
            id: tables.next_id(),
            game_id: game.id,
            token: player_token.to_string(),
            name: player_name.to_string(),
            ready_round: 0,
        };
        tables.games.insert(game.id, game.clone());
        tables.players.insert(player.id, player.clone());

        debug!(game_id = game.id, player_id = player.id, "Game created in memory");
        Ok((game, player))
    }

    async fn get_game(&self, game_id: GameId) -> Result<Option<GameModel>, AppError> {
        Ok(self.lock()?.games.get(&game_id).cloned())
    }

    async fn get_game_by_token(&self, token: &str) -> Result<Option<GameModel>, AppError> {
        let tables = self.lock()?;
        Ok(tables.games.values().find(|g| g.token == token).cloned())
    }

    async fn get_player_by_token(&self, token: &str) -> Result<Option<PlayerModel>, AppError> {
        let tables = self.lock()?;
        Ok(tables.players.values().find(|p| p.token == token).cloned())
    }

    async fn list_players(&self, game_id: GameId) -> Result<Vec<PlayerModel>, AppError> {
        let tables = self.lock()?;
        Ok(tables
            .players
            .values()
            .filter(|p| p.game_id == game_id)
            .cloned()
            .collect())
    }

    #[instrument(skip(self, token))]
    async fn try_add_player(
        &self,
        game_id: GameId,
        name: &str,
        token: &str,
    ) -> Result<AddPlayerResult, AppError> {
        let mut tables = self.lock()?;

        let Some(round) = tables.games.get(&game_id).map(|g| g.round) else {
            return Ok(AddPlayerResult::GameNotFound);
        };
        if round != 1 || tables.words.values().any(|w| w.game_id == game_id) {
            debug!(game_id, round, "Game already started");
            return Ok(AddPlayerResult::GameStarted);
        }
        let taken = tables
            .players
            .values()
            .any(|p| p.game_id == game_id && p.name == name);
        if taken {
            debug!(game_id, name = %name, "Player name already taken");
            return Ok(AddPlayerResult::NameTaken);
        }

        let player = PlayerModel {
            id: tables.next_id(),
            game_id,
            token: token.to_string(),
            name: name.to_string(),
            ready_round: 0,
        };
        tables.players.insert(player.id, player.clone());

        debug!(game_id, player_id = player.id, "Player added in memory");
        Ok(AddPlayerResult::Added(player))
    }

    async fn mark_ready(&self, player_id: PlayerId) -> Result<Option<PlayerModel>, AppError> {
        let mut tables = self.lock()?;

        let Some(game_id) = tables.players.get(&player_id).map(|p| p.game_id) else {
            return Ok(None);
        };
        let Some(round) = tables.games.get(&game_id).map(|g| g.round) else {
            return Ok(None);
        };
        let player = tables.players.get_mut(&player_id).map(|p| {
            p.ready_round = round;
            p.clone()
        });
        Ok(player)
    }

    async fn list_words(
        &self,
        game_id: GameId,
        round: Option<Round>,
    ) -> Result<Vec<WordModel>, AppError> {
        let tables = self.lock()?;
        Ok(tables
            .words
            .values()
            .filter(|w| w.game_id == game_id && round.map_or(true, |r| w.round == r))
            .cloned()
            .collect())
    }

    async fn list_guesses(
        &self,
        game_id: GameId,
        round: Option<Round>,
    ) -> Result<Vec<GuessModel>, AppError> {
        let tables = self.lock()?;
        Ok(tables
            .guesses
            .values()
            .filter(|g| g.game_id == game_id && round.map_or(true, |r| g.round == r))
            .cloned()
            .collect())
    }

    async fn list_cards(&self, ids: &[CardId]) -> Result<Vec<CardModel>, AppError> {
        let tables = self.lock()?;
        Ok(ids
            .iter()
            .filter_map(|id| tables.cards.get(id).cloned())
            .collect())
    }

    async fn card_usage(&self, game_id: GameId) -> Result<Vec<CardUsage>, AppError> {
        let tables = self.lock()?;
        let mut usage: BTreeMap<CardId, CardUsage> = tables
            .cards
            .keys()
            .map(|&card_id| {
                (
                    card_id,
                    CardUsage {
                        card_id,
                        total_uses: 0,
                        used_in_game: false,
                    },
                )
            })
            .collect();

        for word in tables.words.values() {
            if let Some(entry) = usage.get_mut(&word.card_id) {
                entry.total_uses += 1;
                entry.used_in_game |= word.game_id == game_id;
            }
        }

        Ok(usage.into_values().collect())
    }

    #[instrument(skip(self, words), fields(word_count = words.len()))]
    async fn insert_round_words(
        &self,
        game_id: GameId,
        round: Round,
        words: &[NewWord],
    ) -> Result<InsertRoundResult, AppError> {
        let mut tables = self.lock()?;

        match tables.games.get(&game_id) {
            Some(game) if game.round == round => {}
            Some(_) => return Ok(InsertRoundResult::StaleRound),
            None => return Err(AppError::NotFound(format!("game {game_id}"))),
        }

        let mut used: HashSet<CardId> = HashSet::new();
        for word in tables.words.values().filter(|w| w.game_id == game_id) {
            if word.round == round {
                debug!(game_id, round, "Round already has words");
                return Ok(InsertRoundResult::AlreadyStarted);
            }
            used.insert(word.card_id);
        }
        for word in words {
            if !tables.cards.contains_key(&word.card_id) || !used.insert(word.card_id) {
                warn!(game_id, round, card_id = word.card_id, "Card conflict in round assignment");
                return Ok(InsertRoundResult::CardConflict);
            }
        }

        let mut inserted = Vec::with_capacity(words.len());
        for word in words {
            let model = WordModel {
                id: tables.next_id(),
                game_id,
                round,
                card_id: word.card_id,
                player_id: word.player_id,
                text: String::new(),
                letters: word.letters.clone(),
                is_scored: false,
            };
            tables.words.insert(model.id, model.clone());
            inserted.push(model);
        }

        info!(game_id, round, word_count = inserted.len(), "Round words inserted");
        Ok(InsertRoundResult::Inserted(inserted))
    }

    async fn submit_word_text(
        &self,
        word_id: WordId,
        text: &str,
    ) -> Result<SubmitWordResult, AppError> {
        let mut tables = self.lock()?;

        let (game_id, round) = tables
            .words
            .get(&word_id)
            .map(|w| (w.game_id, w.round))
            .ok_or_else(|| AppError::NotFound(format!("word {word_id}")))?;
        let current = tables.games.get(&game_id).map(|g| g.round);
        let collecting = tables
            .words
            .values()
            .any(|w| w.game_id == game_id && w.round == round && !w.is_decoy() && !w.is_submitted());
        if current != Some(round) || !collecting {
            debug!(word_id, round, "Round no longer collecting words");
            return Ok(SubmitWordResult::RoundClosed);
        }

        if let Some(word) = tables.words.get_mut(&word_id) {
            word.text = text.to_string();
        }
        Ok(SubmitWordResult::Submitted)
    }

    #[instrument(skip(self, guesses), fields(guess_count = guesses.len()))]
    async fn replace_guesses(
        &self,
        game_id: GameId,
        round: Round,
        player_id: PlayerId,
        guesses: &[NewGuess],
    ) -> Result<(), AppError> {
        let mut tables = self.lock()?;

        let mut seen = HashSet::new();
        for guess in guesses {
            if !tables.words.contains_key(&guess.word_id)
                || !seen.insert((guess.word_id, guess.card_id))
            {
                return Err(AppError::DatabaseError(
                    "guess violates word reference or uniqueness".to_string(),
                ));
            }
        }

        tables
            .guesses
            .retain(|_, g| !(g.game_id == game_id && g.round == round && g.player_id == player_id));
        for guess in guesses {
            let model = GuessModel {
                id: tables.next_id(),
                game_id,
                round,
                player_id,
                word_id: guess.word_id,
                card_id: guess.card_id,
            };
            tables.guesses.insert(model.id, model);
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn mark_word_scored(
        &self,
        game_id: GameId,
        round: Round,
        word_id: WordId,
    ) -> Result<MarkScoredResult, AppError> {
        let mut tables = self.lock()?;

        match tables.games.get(&game_id) {
            Some(game) if game.round == round => {}
            Some(_) => return Ok(MarkScoredResult::StaleRound),
            None => return Err(AppError::NotFound(format!("game {game_id}"))),
        }

        match tables.words.get_mut(&word_id) {
            Some(word) if word.game_id == game_id && word.round == round => {
                if word.is_scored {
                    return Ok(MarkScoredResult::AlreadyScored);
                }
                word.is_scored = true;
            }
            _ => return Err(AppError::NotFound(format!("word {word_id}"))),
        }

        let remaining = tables.words.values().any(|w| {
            w.game_id == game_id && w.round == round && !w.is_decoy() && !w.is_scored
        });
        if !remaining {
            if let Some(game) = tables.games.get_mut(&game_id) {
                game.round += 1;
                info!(game_id, next_round = game.round, "Round completed");
            }
        }

        Ok(MarkScoredResult::Scored {
            round_advanced: !remaining,
        })
    }

    async fn import_cards(&self, texts: &[String]) -> Result<u64, AppError> {
        let mut tables = self.lock()?;
        let mut known: HashSet<String> = tables.cards.values().map(|c| c.text.clone()).collect();

        let mut inserted = 0;
        for text in texts {
            if known.insert(text.clone()) {
                let id = tables.next_id();
                tables.cards.insert(
                    id,
                    CardModel {
                        id,
                        text: text.clone(),
                    },
                );
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}
