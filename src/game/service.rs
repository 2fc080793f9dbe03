use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, instrument, warn};

use super::letters::{LetterPool, WordCheck};
use super::models::{generate_token, CardId, GameModel, NewGuess, PlayerModel, WordModel};
use super::phase::{Phase, RoundSnapshot};
use super::repository::{AddPlayerResult, GameRepository, MarkScoredResult, SubmitWordResult};
use super::round::{start_new_round, RoundStart};
use super::scoring::{compute_scores, currently_scored_word, ranked_scores, word_points_for};
use super::types::{
    Board, BoardCard, BoardPlayer, CreateGameResponse, CurrentlyScored, Guesses,
    JoinGameResponse, OwnView, PlayersResponse, ScoreboardResponse, ScoreboardRow,
};
use crate::event::{BroadcastHub, EventSubscription, GameEvent};
use crate::shared::{AppError, Rejection};

static PLAYER_NAME: LazyLock<Regex> = LazyLock::new(|| {
    // 2 to 16 characters, no whitespace at either end, inner plain spaces allowed
    Regex::new(r"^\S(\S| ){0,14}\S$").expect("player name pattern compiles")
});

pub fn is_valid_player_name(name: &str) -> bool {
    PLAYER_NAME.is_match(name)
}

/// Service for game operations: authenticates tokens, gates every
/// operation on the derived phase and notifies watchers after each change
pub struct GameService {
    repository: Arc<dyn GameRepository + Send + Sync>,
    hub: BroadcastHub,
}

impl GameService {
    pub fn new(repository: Arc<dyn GameRepository + Send + Sync>, hub: BroadcastHub) -> Self {
        Self { repository, hub }
    }

    #[instrument(skip(self))]
    pub async fn create_game(&self, player_name: &str) -> Result<CreateGameResponse, AppError> {
        validate_name(player_name)?;

        let game_token = generate_token();
        let player_token = generate_token();
        let (game, player) = self
            .repository
            .create_game(&game_token, player_name, &player_token)
            .await?;

        info!(game_id = game.id, player_id = player.id, "Game created");
        Ok(CreateGameResponse {
            game_token,
            player_token,
        })
    }

    #[instrument(skip(self, game_token))]
    pub async fn join_game(
        &self,
        game_token: &str,
        player_name: &str,
    ) -> Result<JoinGameResponse, AppError> {
        validate_name(player_name)?;
        let game = self.game(game_token).await?;

        let snapshot = self.snapshot(game).await?;
        if snapshot.game.round != 1 || snapshot.phase() != Phase::WaitForReady {
            debug!(game_id = snapshot.game.id, "Join refused, game already started");
            return Err(Rejection::GameAlreadyStarted.into());
        }

        let player_token = generate_token();
        let player = match self
            .repository
            .try_add_player(snapshot.game.id, player_name, &player_token)
            .await?
        {
            AddPlayerResult::Added(player) => player,
            AddPlayerResult::NameTaken => return Err(Rejection::NameTaken.into()),
            AddPlayerResult::GameStarted => return Err(Rejection::GameAlreadyStarted.into()),
            AddPlayerResult::GameNotFound => {
                return Err(AppError::NotFound("invalid game_token".to_string()))
            }
        };

        info!(game_id = player.game_id, player_id = player.id, "Player joined game");
        self.notify(player.game_id, &[GameEvent::Players, GameEvent::Scoreboard]);
        Ok(JoinGameResponse { player_token })
    }

    #[instrument(skip(self, game_token))]
    pub async fn list_players(&self, game_token: &str) -> Result<PlayersResponse, AppError> {
        let game = self.game(game_token).await?;
        let players = self.repository.list_players(game.id).await?;
        Ok(PlayersResponse {
            players: players.into_iter().map(|p| p.name).collect(),
        })
    }

    /// Confirms readiness for the current round and deals the round once
    /// the last player is ready. A confirmation that arrives while the
    /// round still awaits its deal retries the deal.
    #[instrument(skip(self, game_token, player_token))]
    pub async fn mark_ready(&self, game_token: &str, player_token: &str) -> Result<(), AppError> {
        let (game, player) = self.authenticate(game_token, player_token).await?;
        let mut snapshot = self.snapshot(game).await?;

        if !snapshot.awaits_deal() {
            require_phase(&snapshot, Phase::WaitForReady)?;
            self.repository
                .mark_ready(player.id)
                .await?
                .ok_or_else(|| AppError::NotFound("invalid player_token".to_string()))?;
            debug!(player_id = player.id, round = snapshot.game.round, "Player ready");
            snapshot = self.snapshot(snapshot.game).await?;
        }

        let game_id = snapshot.game.id;
        self.deal_if_due(snapshot).await?;

        self.notify(game_id, &[GameEvent::Board]);
        Ok(())
    }

    #[instrument(skip(self, game_token, player_token))]
    pub async fn submit_word(
        &self,
        game_token: &str,
        player_token: &str,
        text: &str,
    ) -> Result<(), AppError> {
        let (game, player) = self.authenticate(game_token, player_token).await?;
        let snapshot = self.snapshot(game).await?;
        require_phase(&snapshot, Phase::SubmitWord)?;
        let snapshot = self.deal_if_due(snapshot).await?;

        let word = snapshot
            .word_of(player.id)
            .ok_or_else(|| AppError::NotFound("no word assigned".to_string()))?;

        match LetterPool::from(word.letters.as_str()).check(text) {
            WordCheck::Valid => {}
            WordCheck::Empty => return Err(Rejection::EmptyWord.into()),
            WordCheck::TooLong => return Err(Rejection::TooManyLetters.into()),
            WordCheck::InvalidLetter(letter) => {
                debug!(player_id = player.id, %letter, "Word uses a letter outside the pool");
                return Err(Rejection::InvalidLetter.into());
            }
        }

        match self.repository.submit_word_text(word.id, text).await? {
            SubmitWordResult::Submitted => {}
            SubmitWordResult::RoundClosed => return Err(Rejection::WrongPhase.into()),
        }

        info!(player_id = player.id, word_id = word.id, "Word submitted");
        self.notify(snapshot.game.id, &[GameEvent::Board]);
        Ok(())
    }

    #[instrument(skip(self, game_token, player_token))]
    pub async fn submit_guesses(
        &self,
        game_token: &str,
        player_token: &str,
        guesses: &Guesses,
    ) -> Result<(), AppError> {
        let (game, player) = self.authenticate(game_token, player_token).await?;
        let snapshot = self.snapshot(game).await?;
        require_phase(&snapshot, Phase::AssignWords)?;

        let new_guesses = validate_guesses(&snapshot, &player, guesses)?;
        self.repository
            .replace_guesses(
                snapshot.game.id,
                snapshot.game.round,
                player.id,
                &new_guesses,
            )
            .await?;

        info!(player_id = player.id, guess_count = new_guesses.len(), "Guesses submitted");
        self.notify(snapshot.game.id, &[GameEvent::Board]);
        Ok(())
    }

    /// The caller's own guesses for the round, keyed by opponent
    #[instrument(skip(self, game_token, player_token))]
    pub async fn get_guesses(
        &self,
        game_token: &str,
        player_token: &str,
    ) -> Result<Guesses, AppError> {
        let (game, player) = self.authenticate(game_token, player_token).await?;
        let snapshot = self.snapshot(game).await?;
        require_phase(&snapshot, Phase::AssignWords)?;

        let owners: HashMap<_, _> = snapshot
            .words
            .iter()
            .filter_map(|w| w.player_id.map(|owner| (w.id, owner)))
            .collect();
        Ok(snapshot
            .guesses_by(player.id)
            .filter_map(|g| owners.get(&g.word_id).map(|owner| (*owner, g.card_id)))
            .collect())
    }

    /// Reveals the currently scored word. Only its owner may do this.
    #[instrument(skip(self, game_token, player_token))]
    pub async fn mark_scored(&self, game_token: &str, player_token: &str) -> Result<(), AppError> {
        let (game, player) = self.authenticate(game_token, player_token).await?;
        let snapshot = self.snapshot(game).await?;
        require_phase(&snapshot, Phase::Score)?;

        let word = currently_scored_word(&snapshot.words)
            .ok_or(AppError::Rejected(Rejection::NoScoringInProgress))?;
        if word.player_id != Some(player.id) {
            debug!(player_id = player.id, owner = ?word.player_id, "Not the scored word's owner");
            return Err(Rejection::NotYourTurn.into());
        }

        match self
            .repository
            .mark_word_scored(snapshot.game.id, snapshot.game.round, word.id)
            .await?
        {
            MarkScoredResult::Scored { round_advanced } => {
                info!(word_id = word.id, round_advanced, "Word scored");
            }
            MarkScoredResult::AlreadyScored | MarkScoredResult::StaleRound => {
                debug!(word_id = word.id, "Word was scored by a concurrent request");
            }
        }

        self.notify(snapshot.game.id, &[GameEvent::Board, GameEvent::Scoreboard]);
        Ok(())
    }

    #[instrument(skip(self, game_token, player_token))]
    pub async fn get_board(&self, game_token: &str, player_token: &str) -> Result<Board, AppError> {
        let (game, viewer) = self.authenticate(game_token, player_token).await?;
        let snapshot = self.snapshot(game).await?;
        let phase = snapshot.phase();
        let game = &snapshot.game;

        let all_words = self.repository.list_words(game.id, None).await?;
        let all_guesses = self.repository.list_guesses(game.id, None).await?;
        let scores = compute_scores(&snapshot.players, &all_words, &all_guesses);
        let scoreboard_order = ranked_scores(&snapshot.players, &all_words, &all_guesses)
            .into_iter()
            .map(|s| s.player_id)
            .collect();

        // Each player is shown with the round they last confirmed
        let word_in_ready_round = |player: &PlayerModel| -> Option<&WordModel> {
            all_words
                .iter()
                .find(|w| w.round == player.ready_round && w.player_id == Some(player.id))
        };

        let view_words: Vec<&WordModel> = all_words
            .iter()
            .filter(|w| w.round == viewer.ready_round)
            .collect();
        let card_ids: Vec<CardId> = view_words.iter().map(|w| w.card_id).collect();
        let card_texts: HashMap<CardId, String> = self
            .repository
            .list_cards(&card_ids)
            .await?
            .into_iter()
            .map(|c| (c.id, c.text))
            .collect();
        let view_guesses: Vec<_> = all_guesses
            .iter()
            .filter(|g| g.round == viewer.ready_round)
            .cloned()
            .collect();

        let cards: Vec<BoardCard> = view_words
            .iter()
            .map(|word| {
                let is_self = word.player_id == Some(viewer.id);
                BoardCard {
                    id: word.card_id,
                    text: card_texts.get(&word.card_id).cloned().unwrap_or_default(),
                    is_self,
                    player_id: if is_self || word.is_scored {
                        word.player_id
                    } else {
                        None
                    },
                    score: word
                        .is_scored
                        .then(|| word_points_for(viewer.id, word, &view_guesses)),
                }
            })
            .collect();

        let expected_guesses = snapshot.players.len().saturating_sub(1);
        let mut players = Vec::with_capacity(snapshot.players.len());
        let mut own = OwnView {
            card: cards.iter().find(|c| c.is_self).cloned(),
            ..OwnView::default()
        };
        for player in &snapshot.players {
            let word = word_in_ready_round(player);
            let score = scores.get(&player.id);
            let is_ready = player.is_ready_for(game.round);
            let letters = word.map(|w| w.letters.clone()).unwrap_or_default();
            let text = word.map(|w| w.text.clone()).unwrap_or_default();

            if player.id == viewer.id {
                own.is_ready = is_ready;
                own.letters = letters.clone();
                own.word = text.clone();
            }

            players.push(BoardPlayer {
                id: player.id,
                name: player.name.clone(),
                is_ready,
                is_self: player.id == viewer.id,
                letters,
                word: text,
                score_total: score.map_or(0, |s| s.total),
                score_own_words: score.map_or(0, |s| s.own_words),
                score_correct_guesses: score.map_or(0, |s| s.correct_guesses),
                all_words_assigned: snapshot.guesses_by(player.id).count() == expected_guesses,
            });
        }

        let currently_scored = if phase == Phase::Score {
            currently_scored_word(&snapshot.words).and_then(|word| {
                word.player_id.map(|owner| CurrentlyScored {
                    player_id: owner,
                    word: word.text.clone(),
                    guesses: snapshot
                        .guesses
                        .iter()
                        .filter(|g| g.word_id == word.id)
                        .map(|g| (g.player_id, g.card_id))
                        .collect(),
                })
            })
        } else {
            None
        };

        Ok(Board {
            phase,
            round: game.round,
            own,
            players,
            cards,
            currently_scored,
            scoreboard_order,
        })
    }

    #[instrument(skip(self, game_token))]
    pub async fn get_scoreboard(&self, game_token: &str) -> Result<ScoreboardResponse, AppError> {
        let game = self.game(game_token).await?;
        let players = self.repository.list_players(game.id).await?;
        let words = self.repository.list_words(game.id, None).await?;
        let guesses = self.repository.list_guesses(game.id, None).await?;

        let names: HashMap<_, _> = players.iter().map(|p| (p.id, p.name.clone())).collect();
        let scoreboard = ranked_scores(&players, &words, &guesses)
            .into_iter()
            .map(|score| ScoreboardRow {
                name: names.get(&score.player_id).cloned().unwrap_or_default(),
                score_total: score.total,
                score_own_words: score.own_words,
                score_correct_guesses: score.correct_guesses,
            })
            .collect();

        Ok(ScoreboardResponse { scoreboard })
    }

    /// Opens a live event subscription for the game
    #[instrument(skip(self, game_token))]
    pub async fn stream_events(&self, game_token: &str) -> Result<EventSubscription, AppError> {
        let game = self.game(game_token).await?;
        self.hub.subscribe(game.id).await.map_err(|e| {
            warn!(game_id = game.id, error = %e, "Event subscription failed");
            AppError::Internal
        })
    }

    async fn game(&self, game_token: &str) -> Result<GameModel, AppError> {
        self.repository
            .get_game_by_token(game_token)
            .await?
            .ok_or_else(|| AppError::NotFound("invalid game_token".to_string()))
    }

    /// Resolves both tokens and checks that the player belongs to the game
    async fn authenticate(
        &self,
        game_token: &str,
        player_token: &str,
    ) -> Result<(GameModel, PlayerModel), AppError> {
        let game = self.game(game_token).await?;
        let player = self
            .repository
            .get_player_by_token(player_token)
            .await?
            .ok_or_else(|| AppError::NotFound("invalid player_token".to_string()))?;
        if player.game_id != game.id {
            return Err(AppError::TokenMismatch);
        }
        Ok((game, player))
    }

    async fn snapshot(&self, game: GameModel) -> Result<RoundSnapshot, AppError> {
        RoundSnapshot::load(self.repository.as_ref(), game).await
    }

    /// Deals the round when everyone is ready and no words exist yet,
    /// returning the snapshot with the dealt words
    async fn deal_if_due(&self, snapshot: RoundSnapshot) -> Result<RoundSnapshot, AppError> {
        if !snapshot.awaits_deal() {
            return Ok(snapshot);
        }
        match start_new_round(self.repository.as_ref(), &snapshot.game).await? {
            RoundStart::Started(_) => {}
            RoundStart::AlreadyStarted => debug!("Round dealt by a concurrent request"),
        }
        self.snapshot(snapshot.game).await
    }

    /// Publishes after a committed change. Delivery problems never fail the request.
    fn notify(&self, game_id: i64, events: &[GameEvent]) {
        for event in events {
            if let Err(e) = self.hub.publish(game_id, *event) {
                warn!(game_id, %event, error = %e, "Failed to publish game event");
            }
        }
    }
}

fn validate_name(name: &str) -> Result<(), AppError> {
    if is_valid_player_name(name) {
        Ok(())
    } else {
        Err(Rejection::InvalidPlayerName.into())
    }
}

fn require_phase(snapshot: &RoundSnapshot, expected: Phase) -> Result<(), AppError> {
    let phase = snapshot.phase();
    if phase != expected {
        debug!(game_id = snapshot.game.id, %phase, %expected, "Operation out of phase");
        return Err(Rejection::WrongPhase.into());
    }
    Ok(())
}

/// Checks a guess set against the round and turns it into rows
fn validate_guesses(
    snapshot: &RoundSnapshot,
    player: &PlayerModel,
    guesses: &Guesses,
) -> Result<Vec<NewGuess>, AppError> {
    if guesses.len() != snapshot.players.len().saturating_sub(1) {
        return Err(Rejection::BadGuessCount.into());
    }
    if guesses.contains_key(&player.id) {
        return Err(Rejection::SelfGuess.into());
    }

    let round_cards: HashSet<CardId> = snapshot.words.iter().map(|w| w.card_id).collect();
    let mut used_cards = HashSet::new();
    let mut rows = Vec::with_capacity(guesses.len());
    for (opponent, card_id) in guesses {
        let word = snapshot
            .word_of(*opponent)
            .ok_or(AppError::Rejected(Rejection::UnknownOpponent))?;
        if !used_cards.insert(*card_id) {
            return Err(Rejection::DuplicateCard.into());
        }
        if !round_cards.contains(card_id) {
            return Err(Rejection::InvalidCard.into());
        }
        rows.push(NewGuess {
            word_id: word.id,
            card_id: *card_id,
        });
    }
    Ok(rows)
}
