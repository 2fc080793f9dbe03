use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, info, instrument, warn};

use super::models::{
    CardId, CardModel, CardUsage, GameId, GameModel, GuessModel, NewGuess, NewWord, PlayerId,
    PlayerModel, Round, WordId, WordModel,
};
use super::repository::{
    AddPlayerResult, GameRepository, InsertRoundResult, MarkScoredResult, SubmitWordResult,
};
use crate::shared::AppError;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS games (
        id BIGSERIAL PRIMARY KEY,
        token TEXT NOT NULL UNIQUE,
        round BIGINT NOT NULL DEFAULT 1,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS players (
        id BIGSERIAL PRIMARY KEY,
        game_id BIGINT NOT NULL REFERENCES games (id),
        token TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        ready_round BIGINT NOT NULL DEFAULT 0,
        UNIQUE (game_id, name)
    )",
    "CREATE TABLE IF NOT EXISTS cards (
        id BIGSERIAL PRIMARY KEY,
        text TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS words (
        id BIGSERIAL PRIMARY KEY,
        game_id BIGINT NOT NULL REFERENCES games (id),
        round BIGINT NOT NULL,
        card_id BIGINT NOT NULL REFERENCES cards (id),
        player_id BIGINT REFERENCES players (id),
        text TEXT NOT NULL DEFAULT '',
        letters TEXT NOT NULL,
        is_scored BOOLEAN NOT NULL DEFAULT FALSE,
        UNIQUE (game_id, card_id)
    )",
    "CREATE TABLE IF NOT EXISTS guesses (
        id BIGSERIAL PRIMARY KEY,
        game_id BIGINT NOT NULL REFERENCES games (id),
        round BIGINT NOT NULL,
        player_id BIGINT NOT NULL REFERENCES players (id),
        word_id BIGINT NOT NULL REFERENCES words (id),
        card_id BIGINT NOT NULL REFERENCES cards (id),
        UNIQUE (game_id, round, player_id, word_id, card_id)
    )",
    "CREATE INDEX IF NOT EXISTS words_game_round ON words (game_id, round)",
    "CREATE INDEX IF NOT EXISTS guesses_game_round ON guesses (game_id, round)",
];

const PLAYER_COLUMNS: &str = "id, game_id, token, name, ready_round";
const WORD_COLUMNS: &str = "id, game_id, round, card_id, player_id, text, letters, is_scored";

fn db_error(context: &'static str) -> impl Fn(sqlx::Error) -> AppError {
    move |e| {
        warn!(error = %e, context, "Database operation failed");
        AppError::DatabaseError(e.to_string())
    }
}

/// PostgreSQL implementation of game repository
///
/// Compound writes run in one transaction and lock the game row first,
/// so concurrent requests for the same game are serialized.
pub struct PostgresGameRepository {
    pool: PgPool,
}

impl PostgresGameRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the tables if they do not exist yet
    #[instrument(skip(self))]
    pub async fn init_schema(&self) -> Result<(), AppError> {
        for statement in SCHEMA {
            sqlx::query(*statement)
                .execute(&self.pool)
                .await
                .map_err(db_error("init schema"))?;
        }
        info!("Database schema ready");
        Ok(())
    }
}

#[async_trait]
impl GameRepository for PostgresGameRepository {
    #[instrument(skip(self, game_token, player_token))]
    async fn create_game(
        &self,
        game_token: &str,
        player_name: &str,
        player_token: &str,
    ) -> Result<(GameModel, PlayerModel), AppError> {
        let mut tx = self.pool.begin().await.map_err(db_error("begin"))?;

        let game = sqlx::query_as::<_, GameModel>(
            "INSERT INTO games (token) VALUES ($1) RETURNING id, token, round, created_at",
        )
        .bind(game_token)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("insert game"))?;

        let player = sqlx::query_as::<_, PlayerModel>(&format!(
            "INSERT INTO players (game_id, token, name) VALUES ($1, $2, $3) RETURNING {PLAYER_COLUMNS}"
        ))
        .bind(game.id)
        .bind(player_token)
        .bind(player_name)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("insert host player"))?;

        tx.commit().await.map_err(db_error("commit"))?;
        debug!(game_id = game.id, player_id = player.id, "Game created in database");
        Ok((game, player))
    }

    async fn get_game(&self, game_id: GameId) -> Result<Option<GameModel>, AppError> {
        sqlx::query_as::<_, GameModel>(
            "SELECT id, token, round, created_at FROM games WHERE id = $1",
        )
        .bind(game_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("get game"))
    }

    async fn get_game_by_token(&self, token: &str) -> Result<Option<GameModel>, AppError> {
        sqlx::query_as::<_, GameModel>(
            "SELECT id, token, round, created_at FROM games WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("get game by token"))
    }

    async fn get_player_by_token(&self, token: &str) -> Result<Option<PlayerModel>, AppError> {
        sqlx::query_as::<_, PlayerModel>(&format!(
            "SELECT {PLAYER_COLUMNS} FROM players WHERE token = $1"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("get player by token"))
    }

    async fn list_players(&self, game_id: GameId) -> Result<Vec<PlayerModel>, AppError> {
        sqlx::query_as::<_, PlayerModel>(&format!(
            "SELECT {PLAYER_COLUMNS} FROM players WHERE game_id = $1 ORDER BY id"
        ))
        .bind(game_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("list players"))
    }

    #[instrument(skip(self, token))]
    async fn try_add_player(
        &self,
        game_id: GameId,
        name: &str,
        token: &str,
    ) -> Result<AddPlayerResult, AppError> {
        let mut tx = self.pool.begin().await.map_err(db_error("begin"))?;

        let round: Option<Round> =
            sqlx::query_scalar("SELECT round FROM games WHERE id = $1 FOR UPDATE")
                .bind(game_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_error("lock game"))?;
        let Some(round) = round else {
            return Ok(AddPlayerResult::GameNotFound);
        };

        let dealt: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM words WHERE game_id = $1)")
                .bind(game_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(db_error("check dealt words"))?;
        if round != 1 || dealt {
            debug!(game_id, round, "Game already started");
            return Ok(AddPlayerResult::GameStarted);
        }

        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM players WHERE game_id = $1 AND name = $2)",
        )
        .bind(game_id)
        .bind(name)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("check player name"))?;
        if taken {
            debug!(game_id, name = %name, "Player name already taken");
            return Ok(AddPlayerResult::NameTaken);
        }

        let player = sqlx::query_as::<_, PlayerModel>(&format!(
            "INSERT INTO players (game_id, token, name) VALUES ($1, $2, $3) RETURNING {PLAYER_COLUMNS}"
        ))
        .bind(game_id)
        .bind(token)
        .bind(name)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("insert player"))?;

        tx.commit().await.map_err(db_error("commit"))?;
        Ok(AddPlayerResult::Added(player))
    }

    async fn mark_ready(&self, player_id: PlayerId) -> Result<Option<PlayerModel>, AppError> {
        sqlx::query_as::<_, PlayerModel>(
            "UPDATE players AS p SET ready_round = g.round FROM games AS g
             WHERE p.id = $1 AND g.id = p.game_id
             RETURNING p.id, p.game_id, p.token, p.name, p.ready_round",
        )
        .bind(player_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("mark ready"))
    }

    async fn list_words(
        &self,
        game_id: GameId,
        round: Option<Round>,
    ) -> Result<Vec<WordModel>, AppError> {
        sqlx::query_as::<_, WordModel>(&format!(
            "SELECT {WORD_COLUMNS} FROM words
             WHERE game_id = $1 AND ($2::BIGINT IS NULL OR round = $2)
             ORDER BY id"
        ))
        .bind(game_id)
        .bind(round)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("list words"))
    }

    async fn list_guesses(
        &self,
        game_id: GameId,
        round: Option<Round>,
    ) -> Result<Vec<GuessModel>, AppError> {
        sqlx::query_as::<_, GuessModel>(
            "SELECT id, game_id, round, player_id, word_id, card_id FROM guesses
             WHERE game_id = $1 AND ($2::BIGINT IS NULL OR round = $2)
             ORDER BY id",
        )
        .bind(game_id)
        .bind(round)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("list guesses"))
    }

    async fn list_cards(&self, ids: &[CardId]) -> Result<Vec<CardModel>, AppError> {
        sqlx::query_as::<_, CardModel>("SELECT id, text FROM cards WHERE id = ANY($1) ORDER BY id")
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("list cards"))
    }

    async fn card_usage(&self, game_id: GameId) -> Result<Vec<CardUsage>, AppError> {
        sqlx::query_as::<_, CardUsage>(
            "SELECT c.id AS card_id,
                    COUNT(w.id) AS total_uses,
                    COALESCE(BOOL_OR(w.game_id = $1), FALSE) AS used_in_game
             FROM cards AS c
             LEFT JOIN words AS w ON w.card_id = c.id
             GROUP BY c.id
             ORDER BY c.id",
        )
        .bind(game_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("card usage"))
    }

    #[instrument(skip(self, words), fields(word_count = words.len()))]
    async fn insert_round_words(
        &self,
        game_id: GameId,
        round: Round,
        words: &[NewWord],
    ) -> Result<InsertRoundResult, AppError> {
        let mut tx = self.pool.begin().await.map_err(db_error("begin"))?;

        let current: Option<Round> =
            sqlx::query_scalar("SELECT round FROM games WHERE id = $1 FOR UPDATE")
                .bind(game_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_error("lock game"))?;
        match current {
            Some(current) if current == round => {}
            Some(_) => return Ok(InsertRoundResult::StaleRound),
            None => return Err(AppError::NotFound(format!("game {game_id}"))),
        }

        let started: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM words WHERE game_id = $1 AND round = $2)",
        )
        .bind(game_id)
        .bind(round)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("check round words"))?;
        if started {
            debug!(game_id, round, "Round already has words");
            return Ok(InsertRoundResult::AlreadyStarted);
        }

        let mut inserted = Vec::with_capacity(words.len());
        for word in words {
            let row = sqlx::query_as::<_, WordModel>(&format!(
                "INSERT INTO words (game_id, round, card_id, player_id, letters)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (game_id, card_id) DO NOTHING
                 RETURNING {WORD_COLUMNS}"
            ))
            .bind(game_id)
            .bind(round)
            .bind(word.card_id)
            .bind(word.player_id)
            .bind(&word.letters)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error("insert word"))?;

            match row {
                Some(row) => inserted.push(row),
                None => {
                    // Dropping the transaction rolls back the words inserted so far
                    warn!(game_id, round, card_id = word.card_id, "Card conflict in round assignment");
                    return Ok(InsertRoundResult::CardConflict);
                }
            }
        }

        tx.commit().await.map_err(db_error("commit"))?;
        info!(game_id, round, word_count = inserted.len(), "Round words inserted");
        Ok(InsertRoundResult::Inserted(inserted))
    }

    async fn submit_word_text(
        &self,
        word_id: WordId,
        text: &str,
    ) -> Result<SubmitWordResult, AppError> {
        let mut tx = self.pool.begin().await.map_err(db_error("begin"))?;

        let located: Option<(GameId, Round, Round)> = sqlx::query_as(
            "SELECT w.game_id, w.round, g.round FROM words AS w
             JOIN games AS g ON g.id = w.game_id
             WHERE w.id = $1
             FOR UPDATE OF g",
        )
        .bind(word_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error("lock word game"))?;
        let Some((game_id, round, current)) = located else {
            return Err(AppError::NotFound(format!("word {word_id}")));
        };

        let collecting: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                SELECT 1 FROM words
                WHERE game_id = $1 AND round = $2 AND player_id IS NOT NULL AND text = ''
             )",
        )
        .bind(game_id)
        .bind(round)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("check open words"))?;
        if current != round || !collecting {
            debug!(word_id, round, "Round no longer collecting words");
            return Ok(SubmitWordResult::RoundClosed);
        }

        sqlx::query("UPDATE words SET text = $2 WHERE id = $1")
            .bind(word_id)
            .bind(text)
            .execute(&mut *tx)
            .await
            .map_err(db_error("submit word"))?;

        tx.commit().await.map_err(db_error("commit"))?;
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
        let mut tx = self.pool.begin().await.map_err(db_error("begin"))?;

        sqlx::query("DELETE FROM guesses WHERE game_id = $1 AND round = $2 AND player_id = $3")
            .bind(game_id)
            .bind(round)
            .bind(player_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error("delete guesses"))?;

        for guess in guesses {
            sqlx::query(
                "INSERT INTO guesses (game_id, round, player_id, word_id, card_id)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(game_id)
            .bind(round)
            .bind(player_id)
            .bind(guess.word_id)
            .bind(guess.card_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error("insert guess"))?;
        }

        tx.commit().await.map_err(db_error("commit"))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn mark_word_scored(
        &self,
        game_id: GameId,
        round: Round,
        word_id: WordId,
    ) -> Result<MarkScoredResult, AppError> {
        let mut tx = self.pool.begin().await.map_err(db_error("begin"))?;

        let current: Option<Round> =
            sqlx::query_scalar("SELECT round FROM games WHERE id = $1 FOR UPDATE")
                .bind(game_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_error("lock game"))?;
        match current {
            Some(current) if current == round => {}
            Some(_) => return Ok(MarkScoredResult::StaleRound),
            None => return Err(AppError::NotFound(format!("game {game_id}"))),
        }

        let was_scored: Option<bool> = sqlx::query_scalar(
            "SELECT is_scored FROM words WHERE id = $1 AND game_id = $2 AND round = $3",
        )
        .bind(word_id)
        .bind(game_id)
        .bind(round)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error("get word"))?;
        match was_scored {
            Some(true) => return Ok(MarkScoredResult::AlreadyScored),
            Some(false) => {}
            None => return Err(AppError::NotFound(format!("word {word_id}"))),
        }

        sqlx::query("UPDATE words SET is_scored = TRUE WHERE id = $1")
            .bind(word_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error("mark word scored"))?;

        let remaining: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                SELECT 1 FROM words
                WHERE game_id = $1 AND round = $2 AND player_id IS NOT NULL AND NOT is_scored
             )",
        )
        .bind(game_id)
        .bind(round)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("count unscored words"))?;

        if !remaining {
            sqlx::query("UPDATE games SET round = round + 1 WHERE id = $1")
                .bind(game_id)
                .execute(&mut *tx)
                .await
                .map_err(db_error("advance round"))?;
            info!(game_id, next_round = round + 1, "Round completed");
        }

        tx.commit().await.map_err(db_error("commit"))?;
        Ok(MarkScoredResult::Scored {
            round_advanced: !remaining,
        })
    }

    #[instrument(skip(self, texts), fields(card_count = texts.len()))]
    async fn import_cards(&self, texts: &[String]) -> Result<u64, AppError> {
        let mut tx = self.pool.begin().await.map_err(db_error("begin"))?;

        let mut inserted = 0;
        for text in texts {
            let result =
                sqlx::query("INSERT INTO cards (text) VALUES ($1) ON CONFLICT (text) DO NOTHING")
                    .bind(text)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_error("insert card"))?;
            inserted += result.rows_affected();
        }

        tx.commit().await.map_err(db_error("commit"))?;
        Ok(inserted)
    }
}
