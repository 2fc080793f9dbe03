// Public API - what other modules can use
pub use handlers::{
    create_game, get_board, get_guesses, get_scoreboard, join_game, list_players, mark_ready,
    mark_scored, stream_events, submit_guesses, submit_word,
};
pub use phase::{resolve_phase, Phase, RoundSnapshot};
pub use postgres::PostgresGameRepository;
pub use repository::{GameRepository, InMemoryGameRepository};
pub use service::GameService;

// Internal modules
mod handlers;
pub mod letters;
pub mod models;
pub mod phase;
mod postgres;
pub mod repository;
pub mod round;
pub mod scoring;
mod service;
pub mod types;
