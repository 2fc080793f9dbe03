// Library crate for the word card game server
// This file exposes the public API for the binary and integration tests

pub mod config;
pub mod event;
pub mod game;
pub mod routes;
pub mod shared;

// Re-export commonly used types for easier access in tests
pub use config::Config;
pub use event::{BroadcastHub, EventSubscription, GameEvent, HubConfig};
pub use game::{GameRepository, GameService, InMemoryGameRepository, Phase};
pub use routes::create_router;
pub use shared::{AppError, AppState, Rejection};
