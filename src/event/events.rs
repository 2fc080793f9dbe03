use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Tags pushed to clients watching a game
///
/// Events carry no payload. Each one names the snapshot that changed so the
/// listener knows what to re-fetch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GameEvent {
    /// Phase, words, guesses or readiness changed
    Board,
    /// A player joined
    Players,
    /// Scores changed
    Scoreboard,
}
