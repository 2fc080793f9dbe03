// Real-time change notifications
//
// Clients watching a game receive bare event tags through the hub and
// re-fetch the matching snapshot themselves.

// Public API - what other modules can use
pub use events::GameEvent;
pub use hub::{BroadcastHub, EventSubscription, HubConfig, HubError};

// Internal modules
mod events;
mod hub;
