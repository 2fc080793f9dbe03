pub mod actions;
pub mod setup;

// Re-export main utilities for use by test files
#[allow(unused_imports)]
pub use actions::word_from;
#[allow(unused_imports)]
pub use setup::{TestPlayer, TestSetup, TestSetupBuilder};
