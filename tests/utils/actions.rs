use std::collections::BTreeMap;

use wordcards::game::{letters::SPACE, scoring::currently_scored_word, types::Guesses};

use super::setup::{TestPlayer, TestSetup};

/// A valid word for a pool: its first three letters, spaces skipped
pub fn word_from(letters: &str) -> String {
    letters.chars().filter(|c| *c != SPACE).take(3).collect()
}

// ============================================================================
// Player Actions
// ============================================================================

impl TestSetup {
    pub async fn ready_all(&self) {
        for player in &self.players {
            self.service
                .mark_ready(&self.game_token, &player.token)
                .await
                .unwrap();
        }
    }

    pub async fn submit_all_words(&self) {
        let snapshot = self.snapshot().await;
        for player in &self.players {
            let model = self.model(player).await;
            let word = snapshot.word_of(model.id).expect("player has a word");
            self.service
                .submit_word(&self.game_token, &player.token, &word_from(&word.letters))
                .await
                .unwrap();
        }
    }

    /// Guesses naming every opponent's true card
    pub async fn correct_guesses(&self, player: &TestPlayer) -> Guesses {
        let snapshot = self.snapshot().await;
        let me = self.model(player).await;
        snapshot
            .words
            .iter()
            .filter_map(|w| match w.player_id {
                Some(owner) if owner != me.id => Some((owner, w.card_id)),
                _ => None,
            })
            .collect::<BTreeMap<_, _>>()
    }

    pub async fn guess_all_correctly(&self) {
        for player in &self.players {
            let guesses = self.correct_guesses(player).await;
            self.service
                .submit_guesses(&self.game_token, &player.token, &guesses)
                .await
                .unwrap();
        }
    }

    /// The player whose word is revealed next, if scoring is in progress
    pub async fn current_scorer(&self) -> Option<TestPlayer> {
        let snapshot = self.snapshot().await;
        let owner = currently_scored_word(&snapshot.words)?.player_id?;
        for player in &self.players {
            if self.model(player).await.id == owner {
                return Some(player.clone());
            }
        }
        None
    }

    /// Marks words scored in reveal order until the round is over
    pub async fn score_round(&self) -> usize {
        let mut scored = 0;
        while let Some(player) = self.current_scorer().await {
            self.service
                .mark_scored(&self.game_token, &player.token)
                .await
                .unwrap();
            scored += 1;
        }
        scored
    }
}
