use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use super::models::{GuessModel, PlayerId, PlayerModel, WordId, WordModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlayerScore {
    pub player_id: PlayerId,
    /// Scored own words that at least one opponent identified
    pub own_words: i64,
    /// Guesses that named the true card of a scored word
    pub correct_guesses: i64,
    pub total: i64,
}

impl PlayerScore {
    fn zero(player_id: PlayerId) -> Self {
        Self {
            player_id,
            own_words: 0,
            correct_guesses: 0,
            total: 0,
        }
    }
}

/// Whether `guess` names the true card of a word that has been scored
fn is_correct(guess: &GuessModel, scored: &HashMap<WordId, &WordModel>) -> bool {
    scored
        .get(&guess.word_id)
        .map_or(false, |word| word.card_id == guess.card_id)
}

fn scored_words(words: &[WordModel]) -> HashMap<WordId, &WordModel> {
    words
        .iter()
        .filter(|w| w.is_scored && !w.is_decoy())
        .map(|w| (w.id, w))
        .collect()
}

/// Scores every player from the given words and guesses. Pass a single
/// round's rows for round scores, or all rows for the running total.
pub fn compute_scores(
    players: &[PlayerModel],
    words: &[WordModel],
    guesses: &[GuessModel],
) -> HashMap<PlayerId, PlayerScore> {
    let scored = scored_words(words);
    let mut scores: HashMap<PlayerId, PlayerScore> = players
        .iter()
        .map(|p| (p.id, PlayerScore::zero(p.id)))
        .collect();

    let mut seen_guesses = HashSet::new();
    let mut identified_words = HashSet::new();
    for guess in guesses.iter().filter(|g| is_correct(g, &scored)) {
        if seen_guesses.insert(guess.id) {
            if let Some(score) = scores.get_mut(&guess.player_id) {
                score.correct_guesses += 1;
            }
        }
        identified_words.insert(guess.word_id);
    }

    for word_id in identified_words {
        let owner = scored.get(&word_id).and_then(|w| w.player_id);
        if let Some(score) = owner.and_then(|id| scores.get_mut(&id)) {
            score.own_words += 1;
        }
    }

    for score in scores.values_mut() {
        score.total = score.own_words + score.correct_guesses;
    }
    scores
}

/// Strict total order for the scoreboard: higher totals first, then own
/// words, then correct guesses, then lower player id
pub fn scoreboard_order(a: &PlayerScore, b: &PlayerScore) -> Ordering {
    b.total
        .cmp(&a.total)
        .then(b.own_words.cmp(&a.own_words))
        .then(b.correct_guesses.cmp(&a.correct_guesses))
        .then(a.player_id.cmp(&b.player_id))
}

pub fn ranked_scores(
    players: &[PlayerModel],
    words: &[WordModel],
    guesses: &[GuessModel],
) -> Vec<PlayerScore> {
    let mut ranked: Vec<PlayerScore> = compute_scores(players, words, guesses)
        .into_values()
        .collect();
    ranked.sort_by(scoreboard_order);
    ranked
}

/// The owned, unscored word with the lowest card id among `words`
pub fn currently_scored_word(words: &[WordModel]) -> Option<&WordModel> {
    words
        .iter()
        .filter(|w| !w.is_decoy() && !w.is_scored)
        .min_by_key(|w| w.card_id)
}

/// Points `viewer` earned on one scored word: one for naming its card, one
/// for owning it when somebody named its card
pub fn word_points_for(viewer: PlayerId, word: &WordModel, guesses: &[GuessModel]) -> i64 {
    if !word.is_scored {
        return 0;
    }
    let correct: Vec<&GuessModel> = guesses
        .iter()
        .filter(|g| g.word_id == word.id && g.card_id == word.card_id)
        .collect();

    let guessed = correct.iter().any(|g| g.player_id == viewer);
    let owned = word.player_id == Some(viewer) && !correct.is_empty();
    i64::from(guessed) + i64::from(owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(id: PlayerId) -> PlayerModel {
        PlayerModel {
            id,
            game_id: 1,
            token: format!("t{id}"),
            name: format!("p{id}"),
            ready_round: 1,
        }
    }

    fn word(id: WordId, card_id: i64, owner: Option<PlayerId>, is_scored: bool) -> WordModel {
        WordModel {
            id,
            game_id: 1,
            round: 1,
            card_id,
            player_id: owner,
            text: "WORT".to_string(),
            letters: String::new(),
            is_scored,
        }
    }

    fn guess(id: i64, player_id: PlayerId, word_id: WordId, card_id: i64) -> GuessModel {
        GuessModel {
            id,
            game_id: 1,
            round: 1,
            player_id,
            word_id,
            card_id,
        }
    }

    fn score(player_id: PlayerId, own_words: i64, correct_guesses: i64) -> PlayerScore {
        PlayerScore {
            player_id,
            own_words,
            correct_guesses,
            total: own_words + correct_guesses,
        }
    }

    #[test]
    fn test_only_scored_words_count() {
        let players = vec![player(1), player(2), player(3)];
        let words = vec![
            word(11, 101, Some(1), true),
            word(12, 102, Some(2), false),
            word(13, 103, Some(3), true),
        ];
        let guesses = vec![
            guess(1, 2, 11, 101), // correct
            guess(2, 3, 11, 101), // correct
            guess(3, 1, 12, 102), // correct but not scored yet
            guess(4, 1, 13, 101), // wrong card
            guess(5, 2, 13, 102), // wrong card
        ];

        let scores = compute_scores(&players, &words, &guesses);

        assert_eq!(scores[&1], score(1, 1, 0));
        assert_eq!(scores[&2], score(2, 0, 1));
        assert_eq!(scores[&3], score(3, 0, 1));
    }

    #[test]
    fn test_decoys_never_score() {
        let players = vec![player(1), player(2), player(3)];
        let words = vec![word(14, 104, None, true)];
        let guesses = vec![guess(1, 1, 14, 104)];

        let scores = compute_scores(&players, &words, &guesses);

        assert!(scores.values().all(|s| s.total == 0));
    }

    #[test]
    fn test_scoreboard_order_is_strict() {
        let mut ranked = vec![
            score(4, 1, 1),
            score(3, 0, 2),
            score(2, 1, 1),
            score(1, 2, 0),
            score(5, 0, 3),
        ];
        ranked.sort_by(scoreboard_order);

        let order: Vec<PlayerId> = ranked.iter().map(|s| s.player_id).collect();
        assert_eq!(order, vec![5, 1, 2, 4, 3]);
    }

    #[test]
    fn test_correct_guesses_break_remaining_ties() {
        let a = PlayerScore {
            player_id: 1,
            own_words: 1,
            correct_guesses: 1,
            total: 3,
        };
        let b = PlayerScore {
            player_id: 2,
            own_words: 1,
            correct_guesses: 2,
            total: 3,
        };
        assert_eq!(scoreboard_order(&b, &a), Ordering::Less);
        assert_eq!(scoreboard_order(&a, &a), Ordering::Equal);
    }

    #[test]
    fn test_currently_scored_word_is_lowest_card() {
        let words = vec![
            word(11, 105, Some(1), false),
            word(12, 102, Some(2), true),
            word(13, 103, Some(3), false),
            word(14, 101, None, false),
        ];

        assert_eq!(currently_scored_word(&words).map(|w| w.id), Some(13));

        let all_scored: Vec<WordModel> = words
            .into_iter()
            .map(|mut w| {
                w.is_scored = true;
                w
            })
            .collect();
        assert!(currently_scored_word(&all_scored).is_none());
    }

    #[test]
    fn test_word_points_for_viewer() {
        let owned = word(11, 101, Some(1), true);
        let guesses = vec![guess(1, 2, 11, 101), guess(2, 3, 11, 104)];

        assert_eq!(word_points_for(1, &owned, &guesses), 1);
        assert_eq!(word_points_for(2, &owned, &guesses), 1);
        assert_eq!(word_points_for(3, &owned, &guesses), 0);

        let unscored = word(11, 101, Some(1), false);
        assert_eq!(word_points_for(2, &unscored, &guesses), 0);
    }

    #[test]
    fn test_ranked_scores_covers_all_players() {
        let players = vec![player(3), player(1), player(2)];
        let ranked = ranked_scores(&players, &[], &[]);
        let order: Vec<PlayerId> = ranked.iter().map(|s| s.player_id).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }
}
