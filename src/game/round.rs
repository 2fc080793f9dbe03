use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, error, info, instrument, warn};

use super::letters::LetterPool;
use super::models::{CardId, CardUsage, GameModel, NewWord, PlayerModel, WordModel};
use super::repository::{GameRepository, InsertRoundResult};
use crate::shared::AppError;

/// Number of unowned distractor words dealt next to the players' words
pub fn decoy_count(num_players: usize) -> usize {
    if num_players <= 5 {
        6 - num_players
    } else {
        1
    }
}

/// Picks `count` cards the game has not used yet, preferring cards that
/// were used least across all games. Ties are broken randomly.
///
/// Returns `None` when fewer than `count` unused cards remain.
pub fn select_cards<R: Rng + ?Sized>(
    usage: &[CardUsage],
    count: usize,
    rng: &mut R,
) -> Option<Vec<CardId>> {
    let mut candidates: Vec<&CardUsage> = usage.iter().filter(|u| !u.used_in_game).collect();
    if candidates.len() < count {
        return None;
    }

    // Shuffle first, the stable sort keeps the random order within equal usage
    candidates.shuffle(rng);
    candidates.sort_by_key(|u| u.total_uses);

    Some(candidates.into_iter().take(count).map(|u| u.card_id).collect())
}

/// Deals one word per player plus the decoys, each with its own letter pool
pub fn plan_round<R: Rng + ?Sized>(
    players: &[PlayerModel],
    usage: &[CardUsage],
    rng: &mut R,
) -> Option<Vec<NewWord>> {
    let decoys = decoy_count(players.len());
    let cards = select_cards(usage, players.len() + decoys, rng)?;

    let owners = players.iter().map(|p| Some(p.id)).chain(std::iter::repeat(None));
    let words = cards
        .into_iter()
        .zip(owners)
        .map(|(card_id, player_id)| NewWord {
            card_id,
            player_id,
            letters: LetterPool::generate(rng).to_string(),
        })
        .collect();
    Some(words)
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoundStart {
    Started(Vec<WordModel>),
    /// A concurrent request dealt this round first
    AlreadyStarted,
}

/// Assigns cards and letter pools for the game's current round in one
/// atomic write
#[instrument(skip(repository, game), fields(game_id = game.id, round = game.round))]
pub async fn start_new_round(
    repository: &(dyn GameRepository + Send + Sync),
    game: &GameModel,
) -> Result<RoundStart, AppError> {
    let players = repository.list_players(game.id).await?;
    let usage = repository.card_usage(game.id).await?;

    let planned = {
        let mut rng = rand::rng();
        plan_round(&players, &usage, &mut rng)
    };
    let Some(words) = planned else {
        error!(
            player_count = players.len(),
            card_count = usage.len(),
            "Not enough unused cards to start round"
        );
        return Err(AppError::Internal);
    };
    debug!(word_count = words.len(), "Round planned");

    match repository
        .insert_round_words(game.id, game.round, &words)
        .await?
    {
        InsertRoundResult::Inserted(words) => {
            info!(
                player_count = players.len(),
                word_count = words.len(),
                "Round started"
            );
            Ok(RoundStart::Started(words))
        }
        InsertRoundResult::AlreadyStarted | InsertRoundResult::StaleRound => {
            debug!("Round was started concurrently");
            Ok(RoundStart::AlreadyStarted)
        }
        InsertRoundResult::CardConflict => {
            warn!("Card taken while starting round");
            Err(AppError::Internal)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::letters::{POOL_SIZE, SPACE};
    use crate::game::repository::{AddPlayerResult, InMemoryGameRepository};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rstest::rstest;
    use std::collections::HashSet;

    fn usage(card_id: CardId, total_uses: i64, used_in_game: bool) -> CardUsage {
        CardUsage {
            card_id,
            total_uses,
            used_in_game,
        }
    }

    async fn game_with_players(
        repo: &InMemoryGameRepository,
        count: usize,
    ) -> (GameModel, Vec<PlayerModel>) {
        let (game, host) = repo.create_game("g", "player-0", "t-0").await.unwrap();
        let mut players = vec![host];
        for i in 1..count {
            match repo
                .try_add_player(game.id, &format!("player-{i}"), &format!("t-{i}"))
                .await
                .unwrap()
            {
                AddPlayerResult::Added(p) => players.push(p),
                other => panic!("unexpected {other:?}"),
            }
        }
        (game, players)
    }

    fn repo_with_cards(count: usize) -> InMemoryGameRepository {
        let texts: Vec<String> = (0..count).map(|i| format!("card-{i}")).collect();
        InMemoryGameRepository::with_cards(&texts)
    }

    #[rstest]
    #[case(3, 3)]
    #[case(4, 2)]
    #[case(5, 1)]
    #[case(6, 1)]
    #[case(10, 1)]
    fn test_decoy_count(#[case] players: usize, #[case] decoys: usize) {
        assert_eq!(decoy_count(players), decoys);
    }

    #[test]
    fn test_select_cards_prefers_least_used() {
        let usage = vec![
            usage(1, 5, false),
            usage(2, 0, false),
            usage(3, 2, false),
            usage(4, 0, true),
            usage(5, 1, false),
        ];
        let mut rng = StdRng::seed_from_u64(1);

        let picked = select_cards(&usage, 3, &mut rng).unwrap();

        assert_eq!(picked, vec![2, 5, 3]);
    }

    #[test]
    fn test_select_cards_breaks_ties_randomly() {
        let usage: Vec<CardUsage> = (1..=10).map(|id| usage(id, 0, false)).collect();
        let mut rng = StdRng::seed_from_u64(5);

        let firsts: HashSet<CardId> = (0..50)
            .map(|_| select_cards(&usage, 1, &mut rng).unwrap()[0])
            .collect();

        assert!(firsts.len() > 1);
    }

    #[test]
    fn test_select_cards_exhausted() {
        let usage = vec![usage(1, 0, false), usage(2, 0, true)];
        let mut rng = StdRng::seed_from_u64(1);
        assert!(select_cards(&usage, 2, &mut rng).is_none());
    }

    #[tokio::test]
    async fn test_plan_round_assigns_players_then_decoys() {
        let repo = repo_with_cards(20);
        let (game, players) = game_with_players(&repo, 4).await;
        let usage = repo.card_usage(game.id).await.unwrap();
        let mut rng = StdRng::seed_from_u64(9);

        let words = plan_round(&players, &usage, &mut rng).unwrap();

        assert_eq!(words.len(), 6);
        for (word, player) in words.iter().zip(&players) {
            assert_eq!(word.player_id, Some(player.id));
        }
        assert!(words[4..].iter().all(|w| w.player_id.is_none()));
        for word in &words {
            assert_eq!(word.letters.chars().count(), POOL_SIZE);
            assert_eq!(word.letters.chars().filter(|c| *c == SPACE).count(), 2);
        }
        let cards: HashSet<CardId> = words.iter().map(|w| w.card_id).collect();
        assert_eq!(cards.len(), words.len());
    }

    #[rstest]
    #[case(3)]
    #[case(4)]
    #[case(5)]
    #[case(6)]
    #[case(10)]
    #[tokio::test]
    async fn test_start_new_round_word_count(#[case] count: usize) {
        let repo = repo_with_cards(40);
        let (game, _) = game_with_players(&repo, count).await;

        let result = start_new_round(&repo, &game).await.unwrap();

        let RoundStart::Started(words) = result else {
            panic!("round not started");
        };
        assert_eq!(words.len(), count + decoy_count(count));
        assert_eq!(words.iter().filter(|w| w.is_decoy()).count(), decoy_count(count));
        assert_eq!(repo.list_words(game.id, Some(1)).await.unwrap().len(), words.len());
    }

    #[tokio::test]
    async fn test_start_new_round_twice_is_noop() {
        let repo = repo_with_cards(40);
        let (game, _) = game_with_players(&repo, 3).await;

        start_new_round(&repo, &game).await.unwrap();
        let again = start_new_round(&repo, &game).await.unwrap();

        assert_eq!(again, RoundStart::AlreadyStarted);
        assert_eq!(repo.list_words(game.id, None).await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_start_new_round_without_cards_fails_cleanly() {
        let repo = repo_with_cards(5);
        let (game, _) = game_with_players(&repo, 3).await;

        let result = start_new_round(&repo, &game).await;

        assert!(matches!(result, Err(AppError::Internal)));
        assert!(repo.list_words(game.id, None).await.unwrap().is_empty());
    }
}
