use std::sync::Arc;

use wordcards::{
    game::{models::PlayerModel, RoundSnapshot},
    BroadcastHub, GameRepository, GameService, HubConfig, InMemoryGameRepository,
};

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

#[derive(Debug, Clone)]
pub struct TestPlayer {
    pub name: String,
    pub token: String,
}

pub struct TestSetup {
    pub service: GameService,
    pub repository: Arc<dyn GameRepository + Send + Sync>,
    pub hub: BroadcastHub,
    pub game_token: String,
    pub players: Vec<TestPlayer>,
}

pub struct TestSetupBuilder {
    players: Vec<String>,
    cards: usize,
    hub_config: HubConfig,
}

impl TestSetupBuilder {
    pub fn new() -> Self {
        Self {
            players: vec![],
            cards: 60,
            hub_config: HubConfig::default(),
        }
    }

    pub fn with_players(mut self, players: Vec<&str>) -> Self {
        self.players = players.into_iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_three_players(self) -> Self {
        self.with_players(vec!["alice", "bob", "charlie"])
    }

    #[allow(dead_code)]
    pub fn with_cards(mut self, cards: usize) -> Self {
        self.cards = cards;
        self
    }

    #[allow(dead_code)]
    pub fn with_hub_config(mut self, hub_config: HubConfig) -> Self {
        self.hub_config = hub_config;
        self
    }

    /// Creates the game with the first player as host and joins the rest
    pub async fn build(self) -> TestSetup {
        let texts: Vec<String> = (0..self.cards).map(|i| format!("card {i}")).collect();
        let repository: Arc<dyn GameRepository + Send + Sync> =
            Arc::new(InMemoryGameRepository::with_cards(&texts));
        let hub = BroadcastHub::start(self.hub_config);
        let service = GameService::new(Arc::clone(&repository), hub.clone());

        let mut names = self.players.into_iter();
        let host = names.next().unwrap_or_else(|| "host".to_string());
        let created = service.create_game(&host).await.unwrap();

        let mut players = vec![TestPlayer {
            name: host,
            token: created.player_token,
        }];
        for name in names {
            let joined = service.join_game(&created.game_token, &name).await.unwrap();
            players.push(TestPlayer {
                name,
                token: joined.player_token,
            });
        }

        TestSetup {
            service,
            repository,
            hub,
            game_token: created.game_token,
            players,
        }
    }
}

impl TestSetup {
    pub fn player(&self, name: &str) -> &TestPlayer {
        self.players
            .iter()
            .find(|p| p.name == name)
            .unwrap_or_else(|| panic!("no player named {name}"))
    }

    pub async fn model(&self, player: &TestPlayer) -> PlayerModel {
        self.repository
            .get_player_by_token(&player.token)
            .await
            .unwrap()
            .unwrap()
    }

    pub async fn snapshot(&self) -> RoundSnapshot {
        let game = self
            .repository
            .get_game_by_token(&self.game_token)
            .await
            .unwrap()
            .unwrap();
        RoundSnapshot::load(self.repository.as_ref(), game)
            .await
            .unwrap()
    }
}
