use futures::Stream;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::events::GameEvent;
use crate::game::models::GameId;

/// Tuning knobs for the broadcast hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Capacity of the publish queue in front of the dispatcher
    pub queue_capacity: usize,
    /// Events buffered per subscription before delivery starts waiting
    pub subscriber_buffer: usize,
    /// How long the dispatcher waits on a full subscription before evicting it
    pub delivery_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            subscriber_buffer: 8,
            delivery_timeout: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HubError {
    #[error("Publish queue is full")]
    QueueFull,

    #[error("Broadcast hub has stopped")]
    Stopped,
}

enum HubCommand {
    Subscribe {
        game_id: GameId,
        subscriber_id: u64,
        sender: mpsc::Sender<GameEvent>,
        ack: oneshot::Sender<()>,
    },
    Unsubscribe {
        game_id: GameId,
        subscriber_id: u64,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

struct Publication {
    game_id: GameId,
    event: GameEvent,
}

/// Process-wide fan-out of game events to live subscriptions
///
/// The subscriber table is owned by a single dispatcher task. Subscribing,
/// unsubscribing and publishing are all messages to that task, so the table
/// is never shared between request handlers.
#[derive(Clone)]
pub struct BroadcastHub {
    commands: mpsc::UnboundedSender<HubCommand>,
    publications: mpsc::Sender<Publication>,
    next_subscriber_id: Arc<AtomicU64>,
    subscriber_buffer: usize,
}

impl BroadcastHub {
    /// Spawns the dispatcher task and returns a handle to it
    pub fn start(config: HubConfig) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (publications, publication_rx) = mpsc::channel(config.queue_capacity.max(1));

        info!(
            queue_capacity = config.queue_capacity,
            subscriber_buffer = config.subscriber_buffer,
            delivery_timeout_ms = config.delivery_timeout.as_millis() as u64,
            "Starting broadcast hub"
        );

        let dispatcher = Dispatcher {
            subscribers: HashMap::new(),
            delivery_timeout: config.delivery_timeout,
        };
        tokio::spawn(dispatcher.run(command_rx, publication_rx));

        Self {
            commands,
            publications,
            next_subscriber_id: Arc::new(AtomicU64::new(1)),
            subscriber_buffer: config.subscriber_buffer.max(1),
        }
    }

    /// Opens a live subscription for a game
    ///
    /// Returns once the dispatcher has registered it, so every publish issued
    /// afterwards reaches the new subscription.
    pub async fn subscribe(&self, game_id: GameId) -> Result<EventSubscription, HubError> {
        let subscriber_id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.subscriber_buffer);
        let (ack, registered) = oneshot::channel();

        self.commands
            .send(HubCommand::Subscribe {
                game_id,
                subscriber_id,
                sender,
                ack,
            })
            .map_err(|_| HubError::Stopped)?;
        registered.await.map_err(|_| HubError::Stopped)?;

        debug!(game_id, subscriber_id, "Subscription registered");

        Ok(EventSubscription {
            game_id,
            subscriber_id,
            receiver,
            commands: self.commands.clone(),
        })
    }

    /// Closes a subscription. Dropping it has the same effect.
    pub fn unsubscribe(&self, subscription: EventSubscription) {
        drop(subscription);
    }

    /// Queues an event for every subscription of a game without waiting
    pub fn publish(&self, game_id: GameId, event: GameEvent) -> Result<(), HubError> {
        match self.publications.try_send(Publication { game_id, event }) {
            Ok(()) => {
                debug!(game_id, event = %event, "Event queued");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(game_id, event = %event, "Publish queue full, event dropped");
                Err(HubError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(HubError::Stopped),
        }
    }

    /// Delivers whatever is still queued, closes all subscriptions and stops
    /// the dispatcher
    pub async fn shutdown(&self) {
        let (done, finished) = oneshot::channel();
        if self.commands.send(HubCommand::Shutdown { done }).is_err() {
            return;
        }
        let _ = finished.await;
        info!("Broadcast hub stopped");
    }
}

/// A live channel of events for one game
pub struct EventSubscription {
    game_id: GameId,
    subscriber_id: u64,
    receiver: mpsc::Receiver<GameEvent>,
    commands: mpsc::UnboundedSender<HubCommand>,
}

impl EventSubscription {
    pub fn game_id(&self) -> GameId {
        self.game_id
    }

    /// Waits for the next event. `None` means the hub closed this subscription.
    pub async fn recv(&mut self) -> Option<GameEvent> {
        self.receiver.recv().await
    }

    /// Turns the subscription into a stream that ends when the hub closes it
    pub fn into_stream(self) -> impl Stream<Item = GameEvent> + Send {
        futures::stream::unfold(self, |mut subscription| async move {
            subscription
                .recv()
                .await
                .map(|event| (event, subscription))
        })
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        let _ = self.commands.send(HubCommand::Unsubscribe {
            game_id: self.game_id,
            subscriber_id: self.subscriber_id,
        });
    }
}

struct Dispatcher {
    /// game id -> subscriber id -> sender
    subscribers: HashMap<GameId, HashMap<u64, mpsc::Sender<GameEvent>>>,
    delivery_timeout: Duration,
}

impl Dispatcher {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<HubCommand>,
        mut publications: mpsc::Receiver<Publication>,
    ) {
        loop {
            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(HubCommand::Subscribe { game_id, subscriber_id, sender, ack }) => {
                        self.subscribers
                            .entry(game_id)
                            .or_default()
                            .insert(subscriber_id, sender);
                        let _ = ack.send(());
                    }
                    Some(HubCommand::Unsubscribe { game_id, subscriber_id }) => {
                        self.remove(game_id, subscriber_id);
                    }
                    Some(HubCommand::Shutdown { done }) => {
                        publications.close();
                        while let Some(publication) = publications.recv().await {
                            self.deliver(publication).await;
                        }
                        self.subscribers.clear();
                        let _ = done.send(());
                        break;
                    }
                    None => break,
                },

                publication = publications.recv() => match publication {
                    Some(publication) => self.deliver(publication).await,
                    None => break,
                },
            }
        }

        debug!("Hub dispatcher exited");
    }

    /// Sends to each subscription of the game in turn. A subscription that
    /// stays full for the whole delivery timeout, or whose receiver is gone,
    /// is removed and closed.
    async fn deliver(&mut self, publication: Publication) {
        let Publication { game_id, event } = publication;
        let wait = self.delivery_timeout;

        let Some(subscribers) = self.subscribers.get(&game_id) else {
            debug!(game_id, event = %event, "No live subscriptions for game");
            return;
        };

        let mut evicted = Vec::new();
        for (&subscriber_id, sender) in subscribers {
            match timeout(wait, sender.send(event)).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => {
                    debug!(game_id, subscriber_id, "Subscriber went away");
                    evicted.push(subscriber_id);
                }
                Err(_) => {
                    warn!(
                        game_id,
                        subscriber_id,
                        event = %event,
                        "Delivery timed out, evicting subscriber"
                    );
                    evicted.push(subscriber_id);
                }
            }
        }

        for subscriber_id in evicted {
            self.remove(game_id, subscriber_id);
        }
    }

    fn remove(&mut self, game_id: GameId, subscriber_id: u64) {
        let Some(subscribers) = self.subscribers.get_mut(&game_id) else {
            return;
        };
        if subscribers.remove(&subscriber_id).is_some() {
            debug!(game_id, subscriber_id, "Subscription removed");
        }
        if subscribers.is_empty() {
            self.subscribers.remove(&game_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio::time::sleep;

    fn quick_config() -> HubConfig {
        HubConfig {
            queue_capacity: 16,
            subscriber_buffer: 1,
            delivery_timeout: Duration::from_millis(50),
        }
    }

    async fn next(subscription: &mut EventSubscription) -> Option<GameEvent> {
        timeout(Duration::from_secs(1), subscription.recv())
            .await
            .expect("timed out waiting for event")
    }

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers_of_game() {
        let hub = BroadcastHub::start(HubConfig::default());
        let mut first = hub.subscribe(1).await.unwrap();
        let mut second = hub.subscribe(1).await.unwrap();

        hub.publish(1, GameEvent::Board).unwrap();

        assert_eq!(next(&mut first).await, Some(GameEvent::Board));
        assert_eq!(next(&mut second).await, Some(GameEvent::Board));
    }

    #[tokio::test]
    async fn test_publish_is_scoped_to_game() {
        let hub = BroadcastHub::start(HubConfig::default());
        let mut other_game = hub.subscribe(2).await.unwrap();
        let mut this_game = hub.subscribe(1).await.unwrap();

        hub.publish(1, GameEvent::Players).unwrap();
        hub.publish(2, GameEvent::Scoreboard).unwrap();

        assert_eq!(next(&mut this_game).await, Some(GameEvent::Players));
        assert_eq!(next(&mut other_game).await, Some(GameEvent::Scoreboard));
    }

    #[tokio::test]
    async fn test_events_arrive_in_publish_order() {
        let hub = BroadcastHub::start(HubConfig::default());
        let mut subscription = hub.subscribe(7).await.unwrap();

        hub.publish(7, GameEvent::Board).unwrap();
        hub.publish(7, GameEvent::Scoreboard).unwrap();
        hub.publish(7, GameEvent::Players).unwrap();

        assert_eq!(next(&mut subscription).await, Some(GameEvent::Board));
        assert_eq!(next(&mut subscription).await, Some(GameEvent::Scoreboard));
        assert_eq!(next(&mut subscription).await, Some(GameEvent::Players));
    }

    #[tokio::test]
    async fn test_reopened_subscription_gets_later_publish() {
        let hub = BroadcastHub::start(HubConfig::default());

        let first = hub.subscribe(3).await.unwrap();
        hub.unsubscribe(first);
        let mut reopened = hub.subscribe(3).await.unwrap();

        hub.publish(3, GameEvent::Board).unwrap();

        assert_eq!(next(&mut reopened).await, Some(GameEvent::Board));
    }

    #[tokio::test]
    async fn test_slow_subscriber_is_evicted_without_starving_others() {
        let hub = BroadcastHub::start(quick_config());
        let mut stalled = hub.subscribe(4).await.unwrap();
        let mut reader = hub.subscribe(4).await.unwrap();

        let collected = tokio::spawn(async move {
            let mut events = Vec::new();
            while events.len() < 2 {
                match reader.recv().await {
                    Some(event) => events.push(event),
                    None => break,
                }
            }
            events
        });

        hub.publish(4, GameEvent::Board).unwrap();
        sleep(Duration::from_millis(10)).await;
        hub.publish(4, GameEvent::Scoreboard).unwrap();

        let events = timeout(Duration::from_secs(1), collected)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(events, vec![GameEvent::Board, GameEvent::Scoreboard]);

        // The buffered event is still readable, then the channel is closed
        assert_eq!(next(&mut stalled).await, Some(GameEvent::Board));
        assert_eq!(next(&mut stalled).await, None);
    }

    #[tokio::test]
    async fn test_publish_never_waits_on_stalled_dispatcher() {
        let hub = BroadcastHub::start(HubConfig {
            queue_capacity: 1,
            subscriber_buffer: 1,
            delivery_timeout: Duration::from_millis(500),
        });
        let _stalled = hub.subscribe(5).await.unwrap();

        hub.publish(5, GameEvent::Board).unwrap();
        sleep(Duration::from_millis(20)).await;
        // Dispatcher blocks on the full subscriber with this one
        hub.publish(5, GameEvent::Board).unwrap();
        sleep(Duration::from_millis(20)).await;
        hub.publish(5, GameEvent::Board).unwrap();

        let started = std::time::Instant::now();
        assert_eq!(hub.publish(5, GameEvent::Board), Err(HubError::QueueFull));
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue_and_closes_subscriptions() {
        let hub = BroadcastHub::start(HubConfig::default());
        let mut subscription = hub.subscribe(6).await.unwrap();

        hub.publish(6, GameEvent::Players).unwrap();
        hub.shutdown().await;

        assert_eq!(next(&mut subscription).await, Some(GameEvent::Players));
        assert_eq!(next(&mut subscription).await, None);
        assert_eq!(hub.publish(6, GameEvent::Board), Err(HubError::Stopped));
        assert!(hub.subscribe(6).await.is_err());
    }

    #[tokio::test]
    async fn test_subscription_stream_yields_events() {
        let hub = BroadcastHub::start(HubConfig::default());
        let subscription = hub.subscribe(8).await.unwrap();
        assert_eq!(subscription.game_id(), 8);
        let mut stream = Box::pin(subscription.into_stream());

        hub.publish(8, GameEvent::Scoreboard).unwrap();

        let event = timeout(Duration::from_secs(1), stream.next()).await.unwrap();
        assert_eq!(event, Some(GameEvent::Scoreboard));
    }
}
