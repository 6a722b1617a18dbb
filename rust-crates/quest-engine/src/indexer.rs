//! Interface to the chain-indexing service. The engine only queries and
//! subscribes; implementations live with whatever transport the host uses.
use crate::{
    felt::Felt,
    models::{
        RawEntity,
        normalize_value,
    },
};
use tokio::sync::{
    mpsc,
    oneshot,
};

/// Which models to fetch, optionally narrowed to one player's records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// Fully-qualified model names (`"{namespace}-{Model}"`).
    pub models: Vec<String>,
    pub player: Option<Felt>,
}

impl Query {
    pub fn new(models: Vec<String>) -> Self {
        Self {
            models,
            player: None,
        }
    }

    pub fn for_player(mut self, player: Felt) -> Self {
        self.player = Some(player);
        self
    }

    /// Whether an entity satisfies this query: it carries at least one of
    /// the models and, when a player is set, that model's `player_id` is the
    /// player.
    pub fn matches(&self, entity: &RawEntity) -> bool {
        self.models.iter().any(|tag| {
            let Some(model) = entity.models.get(tag) else {
                return false;
            };
            let Some(player) = self.player else {
                return true;
            };
            let normalized = normalize_value(model.clone());
            normalized
                .get("player_id")
                .and_then(|value| serde_json::from_value::<Felt>(value.clone()).ok())
                .is_some_and(|owner| owner == player)
        })
    }
}

/// One push from a live subscription.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionUpdate {
    pub data: Vec<RawEntity>,
    pub error: Option<String>,
}

impl SubscriptionUpdate {
    pub fn data(data: Vec<RawEntity>) -> Self {
        Self { data, error: None }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            data: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Receiving half of a live subscription.
///
/// Cancelling (explicitly, or by dropping) tells the producer to stop.
#[derive(Debug)]
pub struct Subscription {
    updates: mpsc::UnboundedReceiver<SubscriptionUpdate>,
    cancel: Option<oneshot::Sender<()>>,
}

/// Producing half handed to the indexer implementation.
#[derive(Debug)]
pub struct SubscriptionFeed {
    sender: mpsc::UnboundedSender<SubscriptionUpdate>,
    cancelled: oneshot::Receiver<()>,
}

impl Subscription {
    pub fn channel() -> (Subscription, SubscriptionFeed) {
        let (sender, updates) = mpsc::unbounded_channel();
        let (cancel, cancelled) = oneshot::channel();
        let subscription = Subscription {
            updates,
            cancel: Some(cancel),
        };
        (subscription, SubscriptionFeed { sender, cancelled })
    }

    /// `None` once the producer has gone away.
    pub async fn next_update(&mut self) -> Option<SubscriptionUpdate> {
        self.updates.recv().await
    }

    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        self.updates.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_none()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl SubscriptionFeed {
    /// Returns `false` when the subscriber is gone.
    pub fn push(&self, update: SubscriptionUpdate) -> bool {
        self.sender.send(update).is_ok()
    }

    pub fn is_cancelled(&mut self) -> bool {
        !matches!(
            self.cancelled.try_recv(),
            Err(oneshot::error::TryRecvError::Empty)
        )
    }

    pub async fn cancelled(&mut self) {
        if self.is_cancelled() {
            return;
        }
        let _ = (&mut self.cancelled).await;
    }
}

pub trait IndexerClient {
    /// One-shot fetch of entities matching `query`.
    fn get_entities(
        &self,
        query: &Query,
    ) -> impl Future<Output = crate::Result<Vec<RawEntity>>>;

    /// One-shot fetch of event messages matching `query`.
    fn get_event_messages(
        &self,
        query: &Query,
    ) -> impl Future<Output = crate::Result<Vec<RawEntity>>>;

    /// Live entity updates matching `clause`, restricted to `ids` when
    /// non-empty.
    fn on_entity_updated(
        &self,
        clause: &Query,
        ids: &[Felt],
    ) -> impl Future<Output = crate::Result<Subscription>>;

    /// Live event messages matching `clause`, restricted to `ids` when
    /// non-empty.
    fn on_event_message_updated(
        &self,
        clause: &Query,
        ids: &[Felt],
    ) -> impl Future<Output = crate::Result<Subscription>>;
}
