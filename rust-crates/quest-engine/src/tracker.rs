use crate::{
    config::EngineConfig,
    felt::Felt,
    indexer::{
        IndexerClient,
        Query,
        Subscription,
        SubscriptionUpdate,
    },
    models::{
        EntityBatch,
        LifecycleEvent,
        LifecycleKind,
        Model,
        QuestAdvancement,
        QuestCompletion,
        QuestCreation,
        QuestDefinition,
        RawEntity,
    },
    notify::{
        NotificationBridge,
        Toast,
        Toaster,
    },
    projector::{
        Projector,
        QuestView,
    },
    store::IngestionStore,
};
use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Uninitialized,
    Connecting,
    Subscribed,
    Error,
}

/// Load status as the UI sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Loading,
    Error,
    Success,
}

/// What a single live delivery did to the tracker.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    Entities { changed: bool },
    Events { changed: bool, toasts: Vec<Toast> },
    /// The indexer pushed an error instead of data; the subscription stays open.
    Rejected { error: String },
    /// A live subscription ended and both were torn down.
    Closed,
}

/// Source of "now" in unix seconds, used to pick each quest's interval.
pub type Clock = fn() -> u64;

pub fn system_clock() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

struct LiveSubscriptions {
    entities: Subscription,
    events: Subscription,
}

impl LiveSubscriptions {
    fn cancel(mut self) {
        self.entities.cancel();
        self.events.cancel();
    }
}

enum Incoming {
    Entities(Option<SubscriptionUpdate>),
    Events(Option<SubscriptionUpdate>),
}

type InitialFetch = (
    Vec<RawEntity>,
    Vec<RawEntity>,
    Vec<RawEntity>,
    Vec<RawEntity>,
);

/// Keeps the quest view of one account in sync with the indexing service.
///
/// Bulk-fetches on [`refresh`](Self::refresh), then holds one entity and one
/// event subscription and folds every delivery into the store. The active
/// subscription set is always cancelled before a new one is opened.
pub struct QuestTracker<C, T> {
    client: C,
    config: EngineConfig,
    projector: Projector,
    bridge: NotificationBridge<T>,
    clock: Clock,
    account: Option<Felt>,
    store: IngestionStore,
    quests: Arc<Vec<QuestView>>,
    state: TrackerState,
    status: Status,
    live: Option<LiveSubscriptions>,
}

impl<C, T> QuestTracker<C, T> {
    pub fn new(client: C, toaster: T, config: EngineConfig) -> Self {
        Self {
            client,
            projector: Projector::from_config(&config),
            bridge: NotificationBridge::new(toaster, config.subtitles.clone()),
            config,
            clock: system_clock,
            account: None,
            store: IngestionStore::new(),
            quests: Arc::new(Vec::new()),
            state: TrackerState::Uninitialized,
            status: Status::Loading,
            live: None,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn account(&self) -> Option<Felt> {
        self.account
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn quests(&self) -> Arc<Vec<QuestView>> {
        self.quests.clone()
    }

    pub fn store(&self) -> &IngestionStore {
        &self.store
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn toaster(&self) -> &T {
        self.bridge.toaster()
    }

    pub fn is_subscribed(&self) -> bool {
        self.live.is_some()
    }

    /// Recompute the view against the current clock, e.g. when an interval
    /// rolls over without new data.
    pub fn reproject(&mut self) {
        let snapshot = self.store.snapshot();
        let now = (self.clock)();
        self.quests = Arc::new(self.projector.project(&snapshot, now));
    }

    /// Cancel live subscriptions; the last projection stays readable.
    pub fn shutdown(&mut self) {
        self.teardown();
        if self.state == TrackerState::Subscribed {
            self.transition(TrackerState::Connecting);
        }
    }

    fn teardown(&mut self) {
        if let Some(live) = self.live.take() {
            live.cancel();
            tracing::info!("cancelled live quest subscriptions");
        }
    }

    fn transition(&mut self, next: TrackerState) {
        if self.state != next {
            tracing::debug!(from = ?self.state, to = ?next, "quest tracker state change");
            self.state = next;
        }
    }

    fn tag<M: Model>(&self) -> String {
        self.config.model_tag(M::NAME)
    }

    fn lifecycle_tags(&self) -> Vec<String> {
        LifecycleKind::ALL
            .iter()
            .map(|kind| kind.tag(&self.config.namespace))
            .collect()
    }

    /// Parse and merge a delivery. Player-scoped records of other accounts
    /// are ignored.
    fn ingest(&mut self, data: &[RawEntity]) -> bool {
        let mut batch = EntityBatch::parse(&self.config.namespace, data);
        if let Some(account) = &self.account {
            batch.retain_player(account);
        }
        self.store.apply(batch)
    }
}

impl<C: IndexerClient, T: Toaster> QuestTracker<C, T> {
    /// Switch the active account. Drops everything ingested for the previous
    /// one, then refreshes.
    pub async fn set_account(&mut self, account: Option<Felt>) -> crate::Result<()> {
        if self.account == account {
            return Ok(());
        }
        tracing::info!(from = ?self.account, to = ?account, "active account changed");
        self.teardown();
        self.store.clear();
        self.account = account;
        self.reproject();
        self.status = Status::Loading;
        self.transition(TrackerState::Uninitialized);
        self.refresh().await
    }

    /// Bulk-fetch everything for the active account and open live
    /// subscriptions.
    ///
    /// The four initial queries succeed or fail together; on failure nothing
    /// from this cycle is kept. While subscriptions are held the live streams
    /// own the data, so this is a no-op that leaves state and status alone.
    pub async fn refresh(&mut self) -> crate::Result<()> {
        let Some(account) = self.account else {
            tracing::debug!("no active account; skipping quest refresh");
            return Ok(());
        };
        if self.live.is_some() {
            tracing::debug!("live subscriptions held; skipping quest refresh");
            return Ok(());
        }
        self.transition(TrackerState::Connecting);
        self.status = Status::Loading;
        tracing::info!(%account, "refreshing quests");

        let (definitions, creations, progress, lifecycle) =
            match self.fetch_initial(account).await {
                Ok(fetched) => fetched,
                Err(error) => {
                    tracing::error!("quest refresh failed: {error:#}");
                    self.status = Status::Error;
                    self.transition(TrackerState::Error);
                    return Err(error);
                }
            };

        // Past lifecycle events are already reflected in the entities.
        let past_events = LifecycleEvent::parse_all(&self.config.namespace, &lifecycle);
        tracing::debug!(
            count = past_events.len(),
            "not notifying for past lifecycle events"
        );

        let raws: Vec<RawEntity> = definitions
            .into_iter()
            .chain(creations)
            .chain(progress)
            .collect();
        self.ingest(&raws);
        self.reproject();
        self.status = Status::Success;
        tracing::info!(
            definitions = self.store.definitions().len(),
            creations = self.store.creations().len(),
            quests = self.quests.len(),
            "quest refresh complete"
        );

        if self.store.creations().is_empty() {
            tracing::info!("no quest creations yet; deferring live subscriptions");
            return Ok(());
        }
        if let Err(error) = self.subscribe().await {
            tracing::error!("opening live quest subscriptions failed: {error:#}");
            self.status = Status::Error;
            self.transition(TrackerState::Error);
            return Err(error);
        }
        self.transition(TrackerState::Subscribed);
        Ok(())
    }

    async fn fetch_initial(&self, account: Felt) -> crate::Result<InitialFetch> {
        let definitions = Query::new(vec![self.tag::<QuestDefinition>()]);
        let creations = Query::new(vec![self.tag::<QuestCreation>()]);
        let progress = Query::new(vec![
            self.tag::<QuestCompletion>(),
            self.tag::<QuestAdvancement>(),
        ])
        .for_player(account);
        let lifecycle = Query::new(self.lifecycle_tags()).for_player(account);

        futures::try_join!(
            async {
                self.client
                    .get_entities(&definitions)
                    .await
                    .context("fetching quest definitions")
            },
            async {
                self.client
                    .get_event_messages(&creations)
                    .await
                    .context("fetching quest creations")
            },
            async {
                self.client
                    .get_entities(&progress)
                    .await
                    .context("fetching player quest progress")
            },
            async {
                self.client
                    .get_event_messages(&lifecycle)
                    .await
                    .context("fetching player quest events")
            },
        )
    }

    async fn subscribe(&mut self) -> crate::Result<()> {
        let entity_clause = Query::new(vec![
            self.tag::<QuestDefinition>(),
            self.tag::<QuestCompletion>(),
            self.tag::<QuestAdvancement>(),
        ]);
        let mut event_models = vec![self.tag::<QuestCreation>()];
        event_models.extend(self.lifecycle_tags());
        let event_clause = Query::new(event_models);

        let entities = self
            .client
            .on_entity_updated(&entity_clause, &[])
            .await
            .context("subscribing to quest entities")?;
        let events = self
            .client
            .on_event_message_updated(&event_clause, &[])
            .await
            .context("subscribing to quest events")?;
        self.live = Some(LiveSubscriptions { entities, events });
        tracing::info!("opened live quest subscriptions");
        Ok(())
    }

    /// Wait for the next live delivery and apply it. `None` when no
    /// subscriptions are held.
    ///
    /// Entity updates are polled first whenever both streams are ready, so a
    /// steady entity stream can hold back event delivery until it drains.
    pub async fn next_update(&mut self) -> Option<TrackerEvent> {
        let live = self.live.as_mut()?;
        // Entities first so definitions land before the events that need them.
        let incoming = tokio::select! {
            biased;
            update = live.entities.next_update() => Incoming::Entities(update),
            update = live.events.next_update() => Incoming::Events(update),
        };
        let event = match incoming {
            Incoming::Entities(Some(update)) => self.on_entities(update),
            Incoming::Events(Some(update)) => self.on_events(update),
            Incoming::Entities(None) | Incoming::Events(None) => {
                tracing::warn!("live quest subscription closed by the indexer");
                self.teardown();
                self.transition(TrackerState::Connecting);
                TrackerEvent::Closed
            }
        };
        Some(event)
    }

    /// Apply live deliveries until the subscriptions end.
    pub async fn run(&mut self) {
        while let Some(event) = self.next_update().await {
            if event == TrackerEvent::Closed {
                break;
            }
        }
    }

    fn on_entities(&mut self, update: SubscriptionUpdate) -> TrackerEvent {
        if let Some(error) = update.error {
            tracing::warn!(%error, "entity subscription reported an error");
            return TrackerEvent::Rejected { error };
        }
        let changed = self.ingest(&update.data);
        if changed {
            self.reproject();
        }
        TrackerEvent::Entities { changed }
    }

    fn on_events(&mut self, update: SubscriptionUpdate) -> TrackerEvent {
        if let Some(error) = update.error {
            tracing::warn!(%error, "event subscription reported an error");
            return TrackerEvent::Rejected { error };
        }
        // Creations first, so an event delivered alongside its quest's
        // creation still resolves.
        let changed = self.ingest(&update.data);
        if changed {
            self.reproject();
        }
        let toasts = match self.account {
            Some(account) => LifecycleEvent::parse_all(&self.config.namespace, &update.data)
                .iter()
                .filter(|event| event.player_id == account)
                .filter_map(|event| self.bridge.dispatch(event, self.store.creations()))
                .collect(),
            None => Vec::new(),
        };
        TrackerEvent::Events { changed, toasts }
    }
}
