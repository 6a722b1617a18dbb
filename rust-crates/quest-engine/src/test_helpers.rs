//! In-memory indexer, recording toaster and record builders for tests.
use crate::{
    felt::Felt,
    indexer::{
        IndexerClient,
        Query,
        Subscription,
        SubscriptionFeed,
        SubscriptionUpdate,
    },
    models::{
        LifecycleKind,
        Model,
        QuestAdvancement,
        QuestCompletion,
        QuestCreation,
        QuestDefinition,
        RawEntity,
    },
    notify::{
        Toast,
        Toaster,
    },
};
use serde_json::{
    Value,
    json,
};
use std::sync::{
    Arc,
    Mutex,
};

pub const FIXED_NOW: u64 = 1_700_000_000;

pub fn fixed_clock() -> u64 {
    FIXED_NOW
}

#[derive(Default)]
struct FakeIndexerState {
    entities: Vec<RawEntity>,
    event_messages: Vec<RawEntity>,
    failure: Option<String>,
    failing_models: Vec<String>,
    entity_feeds: Vec<(Query, SubscriptionFeed)>,
    event_feeds: Vec<(Query, SubscriptionFeed)>,
    queries: Vec<Query>,
    opened: usize,
}

/// Indexer backed by two in-memory record lists. Clones share state, so a
/// test can keep a handle after moving one into the tracker.
#[derive(Clone, Default)]
pub struct FakeIndexer {
    state: Arc<Mutex<FakeIndexerState>>,
}

impl FakeIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entities(self, entities: Vec<RawEntity>) -> Self {
        self.state.lock().unwrap().entities = entities;
        self
    }

    pub fn with_event_messages(self, event_messages: Vec<RawEntity>) -> Self {
        self.state.lock().unwrap().event_messages = event_messages;
        self
    }

    pub fn add_entity(&self, entity: RawEntity) {
        self.state.lock().unwrap().entities.push(entity);
    }

    pub fn add_event_message(&self, event: RawEntity) {
        self.state.lock().unwrap().event_messages.push(event);
    }

    /// Make every one-shot query fail until [`Self::recover`].
    pub fn fail_queries(&self, message: impl Into<String>) {
        self.state.lock().unwrap().failure = Some(message.into());
    }

    /// Make every one-shot query naming `model` fail until [`Self::recover`].
    pub fn fail_model(&self, model: impl Into<String>) {
        self.state.lock().unwrap().failing_models.push(model.into());
    }

    pub fn recover(&self) {
        let mut state = self.state.lock().unwrap();
        state.failure = None;
        state.failing_models.clear();
    }

    /// Push `data` to every live entity subscription whose clause matches.
    /// Returns how many subscriptions received it.
    pub fn emit_entities(&self, data: Vec<RawEntity>) -> usize {
        let state = self.state.lock().unwrap();
        emit(&state.entity_feeds, data)
    }

    pub fn emit_event_messages(&self, data: Vec<RawEntity>) -> usize {
        let state = self.state.lock().unwrap();
        emit(&state.event_feeds, data)
    }

    pub fn emit_entity_error(&self, error: &str) -> usize {
        let state = self.state.lock().unwrap();
        state
            .entity_feeds
            .iter()
            .filter(|(_, feed)| feed.push(SubscriptionUpdate::error(error)))
            .count()
    }

    /// Drop every producer, as a server-side disconnect would.
    pub fn close_subscriptions(&self) {
        let mut state = self.state.lock().unwrap();
        state.entity_feeds.clear();
        state.event_feeds.clear();
    }

    pub fn subscriptions_opened(&self) -> usize {
        self.state.lock().unwrap().opened
    }

    /// Subscriptions whose consumer has not cancelled.
    pub fn live_subscriptions(&self) -> usize {
        let mut state = self.state.lock().unwrap();
        let state = &mut *state;
        let mut live = 0;
        for (_, feed) in state
            .entity_feeds
            .iter_mut()
            .chain(state.event_feeds.iter_mut())
        {
            if !feed.is_cancelled() {
                live += 1;
            }
        }
        live
    }

    pub fn queries(&self) -> Vec<Query> {
        self.state.lock().unwrap().queries.clone()
    }

    fn fetch(&self, query: &Query, events: bool) -> crate::Result<Vec<RawEntity>> {
        let mut state = self.state.lock().unwrap();
        state.queries.push(query.clone());
        if let Some(failure) = &state.failure {
            return Err(anyhow::anyhow!("{failure}"));
        }
        if let Some(model) = query
            .models
            .iter()
            .find(|model| state.failing_models.contains(model))
        {
            return Err(anyhow::anyhow!("model `{model}` unavailable"));
        }
        let records = if events {
            &state.event_messages
        } else {
            &state.entities
        };
        Ok(records
            .iter()
            .filter(|record| query.matches(record))
            .cloned()
            .collect())
    }

    fn open(&self, clause: &Query, events: bool) -> Subscription {
        let (subscription, feed) = Subscription::channel();
        let mut state = self.state.lock().unwrap();
        state.opened += 1;
        let feeds = if events {
            &mut state.event_feeds
        } else {
            &mut state.entity_feeds
        };
        feeds.push((clause.clone(), feed));
        subscription
    }
}

fn emit(feeds: &[(Query, SubscriptionFeed)], data: Vec<RawEntity>) -> usize {
    feeds
        .iter()
        .filter(|(clause, feed)| {
            let matching: Vec<RawEntity> = data
                .iter()
                .filter(|record| clause.matches(record))
                .cloned()
                .collect();
            !matching.is_empty() && feed.push(SubscriptionUpdate::data(matching))
        })
        .count()
}

impl IndexerClient for FakeIndexer {
    async fn get_entities(&self, query: &Query) -> crate::Result<Vec<RawEntity>> {
        self.fetch(query, false)
    }

    async fn get_event_messages(&self, query: &Query) -> crate::Result<Vec<RawEntity>> {
        self.fetch(query, true)
    }

    async fn on_entity_updated(
        &self,
        clause: &Query,
        _ids: &[Felt],
    ) -> crate::Result<Subscription> {
        Ok(self.open(clause, false))
    }

    async fn on_event_message_updated(
        &self,
        clause: &Query,
        _ids: &[Felt],
    ) -> crate::Result<Subscription> {
        Ok(self.open(clause, true))
    }
}

#[derive(Clone, Default)]
pub struct RecordingToaster {
    toasts: Arc<Mutex<Vec<Toast>>>,
}

impl RecordingToaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toasts(&self) -> Vec<Toast> {
        self.toasts.lock().unwrap().clone()
    }
}

impl Toaster for RecordingToaster {
    fn toast(&self, toast: Toast) {
        self.toasts.lock().unwrap().push(toast);
    }
}

pub fn felt(value: u64) -> Felt {
    Felt::from(value)
}

fn hex(value: u64) -> String {
    felt(value).to_hex()
}

fn keys(parts: &[u64]) -> Felt {
    let folded = parts
        .iter()
        .fold(0u64, |acc, part| acc.wrapping_mul(31).wrapping_add(*part));
    felt(folded)
}

pub fn entity(namespace: &str, model: &str, hashed_keys: Felt, value: Value) -> RawEntity {
    RawEntity::new(hashed_keys).with_model(format!("{namespace}-{model}"), value)
}

/// One-off quest; each `(task, total)` becomes a task.
pub fn definition_entity(
    namespace: &str,
    quest: u64,
    conditions: &[u64],
    tasks: &[(u64, u64)],
) -> RawEntity {
    let tasks: Vec<Value> = tasks
        .iter()
        .map(|(task, total)| {
            json!({ "id": hex(*task), "total": total, "description": format!("task {task}") })
        })
        .collect();
    let conditions: Vec<String> = conditions.iter().copied().map(hex).collect();
    entity(
        namespace,
        QuestDefinition::NAME,
        keys(&[1, quest]),
        json!({
            "id": hex(quest),
            "start": 0,
            "end": 0,
            "duration": 0,
            "interval": 0,
            "tasks": tasks,
            "conditions": conditions,
        }),
    )
}

pub fn creation_entity(namespace: &str, quest: u64, name: &str) -> RawEntity {
    let metadata = json!({
        "name": name,
        "description": format!("{name} description"),
        "registry": "0x1",
        "rewards": [{ "name": "Gold", "description": "", "icon": "" }],
    });
    entity(
        namespace,
        QuestCreation::NAME,
        keys(&[2, quest]),
        json!({ "id": hex(quest), "metadata": metadata.to_string() }),
    )
}

pub fn completion_entity(
    namespace: &str,
    player: Felt,
    quest: u64,
    timestamp: u64,
    unclaimed: bool,
) -> RawEntity {
    entity(
        namespace,
        QuestCompletion::NAME,
        keys(&[3, quest]),
        json!({
            "player_id": player.to_hex(),
            "quest_id": hex(quest),
            "interval_id": 0,
            "timestamp": timestamp,
            "unclaimed": unclaimed,
            "lock_count": 0,
        }),
    )
}

pub fn advancement_entity(
    namespace: &str,
    player: Felt,
    quest: u64,
    task: u64,
    count: u64,
) -> RawEntity {
    entity(
        namespace,
        QuestAdvancement::NAME,
        keys(&[4, quest, task]),
        json!({
            "player_id": player.to_hex(),
            "quest_id": hex(quest),
            "task_id": hex(task),
            "interval_id": 0,
            "count": count,
            "timestamp": FIXED_NOW,
        }),
    )
}

pub fn lifecycle_entity(
    namespace: &str,
    kind: LifecycleKind,
    player: Felt,
    quest: u64,
) -> RawEntity {
    RawEntity::new(keys(&[5, quest])).with_model(
        kind.tag(namespace),
        json!({
            "player_id": player.to_hex(),
            "quest_id": hex(quest),
            "interval_id": 0,
            "time": FIXED_NOW,
        }),
    )
}
