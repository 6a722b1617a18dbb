//! Replays a recorded indexer session from a JSON file.
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use quest_engine::{
    Felt,
    indexer::{
        IndexerClient,
        Query,
        Subscription,
        SubscriptionFeed,
        SubscriptionUpdate,
    },
    models::RawEntity,
};
use serde::Deserialize;
use std::{
    cell::RefCell,
    fs,
    path::Path,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    Entities,
    Events,
}

/// One push on a live subscription.
#[derive(Debug, Clone, Deserialize)]
pub struct LiveBatch {
    pub stream: Stream,
    #[serde(default)]
    pub data: Vec<RawEntity>,
    #[serde(default)]
    pub error: Option<String>,
}

impl LiveBatch {
    fn update(&self) -> SubscriptionUpdate {
        SubscriptionUpdate {
            data: self.data.clone(),
            error: self.error.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub entities: Vec<RawEntity>,
    #[serde(default)]
    pub event_messages: Vec<RawEntity>,
    #[serde(default)]
    pub live: Vec<LiveBatch>,
}

impl Fixture {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .wrap_err_with(|| format!("reading fixture {}", path.display()))?;
        serde_json::from_str(&contents)
            .wrap_err_with(|| format!("parsing fixture {}", path.display()))
    }
}

/// Serves one-shot queries from the fixture and hands live batches to
/// whoever subscribed.
pub struct FixtureIndexer {
    entities: Vec<RawEntity>,
    event_messages: Vec<RawEntity>,
    entity_feeds: RefCell<Vec<SubscriptionFeed>>,
    event_feeds: RefCell<Vec<SubscriptionFeed>>,
}

impl FixtureIndexer {
    pub fn new(fixture: &Fixture) -> Self {
        Self {
            entities: fixture.entities.clone(),
            event_messages: fixture.event_messages.clone(),
            entity_feeds: RefCell::new(Vec::new()),
            event_feeds: RefCell::new(Vec::new()),
        }
    }

    /// Push `batch` to the matching live subscriptions. Returns how many
    /// accepted it.
    pub fn replay(&self, batch: &LiveBatch) -> usize {
        let feeds = match batch.stream {
            Stream::Entities => &self.entity_feeds,
            Stream::Events => &self.event_feeds,
        };
        let mut feeds = feeds.borrow_mut();
        feeds.retain_mut(|feed| !feed.is_cancelled());
        feeds.iter().filter(|feed| feed.push(batch.update())).count()
    }

    fn matching(records: &[RawEntity], query: &Query) -> Vec<RawEntity> {
        records
            .iter()
            .filter(|record| query.matches(record))
            .cloned()
            .collect()
    }
}

impl IndexerClient for FixtureIndexer {
    async fn get_entities(&self, query: &Query) -> quest_engine::Result<Vec<RawEntity>> {
        Ok(Self::matching(&self.entities, query))
    }

    async fn get_event_messages(
        &self,
        query: &Query,
    ) -> quest_engine::Result<Vec<RawEntity>> {
        Ok(Self::matching(&self.event_messages, query))
    }

    async fn on_entity_updated(
        &self,
        _clause: &Query,
        _ids: &[Felt],
    ) -> quest_engine::Result<Subscription> {
        let (subscription, feed) = Subscription::channel();
        self.entity_feeds.borrow_mut().push(feed);
        Ok(subscription)
    }

    async fn on_event_message_updated(
        &self,
        _clause: &Query,
        _ids: &[Felt],
    ) -> quest_engine::Result<Subscription> {
        let (subscription, feed) = Subscription::channel();
        self.event_feeds.borrow_mut().push(feed);
        Ok(subscription)
    }
}
