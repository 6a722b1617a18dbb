//! Typed quest records and the parsers that build them from raw indexer
//! entities.
//!
//! The indexing service hands out loosely-typed entities: a map from
//! `"{namespace}-{Model}"` to the model's field values, where every value may
//! be wrapped in a `{ "type": .., "type_name": .., "value": .. }` envelope.
//! Each record kind has its own wire shape (`*Dto`) which is unwrapped and then
//! converted into the domain type, so the rest of the engine never sees JSON.
use crate::{
    dedup::{
        self,
        Keyed,
    },
    felt::Felt,
    schedule::Schedule,
};
use serde::{
    Deserialize,
    Serialize,
    de::DeserializeOwned,
};
use serde_json::Value;
use std::collections::BTreeMap;

/// One entity (or event message) as returned by the indexing service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEntity {
    #[serde(default)]
    pub hashed_keys: Felt,
    #[serde(default)]
    pub models: BTreeMap<String, Value>,
}

impl RawEntity {
    pub fn new(hashed_keys: Felt) -> Self {
        Self {
            hashed_keys,
            models: BTreeMap::new(),
        }
    }

    pub fn with_model(mut self, tag: impl Into<String>, value: Value) -> Self {
        self.models.insert(tag.into(), value);
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("model `{model}` has an unexpected shape: {source}")]
    Shape {
        model: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("metadata of quest {quest} is not valid JSON: {source}")]
    Metadata {
        quest: Felt,
        #[source]
        source: serde_json::Error,
    },
}

/// Strip the indexer's `{ type, value }` envelopes, recursively.
pub fn normalize_value(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("type") && map.contains_key("value") => {
            normalize_value(map.remove("value").unwrap_or(Value::Null))
        }
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (key, normalize_value(value)))
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.into_iter().map(normalize_value).collect())
        }
        other => other,
    }
}

fn from_dto<D: DeserializeOwned>(
    model: &'static str,
    value: Value,
) -> Result<D, ParseError> {
    serde_json::from_value(value).map_err(|source| ParseError::Shape { model, source })
}

/// A record kind the engine ingests from the indexing service.
pub trait Model: Keyed + Clone + Sized {
    /// Model name without the namespace prefix.
    const NAME: &'static str;

    fn from_value(value: Value) -> Result<Self, ParseError>;

    fn tag(namespace: &str) -> String {
        format!("{namespace}-{}", Self::NAME)
    }

    /// `None` when the entity does not carry this model at all.
    fn parse(namespace: &str, raw: &RawEntity) -> Option<Result<Self, ParseError>> {
        raw.models
            .get(&Self::tag(namespace))
            .map(|value| Self::from_value(normalize_value(value.clone())))
    }

    fn deduplicate(records: Vec<Self>) -> Vec<Self> {
        dedup::deduplicate(records, &[])
    }
}

/// Parse every entity carrying `T`, skipping (and logging) malformed ones so
/// a single bad record never costs the rest of the batch.
pub fn parse_all<T: Model>(namespace: &str, raws: &[RawEntity]) -> Vec<T> {
    raws.iter()
        .filter_map(|raw| match T::parse(namespace, raw)? {
            Ok(record) => Some(record),
            Err(error) => {
                tracing::warn!(
                    model = T::NAME,
                    entity = %raw.hashed_keys,
                    %error,
                    "dropping malformed record"
                );
                None
            }
        })
        .collect()
}

mod number {
    use serde::{
        Deserializer,
        de,
    };
    use std::fmt;

    struct U64Visitor;

    impl de::Visitor<'_> for U64Visitor {
        type Value = u64;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an unsigned integer, decimal string or 0x-prefixed hex string")
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<u64, E> {
            Ok(value)
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<u64, E> {
            u64::try_from(value).map_err(|_| E::custom(format!("negative value {value}")))
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<u64, E> {
            let parsed = match value.strip_prefix("0x") {
                Some(digits) => u64::from_str_radix(digits, 16),
                None => value.parse(),
            };
            parsed.map_err(|e| E::custom(format!("invalid number `{value}`: {e}")))
        }
    }

    pub fn as_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        deserializer.deserialize_any(U64Visitor)
    }

    pub fn as_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        let value = deserializer.deserialize_any(U64Visitor)?;
        u32::try_from(value).map_err(|_| de::Error::custom(format!("{value} overflows u32")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestTask {
    pub id: Felt,
    pub total: u64,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestDefinition {
    pub id: Felt,
    pub schedule: Schedule,
    /// Quests that must be completed before this one unlocks.
    pub conditions: Vec<Felt>,
    pub tasks: Vec<QuestTask>,
}

#[derive(Deserialize)]
struct QuestTaskDto {
    id: Felt,
    #[serde(deserialize_with = "number::as_u64")]
    total: u64,
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
struct QuestDefinitionDto {
    id: Felt,
    #[serde(default, deserialize_with = "number::as_u64")]
    start: u64,
    #[serde(default, deserialize_with = "number::as_u64")]
    end: u64,
    #[serde(default, deserialize_with = "number::as_u64")]
    duration: u64,
    #[serde(default, deserialize_with = "number::as_u64")]
    interval: u64,
    #[serde(default)]
    tasks: Vec<QuestTaskDto>,
    #[serde(default)]
    conditions: Vec<Felt>,
}

impl From<QuestDefinitionDto> for QuestDefinition {
    fn from(dto: QuestDefinitionDto) -> Self {
        QuestDefinition {
            id: dto.id,
            schedule: Schedule {
                start: dto.start,
                end: dto.end,
                duration: dto.duration,
                interval: dto.interval,
            },
            conditions: dto.conditions,
            tasks: dto
                .tasks
                .into_iter()
                .map(|task| QuestTask {
                    id: task.id,
                    total: task.total,
                    description: task.description,
                })
                .collect(),
        }
    }
}

impl Keyed for QuestDefinition {
    type Key = Felt;

    fn key(&self) -> Felt {
        self.id
    }
}

impl Model for QuestDefinition {
    const NAME: &'static str = "QuestDefinition";

    fn from_value(value: Value) -> Result<Self, ParseError> {
        from_dto::<QuestDefinitionDto>(Self::NAME, value).map(Into::into)
    }
}

/// Per-player completion state of one quest in one interval.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QuestCompletion {
    pub player_id: Felt,
    pub quest_id: Felt,
    #[serde(default, deserialize_with = "number::as_u64")]
    pub interval_id: u64,
    /// Zero while the quest is not completed.
    #[serde(default, deserialize_with = "number::as_u64")]
    pub timestamp: u64,
    #[serde(default)]
    pub unclaimed: bool,
    #[serde(default, deserialize_with = "number::as_u32")]
    pub lock_count: u32,
}

impl Keyed for QuestCompletion {
    type Key = (Felt, u64);

    fn key(&self) -> Self::Key {
        (self.quest_id, self.interval_id)
    }
}

impl Model for QuestCompletion {
    const NAME: &'static str = "QuestCompletion";

    fn from_value(value: Value) -> Result<Self, ParseError> {
        from_dto(Self::NAME, value)
    }
}

/// Per-player progress on one task of a quest in one interval.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QuestAdvancement {
    pub player_id: Felt,
    pub quest_id: Felt,
    pub task_id: Felt,
    #[serde(default, deserialize_with = "number::as_u64")]
    pub interval_id: u64,
    #[serde(default, deserialize_with = "number::as_u64")]
    pub count: u64,
    #[serde(default, deserialize_with = "number::as_u64")]
    pub timestamp: u64,
}

impl Keyed for QuestAdvancement {
    type Key = (Felt, Felt, u64);

    fn key(&self) -> Self::Key {
        (self.quest_id, self.task_id, self.interval_id)
    }
}

impl Model for QuestAdvancement {
    const NAME: &'static str = "QuestAdvancement";

    fn from_value(value: Value) -> Result<Self, ParseError> {
        from_dto(Self::NAME, value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
}

/// Static display metadata announced when a quest is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestCreation {
    pub quest_id: Felt,
    pub name: String,
    pub description: String,
    pub registry: String,
    pub rewards: Vec<Item>,
}

#[derive(Deserialize, Default)]
struct QuestMetadataDto {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    registry: String,
    #[serde(default)]
    rewards: Vec<Item>,
}

// Metadata is stored on chain as a JSON-encoded string, but some indexers
// expand it already.
#[derive(Deserialize)]
#[serde(untagged)]
enum MetadataDto {
    Encoded(String),
    Inline(QuestMetadataDto),
}

#[derive(Deserialize)]
struct QuestCreationDto {
    id: Felt,
    #[serde(default)]
    metadata: Option<MetadataDto>,
}

impl Keyed for QuestCreation {
    type Key = Felt;

    fn key(&self) -> Felt {
        self.quest_id
    }
}

impl Model for QuestCreation {
    const NAME: &'static str = "QuestCreation";

    fn from_value(value: Value) -> Result<Self, ParseError> {
        let dto: QuestCreationDto = from_dto(Self::NAME, value)?;
        let metadata = match dto.metadata {
            None => QuestMetadataDto::default(),
            Some(MetadataDto::Inline(metadata)) => metadata,
            Some(MetadataDto::Encoded(encoded)) if encoded.trim().is_empty() => {
                QuestMetadataDto::default()
            }
            Some(MetadataDto::Encoded(encoded)) => serde_json::from_str(&encoded)
                .map_err(|source| ParseError::Metadata {
                    quest: dto.id,
                    source,
                })?,
        };
        Ok(QuestCreation {
            quest_id: dto.id,
            name: metadata.name,
            description: metadata.description,
            registry: metadata.registry,
            rewards: metadata.rewards,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleKind {
    Unlocked,
    Completed,
    Claimed,
}

impl LifecycleKind {
    pub const ALL: [LifecycleKind; 3] = [
        LifecycleKind::Unlocked,
        LifecycleKind::Completed,
        LifecycleKind::Claimed,
    ];

    pub fn model_name(self) -> &'static str {
        match self {
            LifecycleKind::Unlocked => "QuestUnlocked",
            LifecycleKind::Completed => "QuestCompleted",
            LifecycleKind::Claimed => "QuestClaimed",
        }
    }

    pub fn tag(self, namespace: &str) -> String {
        format!("{namespace}-{}", self.model_name())
    }
}

/// Ephemeral notification that a quest changed state for a player. Never
/// stored; consumed once by the notification bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub kind: LifecycleKind,
    pub player_id: Felt,
    pub quest_id: Felt,
    pub interval_id: u64,
    pub time: u64,
}

#[derive(Deserialize)]
struct LifecycleEventDto {
    player_id: Felt,
    quest_id: Felt,
    #[serde(default, deserialize_with = "number::as_u64")]
    interval_id: u64,
    #[serde(default, deserialize_with = "number::as_u64")]
    time: u64,
}

impl LifecycleEvent {
    pub fn parse(namespace: &str, raw: &RawEntity) -> Option<Result<Self, ParseError>> {
        LifecycleKind::ALL.into_iter().find_map(|kind| {
            let value = raw.models.get(&kind.tag(namespace))?;
            let parsed = from_dto::<LifecycleEventDto>(
                kind.model_name(),
                normalize_value(value.clone()),
            )
            .map(|dto| LifecycleEvent {
                kind,
                player_id: dto.player_id,
                quest_id: dto.quest_id,
                interval_id: dto.interval_id,
                time: dto.time,
            });
            Some(parsed)
        })
    }

    pub fn parse_all(namespace: &str, raws: &[RawEntity]) -> Vec<Self> {
        raws.iter()
            .filter_map(|raw| match Self::parse(namespace, raw)? {
                Ok(event) => Some(event),
                Err(error) => {
                    tracing::warn!(
                        entity = %raw.hashed_keys,
                        %error,
                        "dropping malformed lifecycle event"
                    );
                    None
                }
            })
            .collect()
    }
}

/// Every stored record kind parsed out of one delivery from the indexer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityBatch {
    pub definitions: Vec<QuestDefinition>,
    pub completions: Vec<QuestCompletion>,
    pub advancements: Vec<QuestAdvancement>,
    pub creations: Vec<QuestCreation>,
}

impl EntityBatch {
    pub fn parse(namespace: &str, raws: &[RawEntity]) -> Self {
        Self {
            definitions: parse_all(namespace, raws),
            completions: parse_all(namespace, raws),
            advancements: parse_all(namespace, raws),
            creations: parse_all(namespace, raws),
        }
    }

    /// Drop player-scoped records that belong to someone else.
    pub fn retain_player(&mut self, player: &Felt) {
        self.completions.retain(|c| c.player_id == *player);
        self.advancements.retain(|a| a.player_id == *player);
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
            && self.completions.is_empty()
            && self.advancements.is_empty()
            && self.creations.is_empty()
    }
}
