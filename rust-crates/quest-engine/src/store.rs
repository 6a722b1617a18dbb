use crate::{
    dedup::{
        Keyed,
        deduplicate,
    },
    models::{
        EntityBatch,
        QuestAdvancement,
        QuestCompletion,
        QuestCreation,
        QuestDefinition,
    },
};
use std::sync::Arc;

/// Immutable view of the store at one instant. Cloning is cheap; every
/// collection is shared until the store replaces it wholesale.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    pub definitions: Arc<Vec<QuestDefinition>>,
    pub completions: Arc<Vec<QuestCompletion>>,
    pub advancements: Arc<Vec<QuestAdvancement>>,
    pub creations: Arc<Vec<QuestCreation>>,
}

/// In-memory store of everything ingested for the active account.
///
/// Collections only grow or have records replaced by key, and each update
/// swaps in a freshly merged collection, so a snapshot taken earlier never
/// observes a half-applied batch.
#[derive(Debug, Default)]
pub struct IngestionStore {
    current: StoreSnapshot,
}

impl IngestionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.current.clone()
    }

    pub fn definitions(&self) -> &[QuestDefinition] {
        &self.current.definitions
    }

    pub fn completions(&self) -> &[QuestCompletion] {
        &self.current.completions
    }

    pub fn advancements(&self) -> &[QuestAdvancement] {
        &self.current.advancements
    }

    pub fn creations(&self) -> &[QuestCreation] {
        &self.current.creations
    }

    pub fn is_empty(&self) -> bool {
        self.definitions().is_empty()
            && self.completions().is_empty()
            && self.advancements().is_empty()
            && self.creations().is_empty()
    }

    /// Merge a batch in front of the stored records. Returns whether any
    /// collection was replaced.
    pub fn apply(&mut self, batch: EntityBatch) -> bool {
        let EntityBatch {
            definitions,
            completions,
            advancements,
            creations,
        } = batch;
        let mut changed = merge(&mut self.current.definitions, definitions);
        changed |= merge(&mut self.current.completions, completions);
        changed |= merge(&mut self.current.advancements, advancements);
        changed |= merge(&mut self.current.creations, creations);
        changed
    }

    /// Drop everything; used when the active account changes.
    pub fn clear(&mut self) {
        self.current = StoreSnapshot::default();
    }
}

fn merge<T: Keyed + Clone>(slot: &mut Arc<Vec<T>>, incoming: Vec<T>) -> bool {
    if incoming.is_empty() {
        return false;
    }
    let merged = deduplicate(incoming, slot.as_slice());
    *slot = Arc::new(merged);
    true
}
