use crate::{
    config::{
        EngineConfig,
        ProgressionMode,
    },
    dedup::Keyed,
    felt::Felt,
    models::{
        Item,
        QuestCompletion,
        QuestCreation,
        QuestDefinition,
    },
    store::StoreSnapshot,
};
use serde::Serialize;
use std::{
    cmp::Ordering,
    collections::HashMap,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskView {
    pub id: Felt,
    pub description: String,
    pub total: u64,
    pub count: u64,
}

/// What the UI shows for one quest in its current interval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestView {
    pub id: Felt,
    pub interval_id: u64,
    pub name: String,
    pub description: String,
    pub registry: String,
    pub end: u64,
    pub completed: bool,
    pub claimed: bool,
    pub locked: bool,
    pub progression: f64,
    pub rewards: Vec<Item>,
    pub tasks: Vec<TaskView>,
}

/// Derives the ordered quest list from a store snapshot. Holds no state
/// between projections.
#[derive(Debug, Clone)]
pub struct Projector {
    progression: ProgressionMode,
    placeholder_name: String,
}

impl Default for Projector {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl Projector {
    pub fn new(progression: ProgressionMode, placeholder_name: impl Into<String>) -> Self {
        Self {
            progression,
            placeholder_name: placeholder_name.into(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.progression, config.placeholder_name.clone())
    }

    pub fn project(&self, snapshot: &StoreSnapshot, now: u64) -> Vec<QuestView> {
        let creations: HashMap<Felt, &QuestCreation> = snapshot
            .creations
            .iter()
            .map(|creation| (creation.quest_id, creation))
            .collect();
        let completions: HashMap<(Felt, u64), &QuestCompletion> = snapshot
            .completions
            .iter()
            .map(|completion| (completion.key(), completion))
            .collect();
        let counts: HashMap<(Felt, Felt, u64), u64> = snapshot
            .advancements
            .iter()
            .map(|advancement| (advancement.key(), advancement.count))
            .collect();

        let mut quests: Vec<(QuestView, &[Felt])> = snapshot
            .definitions
            .iter()
            .map(|definition| {
                let view = self.view(definition, now, &creations, &completions, &counts);
                (view, definition.conditions.as_slice())
            })
            .collect();

        // Single pass over the first-pass results; cycles stay locked.
        let completed: HashMap<Felt, bool> = quests
            .iter()
            .map(|(quest, _)| (quest.id, quest.completed))
            .collect();
        for (quest, conditions) in &mut quests {
            quest.locked = !conditions
                .iter()
                .all(|id| completed.get(id).copied().unwrap_or(false));
        }

        let mut quests: Vec<QuestView> =
            quests.into_iter().map(|(quest, _)| quest).collect();
        quests.sort_by(display_order);
        quests
    }

    fn view(
        &self,
        definition: &QuestDefinition,
        now: u64,
        creations: &HashMap<Felt, &QuestCreation>,
        completions: &HashMap<(Felt, u64), &QuestCompletion>,
        counts: &HashMap<(Felt, Felt, u64), u64>,
    ) -> QuestView {
        let id = definition.id;
        let interval_id = definition.schedule.interval_id(now);
        let completion = completions.get(&(id, interval_id));
        let tasks: Vec<TaskView> = definition
            .tasks
            .iter()
            .map(|task| TaskView {
                id: task.id,
                description: task.description.clone(),
                total: task.total,
                count: counts.get(&(id, task.id, interval_id)).copied().unwrap_or(0),
            })
            .collect();
        let (name, description, registry, rewards) = match creations.get(&id) {
            Some(creation) => (
                creation.name.clone(),
                creation.description.clone(),
                creation.registry.clone(),
                creation.rewards.clone(),
            ),
            None => (
                self.placeholder_name.clone(),
                String::new(),
                String::new(),
                Vec::new(),
            ),
        };
        QuestView {
            id,
            interval_id,
            name,
            description,
            registry,
            end: definition.schedule.next_end(now),
            completed: completion.is_some_and(|c| c.timestamp > 0),
            claimed: completion.is_some_and(|c| !c.unclaimed),
            locked: false,
            progression: progression(self.progression, &tasks),
            rewards,
            tasks,
        }
    }
}

fn task_percentage(task: &TaskView) -> f64 {
    if task.total == 0 {
        return 0.0;
    }
    task.count as f64 / task.total as f64 * 100.0
}

pub fn progression(mode: ProgressionMode, tasks: &[TaskView]) -> f64 {
    let sum: f64 = tasks.iter().map(task_percentage).sum();
    match mode {
        ProgressionMode::Sum => sum,
        ProgressionMode::Average if tasks.is_empty() => 0.0,
        ProgressionMode::Average => sum / tasks.len() as f64,
    }
}

/// Completed first, then higher progression, then sooner end, then id.
pub fn display_order(a: &QuestView, b: &QuestView) -> Ordering {
    b.completed
        .cmp(&a.completed)
        .then_with(|| b.progression.total_cmp(&a.progression))
        .then_with(|| a.end.cmp(&b.end))
        .then_with(|| a.id.cmp(&b.id))
}
