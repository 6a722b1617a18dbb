use crate::models::LifecycleKind;
use anyhow::Context;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fs,
    path::Path,
};

pub const DEFAULT_NAMESPACE: &str = "quest";
pub const DEFAULT_PLACEHOLDER_NAME: &str = "Quest";

/// How per-task percentages fold into a quest's `progression`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressionMode {
    /// Sum of per-task percentages; three finished tasks report 300.
    #[default]
    Sum,
    /// Mean of per-task percentages, bounded by 100 for finished quests.
    Average,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Subtitles {
    pub unlocked: String,
    pub completed: String,
    pub claimed: String,
}

impl Default for Subtitles {
    fn default() -> Self {
        Self {
            unlocked: "Quest unlocked".to_string(),
            completed: "Quest completed".to_string(),
            claimed: "Quest claimed".to_string(),
        }
    }
}

impl Subtitles {
    pub fn for_kind(&self, kind: LifecycleKind) -> &str {
        match kind {
            LifecycleKind::Unlocked => &self.unlocked,
            LifecycleKind::Completed => &self.completed,
            LifecycleKind::Claimed => &self.claimed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Prefix of every model name the indexer serves for this game.
    pub namespace: String,
    pub progression: ProgressionMode,
    /// Shown for quests whose creation metadata has not arrived yet.
    pub placeholder_name: String,
    pub subtitles: Subtitles,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            progression: ProgressionMode::default(),
            placeholder_name: DEFAULT_PLACEHOLDER_NAME.to_string(),
            subtitles: Subtitles::default(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading engine config {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("parsing engine config {}", path.display()))
    }

    /// Fully-qualified model name, e.g. `quest-QuestDefinition`.
    pub fn model_tag(&self, model: &str) -> String {
        format!("{}-{model}", self.namespace)
    }
}
