use crate::{
    config::Subtitles,
    models::{
        LifecycleEvent,
        QuestCreation,
    },
};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toast {
    pub title: String,
    pub subtitle: String,
}

/// Whatever renders notifications for the player.
pub trait Toaster {
    fn toast(&self, toast: Toast);
}

impl<F> Toaster for F
where
    F: Fn(Toast),
{
    fn toast(&self, toast: Toast) {
        self(toast)
    }
}

/// Turns lifecycle events into toasts, using the quest's creation metadata
/// for the title.
pub struct NotificationBridge<T> {
    toaster: T,
    subtitles: Subtitles,
}

impl<T> NotificationBridge<T> {
    pub fn new(toaster: T, subtitles: Subtitles) -> Self {
        Self { toaster, subtitles }
    }

    pub fn toaster(&self) -> &T {
        &self.toaster
    }
}

impl<T: Toaster> NotificationBridge<T> {
    /// Forward a toast for `event` if its quest is known. Events for quests
    /// without a creation record are dropped; there is no retry.
    pub fn dispatch(
        &self,
        event: &LifecycleEvent,
        creations: &[QuestCreation],
    ) -> Option<Toast> {
        let Some(creation) = creations.iter().find(|c| c.quest_id == event.quest_id)
        else {
            tracing::debug!(
                quest = %event.quest_id,
                kind = ?event.kind,
                "no creation for quest; dropping notification"
            );
            return None;
        };
        let toast = Toast {
            title: creation.name.clone(),
            subtitle: self.subtitles.for_kind(event.kind).to_string(),
        };
        self.toaster.toast(toast.clone());
        Some(toast)
    }
}
