/// Recurrence window of a quest definition, in unix seconds.
///
/// `interval == 0` marks a one-off quest. Otherwise a new period opens every
/// `interval` seconds from `start` and stays open for `duration` seconds.
/// `end == 0` means the quest never expires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Schedule {
    pub start: u64,
    pub end: u64,
    pub duration: u64,
    pub interval: u64,
}

impl Schedule {
    pub fn is_recurring(&self) -> bool {
        self.interval > 0
    }

    /// Index of the period containing `now`. Zero before `start`.
    pub fn interval_id(&self, now: u64) -> u64 {
        if !self.is_recurring() {
            return 0;
        }
        now.saturating_sub(self.start) / self.interval
    }

    /// Close of the current period.
    pub fn next_end(&self, now: u64) -> u64 {
        if !self.is_recurring() {
            return self.end;
        }
        let period_end = self
            .interval_id(now)
            .saturating_mul(self.interval)
            .saturating_add(self.start)
            .saturating_add(self.duration);
        match self.end {
            0 => period_end,
            end => period_end.min(end),
        }
    }
}
