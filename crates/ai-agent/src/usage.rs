use serde::{Deserialize, Serialize};

use crate::language_model::LanguageModelUsage;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub prompt_units: u64,
    pub completion_units: u64,
    pub total_units: u64,
}

impl UsageRecord {
    pub fn new(prompt_units: u64, completion_units: u64, total_units: u64) -> Self {
        Self {
            prompt_units,
            completion_units,
            total_units,
        }
    }

    /// `None` when the service reported no usage at all. A missing total is
    /// derived from the other two fields.
    pub fn from_usage(usage: &LanguageModelUsage) -> Option<Self> {
        if usage.is_empty() {
            return None;
        }
        let prompt = u64::from(usage.prompt_tokens.unwrap_or(0));
        let completion = u64::from(usage.completion_tokens.unwrap_or(0));
        let total = usage
            .total_tokens
            .map(u64::from)
            .unwrap_or(prompt + completion);
        Some(Self::new(prompt, completion, total))
    }

    fn add(&mut self, other: UsageRecord) {
        self.prompt_units = self.prompt_units.saturating_add(other.prompt_units);
        self.completion_units = self.completion_units.saturating_add(other.completion_units);
        self.total_units = self.total_units.saturating_add(other.total_units);
    }
}

/// Additive token accounting for a session and for the turn in progress.
///
/// Responses without usage metadata are ignored rather than recorded as zero,
/// so `last_turn_totals` is `None` when the service reported nothing.
#[derive(Debug, Default, Clone)]
pub struct UsageTracker {
    session: UsageRecord,
    recorded_calls: u64,
    current_turn: Option<UsageRecord>,
    last_turn: Option<UsageRecord>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_turn(&mut self) {
        self.current_turn = None;
    }

    /// Closes the turn in progress; its totals become `last_turn_totals`.
    pub fn end_turn(&mut self) -> Option<UsageRecord> {
        self.last_turn = self.current_turn.take();
        self.last_turn
    }

    pub fn record(&mut self, prompt_units: u64, completion_units: u64, total_units: u64) {
        let record = UsageRecord::new(prompt_units, completion_units, total_units);
        self.session.add(record);
        self.current_turn.get_or_insert_with(UsageRecord::default).add(record);
        self.recorded_calls += 1;
    }

    pub fn record_response(&mut self, usage: &LanguageModelUsage) {
        if let Some(record) = UsageRecord::from_usage(usage) {
            self.record(
                record.prompt_units,
                record.completion_units,
                record.total_units,
            );
        }
    }

    pub fn session_totals(&self) -> UsageRecord {
        self.session
    }

    pub fn last_turn_totals(&self) -> Option<UsageRecord> {
        self.last_turn
    }

    pub fn recorded_calls(&self) -> u64 {
        self.recorded_calls
    }
}
