//! Durable user-record model and aggregate statistics types.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One durable record per participant, keyed by `id`.
///
/// Every field except `id` is optional: writes are partial records that
/// merge into whatever is already stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answers: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_suggestion: Option<DateTime<Utc>>,
}

impl UserRecord {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            username: None,
            first_name: None,
            last_name: None,
            language_code: None,
            joined_at: None,
            last_activity: None,
            answers: None,
            last_suggestion: None,
        }
    }

    /// Shallow field-by-field merge: present fields of `partial` overwrite,
    /// absent fields are preserved. `joined_at` is set once and never
    /// overwritten. No field is ever cleared.
    pub fn merge_from(&mut self, partial: UserRecord) {
        if partial.username.is_some() {
            self.username = partial.username;
        }
        if partial.first_name.is_some() {
            self.first_name = partial.first_name;
        }
        if partial.last_name.is_some() {
            self.last_name = partial.last_name;
        }
        if partial.language_code.is_some() {
            self.language_code = partial.language_code;
        }
        if self.joined_at.is_none() {
            self.joined_at = partial.joined_at;
        }
        if partial.last_activity.is_some() {
            self.last_activity = partial.last_activity;
        }
        if partial.answers.is_some() {
            self.answers = partial.answers;
        }
        if partial.last_suggestion.is_some() {
            self.last_suggestion = partial.last_suggestion;
        }
    }
}

/// Aggregate usage statistics, computed fresh over the full collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stats {
    pub total_users: usize,
    pub active_last_day: usize,
    pub active_last_week: usize,
    pub active_last_month: usize,
    /// `language_code` → record count. Records without the field are excluded.
    pub language_distribution: BTreeMap<String, usize>,
    /// `"YYYY-MM"` of `joined_at` → registration count.
    pub users_by_month: BTreeMap<String, usize>,
}

/// Aggregate answer statistics over the three recognized answer keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnswerStats {
    /// Records with a non-empty `answers` field.
    pub total_interactions: usize,
    pub genre_preferences: BTreeMap<String, usize>,
    pub length_preferences: BTreeMap<String, usize>,
    pub mood_preferences: BTreeMap<String, usize>,
}

/// Outcome of a broadcast: every recipient in the snapshot was attempted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub success: usize,
    pub failed: usize,
}

// ── Tests ───────────────────────────────────────────────────────────
