//! JSON-file user store — read-all / merge / write-all under one lock.
//!
//! The collection is a single human-inspectable JSON array. Store I/O
//! failures are logged and absorbed: mutating calls degrade to no-ops and
//! reads return an empty snapshot, so the bot never crashes on a bad disk.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;

use crate::channels::Transport;
use crate::error::StoreError;
use crate::store::model::{AnswerStats, BroadcastReport, Stats, UserRecord};

/// Durable collection of user records.
pub struct UserStore {
    path: PathBuf,
    /// Serializes every read-modify-write cycle over the whole collection.
    lock: Mutex<()>,
    broadcast_delay: Duration,
}

impl UserStore {
    pub fn new(path: PathBuf, broadcast_delay: Duration) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
            broadcast_delay,
        }
    }

    /// Merge a partial record into the collection by id, creating the
    /// record if absent. Degrades to a no-op on I/O failure.
    pub async fn upsert(&self, partial: UserRecord) {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await;

        match records.iter_mut().find(|r| r.id == partial.id) {
            Some(existing) => existing.merge_from(partial),
            None => records.push(partial),
        }

        if let Err(e) = self.save(&records).await {
            tracing::error!("Failed to save user records: {e}");
        }
    }

    /// Set `last_activity` to now on the record with this id, if it exists.
    /// Unknown ids and I/O failures are silent no-ops.
    pub async fn touch_activity(&self, id: &str) {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await;

        let Some(record) = records.iter_mut().find(|r| r.id == id) else {
            return;
        };
        record.last_activity = Some(Utc::now());

        if let Err(e) = self.save(&records).await {
            tracing::error!("Failed to save user activity: {e}");
        }
    }

    /// Full snapshot in stored order. Empty on read failure.
    pub async fn all(&self) -> Vec<UserRecord> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    /// Usage statistics, computed fresh on every call.
    pub async fn statistics(&self) -> Stats {
        compute_stats(&self.all().await, Utc::now())
    }

    /// Answer statistics over the recognized keys, computed fresh.
    pub async fn answer_statistics(&self) -> AnswerStats {
        compute_answer_stats(&self.all().await)
    }

    /// Send `text` to every record in the snapshot, sequentially, with a
    /// small delay between sends. A failed send is counted and logged but
    /// never aborts the remaining recipients.
    pub async fn broadcast(&self, text: &str, transport: &dyn Transport) -> BroadcastReport {
        let snapshot = self.all().await;
        let mut report = BroadcastReport::default();

        for record in &snapshot {
            match transport.send(&record.id, text, None).await {
                Ok(()) => report.success += 1,
                Err(e) => {
                    tracing::error!("Failed to broadcast to user {}: {e}", record.id);
                    report.failed += 1;
                }
            }
            if !self.broadcast_delay.is_zero() {
                tokio::time::sleep(self.broadcast_delay).await;
            }
        }

        report
    }

    // ── Durable medium ──────────────────────────────────────────────

    async fn load(&self) -> Vec<UserRecord> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                tracing::error!("Failed to read user records: {e}");
                return Vec::new();
            }
        };

        match serde_json::from_slice(&data) {
            Ok(records) => records,
            Err(e) => {
                tracing::error!("Failed to parse user records: {e}");
                Vec::new()
            }
        }
    }

    async fn save(&self, records: &[UserRecord]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let data = serde_json::to_vec_pretty(records)?;
        tokio::fs::write(&self.path, data).await?;
        Ok(())
    }
}

// ── Aggregation ─────────────────────────────────────────────────────

fn compute_stats(records: &[UserRecord], now: DateTime<Utc>) -> Stats {
    let mut stats = Stats {
        total_users: records.len(),
        ..Stats::default()
    };

    for record in records {
        if let Some(code) = &record.language_code {
            *stats.language_distribution.entry(code.clone()).or_insert(0) += 1;
        }

        if let Some(joined) = record.joined_at {
            let month = joined.format("%Y-%m").to_string();
            *stats.users_by_month.entry(month).or_insert(0) += 1;
        }

        if let Some(last) = record.last_activity {
            // Full-precision comparison: num_hours() would truncate and let
            // a 24h59m-old record slip into the 24-hour window.
            let elapsed = now - last;
            if elapsed <= TimeDelta::hours(24) {
                stats.active_last_day += 1;
            }
            if elapsed <= TimeDelta::days(7) {
                stats.active_last_week += 1;
            }
            if elapsed <= TimeDelta::days(30) {
                stats.active_last_month += 1;
            }
        }
    }

    stats
}

fn compute_answer_stats(records: &[UserRecord]) -> AnswerStats {
    let mut stats = AnswerStats::default();

    for record in records {
        let Some(answers) = &record.answers else {
            continue;
        };
        if answers.is_empty() {
            continue;
        }
        stats.total_interactions += 1;

        count_key(answers, "genre", &mut stats.genre_preferences);
        count_key(answers, "length", &mut stats.length_preferences);
        count_key(answers, "mood", &mut stats.mood_preferences);
    }

    stats
}

fn count_key(
    answers: &std::collections::HashMap<String, String>,
    key: &str,
    into: &mut BTreeMap<String, usize>,
) {
    if let Some(label) = answers.get(key) {
        *into.entry(label.clone()).or_insert(0) += 1;
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::TimeDelta;

    use super::*;
    use crate::error::ChannelError;

    fn store_in(dir: &tempfile::TempDir) -> UserStore {
        UserStore::new(dir.path().join("users.json"), Duration::ZERO)
    }

    fn partial(id: &str) -> UserRecord {
        UserRecord::new(id)
    }

    // ── Upsert / merge ──────────────────────────────────────────────

    #[tokio::test]
    async fn upsert_creates_then_merges() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let mut first = partial("1");
        first.username = Some("pari".into());
        first.answers = Some(HashMap::from([("genre".into(), "کمدی".into())]));
        store.upsert(first).await;

        let mut second = partial("1");
        second.last_activity = Some(Utc::now());
        store.upsert(second).await;

        let records = store.all().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].username.as_deref(), Some("pari"));
        assert!(records[0].answers.is_some());
        assert!(records[0].last_activity.is_some());
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let mut p = partial("1");
        p.username = Some("pari".into());
        p.joined_at = Some(Utc::now());

        store.upsert(p.clone()).await;
        let once = store.all().await;
        store.upsert(p).await;
        let twice = store.all().await;

        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn upsert_keeps_ids_unique() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store.upsert(partial("1")).await;
        store.upsert(partial("2")).await;
        store.upsert(partial("1")).await;

        let ids: Vec<String> = store.all().await.into_iter().map(|r| r.id).collect();
        assert_eq!(ids, ["1", "2"]);
    }

    // ── touch_activity ──────────────────────────────────────────────

    #[tokio::test]
    async fn touch_activity_updates_existing() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store.upsert(partial("1")).await;
        store.touch_activity("1").await;

        let records = store.all().await;
        assert!(records[0].last_activity.is_some());
    }

    #[tokio::test]
    async fn touch_activity_unknown_id_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store.upsert(partial("1")).await;
        store.touch_activity("999").await;

        let records = store.all().await;
        assert_eq!(records.len(), 1);
        assert!(records[0].last_activity.is_none());
    }

    // ── Read degradation ────────────────────────────────────────────

    #[tokio::test]
    async fn all_is_empty_when_file_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.all().await.is_empty());
    }

    #[tokio::test]
    async fn all_is_empty_when_file_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        std::fs::write(&path, "not json {{{").unwrap();

        let store = UserStore::new(path, Duration::ZERO);
        assert!(store.all().await.is_empty());
    }

    // ── Statistics ──────────────────────────────────────────────────

    #[test]
    fn stats_language_distribution() {
        let now = Utc::now();
        let mut a = partial("1");
        a.language_code = Some("fa".into());
        let mut b = partial("2");
        b.language_code = Some("fa".into());
        let mut c = partial("3");
        c.language_code = Some("en".into());
        let d = partial("4"); // no language_code

        let stats = compute_stats(&[a, b, c, d], now);
        assert_eq!(stats.total_users, 4);
        assert_eq!(stats.language_distribution.get("fa"), Some(&2));
        assert_eq!(stats.language_distribution.get("en"), Some(&1));
        assert_eq!(stats.language_distribution.len(), 2);
    }

    #[test]
    fn stats_activity_windows() {
        let now = Utc::now();
        let mut hour_ago = partial("1");
        hour_ago.last_activity = Some(now - TimeDelta::hours(1));
        let mut three_days = partial("2");
        three_days.last_activity = Some(now - TimeDelta::days(3));
        let mut two_weeks = partial("3");
        two_weeks.last_activity = Some(now - TimeDelta::days(14));
        let mut ancient = partial("4");
        ancient.last_activity = Some(now - TimeDelta::days(90));
        let never = partial("5"); // no last_activity

        let stats = compute_stats(&[hour_ago, three_days, two_weeks, ancient, never], now);
        assert_eq!(stats.active_last_day, 1);
        assert_eq!(stats.active_last_week, 2);
        assert_eq!(stats.active_last_month, 3);
    }

    #[test]
    fn stats_activity_windows_do_not_truncate() {
        let now = Utc::now();
        let mut just_over_day = partial("1");
        just_over_day.last_activity = Some(now - TimeDelta::hours(24) - TimeDelta::minutes(59));
        let mut just_over_month = partial("2");
        just_over_month.last_activity = Some(now - TimeDelta::days(30) - TimeDelta::minutes(30));

        let stats = compute_stats(&[just_over_day, just_over_month], now);
        assert_eq!(stats.active_last_day, 0);
        assert_eq!(stats.active_last_week, 1);
        assert_eq!(stats.active_last_month, 1);
    }

    #[test]
    fn stats_registrations_by_month() {
        let now = Utc::now();
        let mut a = partial("1");
        a.joined_at = Some("2024-06-15T10:00:00Z".parse().unwrap());
        let mut b = partial("2");
        b.joined_at = Some("2024-06-01T00:00:00Z".parse().unwrap());
        let mut c = partial("3");
        c.joined_at = Some("2025-01-02T12:00:00Z".parse().unwrap());

        let stats = compute_stats(&[a, b, c], now);
        assert_eq!(stats.users_by_month.get("2024-06"), Some(&2));
        assert_eq!(stats.users_by_month.get("2025-01"), Some(&1));
    }

    #[test]
    fn answer_stats_count_recognized_keys() {
        let mut a = partial("1");
        a.answers = Some(HashMap::from([
            ("genre".to_string(), "کمدی".to_string()),
            ("mood".to_string(), "شاد".to_string()),
        ]));
        let mut b = partial("2");
        b.answers = Some(HashMap::from([
            ("genre".to_string(), "کمدی".to_string()),
            ("length".to_string(), "یک فیلم بلند".to_string()),
        ]));
        let no_answers = partial("3");
        let mut empty_answers = partial("4");
        empty_answers.answers = Some(HashMap::new());

        let stats = compute_answer_stats(&[a, b, no_answers, empty_answers]);
        assert_eq!(stats.total_interactions, 2);
        assert_eq!(stats.genre_preferences.get("کمدی"), Some(&2));
        assert_eq!(stats.length_preferences.get("یک فیلم بلند"), Some(&1));
        assert_eq!(stats.mood_preferences.get("شاد"), Some(&1));
    }

    // ── Broadcast ───────────────────────────────────────────────────

    /// Transport that fails for a chosen set of recipient ids and records
    /// every attempted send.
    struct FlakyTransport {
        fail_for: Vec<String>,
        attempted: Arc<std::sync::Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        async fn send(
            &self,
            chat_id: &str,
            _text: &str,
            _keyboard: Option<&[String]>,
        ) -> Result<(), ChannelError> {
            self.attempted.lock().unwrap().push(chat_id.to_string());
            if self.fail_for.iter().any(|id| id == chat_id) {
                return Err(ChannelError::SendFailed {
                    name: "test".into(),
                    reason: "blocked".into(),
                });
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn broadcast_counts_and_attempts_everyone() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        for id in ["1", "2", "3", "4"] {
            store.upsert(partial(id)).await;
        }

        let attempted = Arc::new(std::sync::Mutex::new(Vec::new()));
        let transport = FlakyTransport {
            // The very first recipient fails; the rest must still be tried.
            fail_for: vec!["1".into(), "3".into()],
            attempted: Arc::clone(&attempted),
        };

        let report = store.broadcast("سلام", &transport).await;
        assert_eq!(report.success, 2);
        assert_eq!(report.failed, 2);
        assert_eq!(*attempted.lock().unwrap(), ["1", "2", "3", "4"]);
    }

    #[tokio::test]
    async fn broadcast_over_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let transport = FlakyTransport {
            fail_for: vec![],
            attempted: Arc::new(std::sync::Mutex::new(Vec::new())),
        };

        let report = store.broadcast("سلام", &transport).await;
        assert_eq!(report, BroadcastReport::default());
    }
}
