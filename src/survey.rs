//! Conversation controller — the per-user survey state machine.
//!
//! One `ConversationState` per participant, held in process memory for the
//! process lifetime. A participant moves `Idle → Answering(i) → Generating →
//! Idle`; while `Generating`, every inbound message from that participant is
//! dropped, which serializes generation requests per user without a queue.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::catalog::Catalog;
use crate::channels::{IncomingMessage, Transport};
use crate::error::ChannelError;
use crate::llm::SuggestionBackend;
use crate::store::{AnswerStats, Stats, UserRecord, UserStore};

/// Keyboard label that starts the survey.
pub const START_PHRASE: &str = "شروع";
/// Keyboard label offered after a suggestion to run the survey again.
pub const RESTART_PHRASE: &str = "شروع دوباره";

const GREETING: &str =
    "سلام! من میتونم بهت در انتخاب فیلم، سریال یا انیمه کمک کنم. بیا شروع کنیم!";
const WAIT_NOTICE: &str =
    "لطفا کمی صبر کنید، در حال پیدا کردن بهترین پیشنهاد برای شما هستم...";
const APOLOGY: &str = "متأسفانه در دریافت پیشنهاد مشکلی پیش آمد. لطفا دوباره تلاش کنید.";
const BROADCAST_USAGE: &str = "لطفا متن پیام را وارد کنید. مثال:\n/broadcast پیام شما";

/// Where a participant is in the survey cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Answering(usize),
    Generating,
}

#[derive(Debug, Clone)]
struct ConversationState {
    phase: Phase,
    answers: HashMap<String, String>,
}

impl ConversationState {
    fn new() -> Self {
        Self {
            phase: Phase::Idle,
            answers: HashMap::new(),
        }
    }
}

/// What `handle_answer` decided while holding the state lock; the actual
/// sends happen after the lock is released.
enum Advance {
    Ignore,
    Ask(usize),
    Generate(HashMap<String, String>),
}

/// The survey bot: sequences questions, gates generation, and routes the
/// operator commands.
pub struct SurveyBot {
    catalog: Catalog,
    store: Arc<UserStore>,
    backend: Arc<dyn SuggestionBackend>,
    transport: Arc<dyn Transport>,
    admin_user_id: Option<String>,
    states: Mutex<HashMap<String, ConversationState>>,
}

impl SurveyBot {
    pub fn new(
        catalog: Catalog,
        store: Arc<UserStore>,
        backend: Arc<dyn SuggestionBackend>,
        transport: Arc<dyn Transport>,
        admin_user_id: Option<String>,
    ) -> Self {
        Self {
            catalog,
            store,
            backend,
            transport,
            admin_user_id,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Process one inbound message to completion, including the suspend
    /// point while waiting on the generation backend.
    pub async fn handle(&self, msg: &IncomingMessage) -> Result<(), ChannelError> {
        self.store.touch_activity(&msg.sender_id).await;

        // Everything from a participant is dropped while their generation
        // request is in flight.
        {
            let states = self.states.lock().await;
            if let Some(state) = states.get(&msg.sender_id) {
                if state.phase == Phase::Generating {
                    tracing::debug!(user = %msg.sender_id, "Dropping message during generation");
                    return Ok(());
                }
            }
        }

        let text = msg.text.trim();

        if let Some((command, payload)) = parse_command(text) {
            return match command {
                "start" => self.handle_start(msg).await,
                "broadcast" => self.handle_broadcast(msg, payload).await,
                "stats" => self.handle_stats(msg).await,
                // Unknown slash commands are silently ignored.
                _ => Ok(()),
            };
        }
        if text == START_PHRASE || text == RESTART_PHRASE {
            return self.begin_survey(msg, false).await;
        }

        self.handle_answer(msg, text).await
    }

    fn is_operator(&self, sender_id: &str) -> bool {
        self.admin_user_id.as_deref() == Some(sender_id)
    }

    // ── Survey flow ─────────────────────────────────────────────────

    async fn handle_start(&self, msg: &IncomingMessage) -> Result<(), ChannelError> {
        let mut record = UserRecord::new(&msg.sender_id);
        record.username = msg.username.clone();
        record.first_name = msg.first_name.clone();
        record.last_name = msg.last_name.clone();
        record.language_code = msg.language_code.clone();
        record.joined_at = Some(Utc::now());
        self.store.upsert(record).await;

        self.begin_survey(msg, true).await
    }

    /// Reset the participant to the first question and ask it. An empty
    /// catalog goes straight to generation.
    ///
    /// Re-checks the gate under the state lock: messages are handled in
    /// independent tasks, so a restart can pass the entry check in `handle`
    /// before another task sets `Generating`. The reset and the gate check
    /// must be one critical section.
    async fn begin_survey(&self, msg: &IncomingMessage, greet: bool) -> Result<(), ChannelError> {
        {
            let mut states = self.states.lock().await;
            let state = states
                .entry(msg.sender_id.clone())
                .or_insert_with(ConversationState::new);
            if state.phase == Phase::Generating {
                return Ok(());
            }
            state.answers.clear();
            state.phase = if self.catalog.is_empty() {
                Phase::Generating
            } else {
                Phase::Answering(0)
            };
        }

        if greet {
            self.transport.send(&msg.chat_id, GREETING, None).await?;
        }
        if self.catalog.is_empty() {
            return self.run_generation(msg, HashMap::new()).await;
        }
        self.ask_question(msg, 0).await
    }

    async fn ask_question(&self, msg: &IncomingMessage, index: usize) -> Result<(), ChannelError> {
        let Some(question) = self.catalog.by_index(index) else {
            return Ok(());
        };
        self.transport
            .send(&msg.chat_id, &question.text, Some(&question.options))
            .await
    }

    /// Free text while answering: an exact match against the current
    /// question's options advances the survey; anything else is silently
    /// ignored. Participants with no state are ignored too.
    async fn handle_answer(&self, msg: &IncomingMessage, text: &str) -> Result<(), ChannelError> {
        let advance = {
            let mut states = self.states.lock().await;
            let Some(state) = states.get_mut(&msg.sender_id) else {
                return Ok(());
            };
            let Phase::Answering(index) = state.phase else {
                return Ok(());
            };
            let Some(question) = self.catalog.by_index(index) else {
                return Ok(());
            };
            if !question.options.iter().any(|o| o == text) {
                Advance::Ignore
            } else {
                state.answers.insert(question.id.clone(), text.to_string());
                let next = index + 1;
                if next >= self.catalog.len() {
                    state.phase = Phase::Generating;
                    Advance::Generate(state.answers.clone())
                } else {
                    state.phase = Phase::Answering(next);
                    Advance::Ask(next)
                }
            }
        };

        match advance {
            Advance::Ignore => Ok(()),
            Advance::Ask(index) => self.ask_question(msg, index).await,
            Advance::Generate(answers) => self.run_generation(msg, answers).await,
        }
    }

    /// Run the generation call for a completed survey. The gate is already
    /// set; it is cleared on every exit path, success or failure.
    async fn run_generation(
        &self,
        msg: &IncomingMessage,
        answers: HashMap<String, String>,
    ) -> Result<(), ChannelError> {
        let result = self.generate_and_reply(msg, answers).await;

        // Only clear the gate if it is still set; a concurrent event that
        // legitimately moved the state on must not be stomped to Idle.
        let mut states = self.states.lock().await;
        if let Some(state) = states.get_mut(&msg.sender_id) {
            if state.phase == Phase::Generating {
                state.phase = Phase::Idle;
            }
        }
        result
    }

    async fn generate_and_reply(
        &self,
        msg: &IncomingMessage,
        answers: HashMap<String, String>,
    ) -> Result<(), ChannelError> {
        self.transport.send(&msg.chat_id, WAIT_NOTICE, None).await?;

        match self.backend.recommend(&answers, &self.catalog).await {
            Ok(suggestion) => {
                let mut record = UserRecord::new(&msg.sender_id);
                record.answers = Some(answers);
                record.last_suggestion = Some(Utc::now());
                self.store.upsert(record).await;

                let keyboard = [RESTART_PHRASE.to_string()];
                self.transport
                    .send(&msg.chat_id, &suggestion, Some(&keyboard))
                    .await
            }
            Err(e) => {
                tracing::warn!(user = %msg.sender_id, "Generation failed: {e}");
                self.transport.send(&msg.chat_id, APOLOGY, None).await
            }
        }
    }

    // ── Operator commands ───────────────────────────────────────────

    /// `/broadcast <text>` — operator only; a sender mismatch is a silent
    /// no-op so the command's existence is not revealed.
    async fn handle_broadcast(
        &self,
        msg: &IncomingMessage,
        payload: &str,
    ) -> Result<(), ChannelError> {
        if !self.is_operator(&msg.sender_id) {
            return Ok(());
        }

        let payload = payload.trim();
        if payload.is_empty() {
            return self.transport.send(&msg.chat_id, BROADCAST_USAGE, None).await;
        }

        let report = self.store.broadcast(payload, self.transport.as_ref()).await;
        let summary = format!(
            "پیام با موفقیت ارسال شد!\nموفق: {}\nناموفق: {}",
            report.success, report.failed
        );
        self.transport.send(&msg.chat_id, &summary, None).await
    }

    /// `/stats` — operator only, silent for anyone else.
    async fn handle_stats(&self, msg: &IncomingMessage) -> Result<(), ChannelError> {
        if !self.is_operator(&msg.sender_id) {
            return Ok(());
        }

        let stats = self.store.statistics().await;
        let answer_stats = self.store.answer_statistics().await;
        let report = format_stats_report(&stats, &answer_stats);
        self.transport.send(&msg.chat_id, &report, None).await
    }

    #[cfg(test)]
    async fn phase_of(&self, sender_id: &str) -> Option<Phase> {
        self.states.lock().await.get(sender_id).map(|s| s.phase)
    }

    #[cfg(test)]
    async fn set_phase(&self, sender_id: &str, phase: Phase) {
        self.states
            .lock()
            .await
            .entry(sender_id.to_string())
            .or_insert_with(ConversationState::new)
            .phase = phase;
    }
}

/// Split `"/cmd@botname payload"` into the command token and its payload.
/// Returns `None` for anything that is not a slash command.
fn parse_command(text: &str) -> Option<(&str, &str)> {
    let rest = text.strip_prefix('/')?;
    let end = rest
        .find(|c: char| c.is_whitespace() || c == '@')
        .unwrap_or(rest.len());
    let command = &rest[..end];

    let mut payload = &rest[end..];
    if let Some(mention) = payload.strip_prefix('@') {
        let mention_end = mention.find(char::is_whitespace).unwrap_or(mention.len());
        payload = &mention[mention_end..];
    }
    Some((command, payload.trim_start()))
}

// ── Report formatting ───────────────────────────────────────────────

/// Render the operator statistics report.
pub fn format_stats_report(stats: &Stats, answer_stats: &AnswerStats) -> String {
    format!(
        "📊 آمار کاربران:\n\n\
         👥 تعداد کل کاربران: {}\n\
         ✅ کاربران فعال:\n   \
         • 24 ساعت گذشته: {}\n   \
         • هفته گذشته: {}\n   \
         • ماه گذشته: {}\n\n\
         🌍 توزیع زبان:\n{}\n\n\
         📈 ثبت نام ماهانه:\n{}\n\n\
         🎯 آمار پاسخ‌ها:\n\
         تعداد کل تعاملات: {}\n\n\
         ژانرهای محبوب:\n{}\n\n\
         ترجیح طول محتوا:\n{}\n\n\
         حال و هوای کاربران:\n{}",
        stats.total_users,
        stats.active_last_day,
        stats.active_last_week,
        stats.active_last_month,
        format_counts(stats.language_distribution.iter()),
        format_counts(stats.users_by_month.iter()),
        answer_stats.total_interactions,
        format_ranked(&answer_stats.genre_preferences),
        format_ranked(&answer_stats.length_preferences),
        format_ranked(&answer_stats.mood_preferences),
    )
}

fn format_counts<'a>(entries: impl Iterator<Item = (&'a String, &'a usize)>) -> String {
    entries
        .map(|(key, count)| format!("   • {key}: {count}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Preference maps are reported most-popular first.
fn format_ranked(counts: &std::collections::BTreeMap<String, usize>) -> String {
    let mut entries: Vec<(&String, &usize)> = counts.iter().collect();
    entries.sort_by(|a, b| b.1.cmp(a.1));
    format_counts(entries.into_iter())
}

// ── Tests ───────────────────────────────────────────────────────────
