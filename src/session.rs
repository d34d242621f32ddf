//! The session state machine.
//!
//! One engine owns the whole [`SessionState`] aggregate and serializes every
//! mutation. The only asynchronous boundaries are the reply-generation call
//! and the fire-and-forget archival task; a single-flight guard keeps rapid
//! repeated submissions from double-submitting while a call is outstanding.
//!
//! Every successful mutation is followed by a full-aggregate durable write.
//! A failed write is logged and swallowed; the in-memory state stays
//! authoritative for the rest of the session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, Utc};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::persona::{AgentId, Persona};
use crate::state::{Message, MissionLogEntry, SessionState, UserStats};
use crate::store::SessionStore;
use crate::transcript;

/// Stat points awarded per completed mission, before clamping.
pub const MISSION_STAT_REWARD: u8 = 15;

const DATE_FMT: &str = "%Y-%m-%d";

/// Produces the agent's reply for a submitted message.
///
/// `history` is the transcript for the agent *including* the just-submitted
/// user message as its final element; `prompt` is that message's text. The
/// implementation must put the prompt in front of the model exactly once,
/// neither dropped nor duplicated.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate(
        &self,
        history: &[Message],
        agent_id: AgentId,
        day: u32,
        prompt: &str,
    ) -> anyhow::Result<String>;
}

/// Receives transcript exports. Best-effort: calls are dispatched on a
/// detached task and failures never reach the submitting caller.
#[async_trait]
pub trait Archiver: Send + Sync {
    async fn archive(&self, kind: &str, title: &str, content: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Error)]
pub enum SessionError {
    /// The reply-generation collaborator failed. Transient: the user message
    /// stays recorded and resubmitting the same text is safe.
    #[error("reply generation failed: {0}")]
    Provider(anyhow::Error),
    /// `advance_day` was called with no day-clear pending.
    #[error("no day-clear is pending")]
    DayNotCleared,
}

/// Notifications streamed to whoever drives the engine.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    MissionCompleted {
        agent_id: AgentId,
        day: u32,
        title: String,
    },
    /// All four agents are done for the day. One-shot per day; acknowledged
    /// by calling [`SessionEngine::advance_day`].
    DayCleared { day: u32 },
    Reset,
}

/// What a `submit_message` call did.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// The agent replied; carries the appended agent message.
    Reply {
        message: Message,
        mission_completed: bool,
        day_cleared: bool,
    },
    /// Empty input after trimming; nothing was recorded or sent.
    Ignored,
    /// Another submission is still in flight; nothing was recorded or sent.
    Busy,
}

pub struct SessionEngine {
    state: RwLock<SessionState>,
    store: Arc<SessionStore>,
    generator: Arc<dyn ReplyGenerator>,
    archiver: Arc<dyn Archiver>,
    events: flume::Sender<SessionEvent>,
    in_flight: AtomicBool,
    pending_day_clear: AtomicBool,
}

/// Clears the in-flight flag on every exit path of `submit_message`.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SessionEngine {
    pub fn new(
        state: SessionState,
        store: Arc<SessionStore>,
        generator: Arc<dyn ReplyGenerator>,
        archiver: Arc<dyn Archiver>,
        events: flume::Sender<SessionEvent>,
    ) -> Self {
        Self {
            state: RwLock::new(state),
            store,
            generator,
            archiver,
            events,
            in_flight: AtomicBool::new(false),
            pending_day_clear: AtomicBool::new(false),
        }
    }

    pub async fn snapshot(&self) -> SessionState {
        self.state.read().await.clone()
    }

    pub async fn current_agent(&self) -> AgentId {
        self.state.read().await.current_agent_id
    }

    pub async fn set_current_agent(&self, agent_id: AgentId) {
        let mut state = self.state.write().await;
        if state.current_agent_id != agent_id {
            state.current_agent_id = agent_id;
            self.persist(&state);
        }
    }

    /// Whether a day-clear notification is awaiting acknowledgement.
    pub fn day_clear_pending(&self) -> bool {
        self.pending_day_clear.load(Ordering::SeqCst)
    }

    /// Record a user message, fetch the agent's reply, and apply any mission
    /// completion it signals.
    ///
    /// Empty input and calls made while another submission is outstanding
    /// no-op (`Ignored` / `Busy`). A generator failure leaves the user
    /// message recorded and is reported as [`SessionError::Provider`];
    /// resubmitting the same text afterwards is permitted.
    pub async fn submit_message(
        &self,
        agent_id: AgentId,
        text: &str,
    ) -> Result<SubmitOutcome, SessionError> {
        let prompt = text.trim();
        if prompt.is_empty() {
            return Ok(SubmitOutcome::Ignored);
        }
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Ok(SubmitOutcome::Busy);
        }
        let _guard = InFlightGuard(&self.in_flight);

        let user_message = Message::from_user(prompt);
        let (history, day) = {
            let mut state = self.state.write().await;
            state
                .histories
                .entry(agent_id)
                .or_default()
                .push(user_message);
            let history = state.histories[&agent_id].clone();
            let day = state.day;
            self.persist(&state);
            (history, day)
        };

        let raw = match self.generator.generate(&history, agent_id, day, prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                // The user message stays recorded and still gets archived;
                // only the reply is missing.
                self.spawn_archive(agent_id, day, &history);
                return Err(SessionError::Provider(e));
            }
        };

        let (display, completed) = transcript::strip_completion_marker(&raw);
        let agent_message = Message::from_agent(agent_id, display);
        let today = Local::now().date_naive();

        let mut mission_completed = false;
        let mut cleared = false;
        {
            let mut state = self.state.write().await;
            if completed {
                let effect = apply_mission_completion(&mut state, agent_id, today, Utc::now());
                mission_completed = true;
                if effect.newly_logged {
                    let _ = self.events.send(SessionEvent::MissionCompleted {
                        agent_id,
                        day: state.day,
                        title: effect.title,
                    });
                }
                if effect.day_cleared {
                    cleared = true;
                    self.pending_day_clear.store(true, Ordering::SeqCst);
                    let _ = self.events.send(SessionEvent::DayCleared { day: state.day });
                }
            }
            state
                .histories
                .entry(agent_id)
                .or_default()
                .push(agent_message.clone());
            self.persist(&state);
            self.spawn_archive(agent_id, state.day, &state.histories[&agent_id]);
        }

        Ok(SubmitOutcome::Reply {
            message: agent_message,
            mission_completed,
            day_cleared: cleared,
        })
    }

    /// Acknowledge a pending day-clear: bump the day and reset every agent's
    /// progress flag. Histories and mission logs are retained across the
    /// transition.
    pub async fn advance_day(&self) -> Result<u32, SessionError> {
        if !self.pending_day_clear.swap(false, Ordering::SeqCst) {
            return Err(SessionError::DayNotCleared);
        }
        let mut state = self.state.write().await;
        state.day += 1;
        for id in AgentId::ALL {
            state.daily_progress.insert(id, false);
        }
        self.persist(&state);
        tracing::info!("Advanced to day {}", state.day);
        Ok(state.day)
    }

    /// Remove one mission-log entry. Silent no-op when the id is unknown.
    pub async fn delete_log_entry(&self, id: &str) -> bool {
        let mut state = self.state.write().await;
        let before = state.mission_logs.len();
        state.mission_logs.retain(|entry| entry.id != id);
        let removed = state.mission_logs.len() != before;
        if removed {
            self.persist(&state);
        }
        removed
    }

    /// Clear both durable slots and restore in-memory defaults.
    /// Irreversible; callers are expected to confirm first.
    pub async fn reset_all(&self) -> anyhow::Result<()> {
        self.store
            .clear()
            .context("Failed to clear durable session slots")?;
        let mut state = self.state.write().await;
        *state = SessionState::default();
        self.pending_day_clear.store(false, Ordering::SeqCst);
        let _ = self.events.send(SessionEvent::Reset);
        tracing::info!("Session reset to defaults");
        Ok(())
    }

    /// Startup login check. Returns whether anything changed.
    pub async fn check_login(&self, today: NaiveDate) -> bool {
        let mut state = self.state.write().await;
        if login_rollover(&mut state.stats, today) {
            self.persist(&state);
            true
        } else {
            false
        }
    }

    fn persist(&self, state: &SessionState) {
        if let Err(e) = self.store.save_session(state) {
            tracing::warn!("Session persist failed, in-memory state kept: {:#}", e);
        }
    }

    /// Hand one agent's transcript to the archival collaborator on a
    /// detached task. Failures never reach the submitting caller.
    fn spawn_archive(&self, agent_id: AgentId, day: u32, history: &[Message]) {
        let persona = Persona::get(agent_id);
        let markdown = transcript::format_markdown(persona.name, day, history);
        let title = format!("{}_Day{}", persona.name, day);
        let archiver = self.archiver.clone();
        tokio::spawn(async move {
            if let Err(e) = archiver.archive("chat", &title, &markdown).await {
                tracing::warn!("Transcript archive failed: {:#}", e);
            }
        });
    }
}

pub(crate) struct CompletionEffect {
    pub newly_logged: bool,
    pub title: String,
    pub day_cleared: bool,
}

/// Apply one mission-completion signal to the aggregate.
///
/// Repeated signals for the same (day, agent) re-apply the clamped stat
/// reward but never duplicate the log entry, and the day-clear fires only on
/// the transition to all-complete. The streak bump is additionally gated on
/// `last_login_date` not already being today.
pub(crate) fn apply_mission_completion(
    state: &mut SessionState,
    agent_id: AgentId,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> CompletionEffect {
    let persona = Persona::get(agent_id);
    state.stats.raise(persona.stat, MISSION_STAT_REWARD);

    let was_all_done = state.all_missions_complete();
    state.daily_progress.insert(agent_id, true);

    let history = state
        .histories
        .get(&agent_id)
        .map(Vec::as_slice)
        .unwrap_or(&[]);
    let title = transcript::find_mission_title(history, state.day);

    let newly_logged = if state
        .mission_logs
        .iter()
        .any(|entry| entry.day == state.day && entry.agent_id == agent_id)
    {
        false
    } else {
        state
            .mission_logs
            .push(MissionLogEntry::new(state.day, agent_id, title.clone(), now));
        true
    };

    let mut day_cleared = false;
    if !was_all_done && state.all_missions_complete() {
        let today_str = today.format(DATE_FMT).to_string();
        if state.stats.last_login_date != today_str {
            state.stats.streak += 1;
            state.stats.last_login_date = today_str;
        }
        day_cleared = true;
    }

    CompletionEffect {
        newly_logged,
        title,
        day_cleared,
    }
}

/// The once-at-startup streak check.
///
/// A last login of today or yesterday changes nothing: yesterday's clear
/// keeps the streak alive, and the increment itself only ever happens on
/// mission completion. Anything older (or unparseable) breaks the streak
/// and stamps today. Returns whether the stats changed.
pub(crate) fn login_rollover(stats: &mut UserStats, today: NaiveDate) -> bool {
    if stats.last_login_date.is_empty() {
        return false;
    }
    let today_str = today.format(DATE_FMT).to_string();
    if stats.last_login_date == today_str {
        return false;
    }

    let last = NaiveDate::parse_from_str(stats.last_login_date.trim(), DATE_FMT);
    let yesterday = today.pred_opt();
    match (last, yesterday) {
        (Ok(last), Some(yesterday)) if last >= yesterday => false,
        _ => {
            stats.streak = 0;
            stats.last_login_date = today_str;
            true
        }
    }
}
