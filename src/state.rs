//! The session data model and its merge-on-load decoding.
//!
//! [`SessionState`] is the unit of persistence: the whole aggregate is
//! serialized after every mutation and reloaded once at startup. Loading is
//! deliberately forgiving: each field of a saved blob is decoded on its own,
//! so one malformed field falls back to its default without discarding the
//! siblings that survived.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::persona::{AgentId, StatKind};

/// Upper clamp for every skill score.
pub const STAT_MAX: u8 = 100;

fn default_stat() -> u8 {
    20
}

/// The user's four bounded skill scores plus streak bookkeeping.
///
/// `last_login_date` is a `YYYY-MM-DD` stamp, empty until the first full
/// day-clear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    #[serde(default = "default_stat")]
    pub kindness: u8,
    #[serde(default = "default_stat")]
    pub fun: u8,
    #[serde(default = "default_stat")]
    pub memory: u8,
    #[serde(default = "default_stat")]
    pub articulation: u8,
    #[serde(default)]
    pub streak: u32,
    #[serde(default)]
    pub last_login_date: String,
}

impl Default for UserStats {
    fn default() -> Self {
        Self {
            kindness: default_stat(),
            fun: default_stat(),
            memory: default_stat(),
            articulation: default_stat(),
            streak: 0,
            last_login_date: String::new(),
        }
    }
}

impl UserStats {
    pub fn get(&self, kind: StatKind) -> u8 {
        match kind {
            StatKind::Kindness => self.kindness,
            StatKind::Fun => self.fun,
            StatKind::Memory => self.memory,
            StatKind::Articulation => self.articulation,
        }
    }

    /// Raise one score, clamped to [`STAT_MAX`].
    pub fn raise(&mut self, kind: StatKind, amount: u8) {
        let slot = match kind {
            StatKind::Kindness => &mut self.kindness,
            StatKind::Fun => &mut self.fun,
            StatKind::Memory => &mut self.memory,
            StatKind::Articulation => &mut self.articulation,
        };
        *slot = slot.saturating_add(amount).min(STAT_MAX);
    }

    /// Decode a saved stats object field-by-field, keeping defaults for
    /// anything missing or malformed.
    fn merge_saved(saved: Value) -> UserStats {
        let mut stats = UserStats::default();
        let Value::Object(mut map) = saved else {
            return stats;
        };
        if let Some(v) = map.remove("kindness") {
            if let Ok(n) = serde_json::from_value::<u8>(v) {
                stats.kindness = n.min(STAT_MAX);
            }
        }
        if let Some(v) = map.remove("fun") {
            if let Ok(n) = serde_json::from_value::<u8>(v) {
                stats.fun = n.min(STAT_MAX);
            }
        }
        if let Some(v) = map.remove("memory") {
            if let Ok(n) = serde_json::from_value::<u8>(v) {
                stats.memory = n.min(STAT_MAX);
            }
        }
        if let Some(v) = map.remove("articulation") {
            if let Ok(n) = serde_json::from_value::<u8>(v) {
                stats.articulation = n.min(STAT_MAX);
            }
        }
        if let Some(v) = map.remove("streak") {
            if let Ok(n) = serde_json::from_value::<u32>(v) {
                stats.streak = n;
            }
        }
        if let Some(v) = map.remove("last_login_date") {
            if let Ok(s) = serde_json::from_value::<String>(v) {
                stats.last_login_date = s;
            }
        }
        stats
    }
}

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Agent,
}

/// One transcript entry. Immutable once appended; identity is the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender: Sender,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn from_user(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender: Sender::User,
            agent_id: None,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn from_agent(agent_id: AgentId, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender: Sender::Agent,
            agent_id: Some(agent_id),
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// One archived mission. At most one entry exists per (day, agent) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionLogEntry {
    pub id: String,
    pub day: u32,
    pub agent_id: AgentId,
    pub title: String,
    pub completed_at: DateTime<Utc>,
}

impl MissionLogEntry {
    pub fn new(day: u32, agent_id: AgentId, title: impl Into<String>, completed_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            day,
            agent_id,
            title: title.into(),
            completed_at,
        }
    }
}

fn default_day() -> u32 {
    1
}

fn default_agent() -> AgentId {
    AgentId::Jack
}

/// The whole persisted aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default = "default_day")]
    pub day: u32,
    #[serde(default)]
    pub stats: UserStats,
    #[serde(default)]
    pub histories: HashMap<AgentId, Vec<Message>>,
    #[serde(default)]
    pub mission_logs: Vec<MissionLogEntry>,
    #[serde(default = "default_agent")]
    pub current_agent_id: AgentId,
    #[serde(default)]
    pub daily_progress: HashMap<AgentId, bool>,
}

impl Default for SessionState {
    fn default() -> Self {
        let mut state = Self {
            day: default_day(),
            stats: UserStats::default(),
            histories: HashMap::new(),
            mission_logs: Vec::new(),
            current_agent_id: default_agent(),
            daily_progress: HashMap::new(),
        };
        state.normalize();
        state
    }
}

impl SessionState {
    /// Restore the structural invariants: `day >= 1`, and exactly one
    /// history slot and one progress flag per known agent.
    pub fn normalize(&mut self) {
        if self.day == 0 {
            self.day = default_day();
        }
        for id in AgentId::ALL {
            self.histories.entry(id).or_default();
            self.daily_progress.entry(id).or_insert(false);
        }
    }

    /// Rebuild a state from a saved JSON blob, field by field.
    ///
    /// Every top-level field decodes independently; histories and progress
    /// decode per agent key. Anything missing or malformed keeps its
    /// default, and unknown agent keys are dropped.
    pub fn from_saved(saved: Value) -> SessionState {
        let mut state = SessionState::default();
        let Value::Object(mut map) = saved else {
            return state;
        };

        if let Some(v) = map.remove("day") {
            if let Ok(day) = serde_json::from_value::<u32>(v) {
                if day >= 1 {
                    state.day = day;
                }
            }
        }

        if let Some(v) = map.remove("stats") {
            state.stats = UserStats::merge_saved(v);
        }

        if let Some(Value::Object(histories)) = map.remove("histories") {
            for (key, value) in histories {
                let Some(agent) = AgentId::parse(&key) else {
                    continue;
                };
                if let Ok(messages) = serde_json::from_value::<Vec<Message>>(value) {
                    state.histories.insert(agent, messages);
                }
            }
        }

        if let Some(Value::Array(logs)) = map.remove("mission_logs") {
            state.mission_logs = logs
                .into_iter()
                .filter_map(|entry| serde_json::from_value::<MissionLogEntry>(entry).ok())
                .collect();
        }

        if let Some(v) = map.remove("current_agent_id") {
            if let Ok(agent) = serde_json::from_value::<AgentId>(v) {
                state.current_agent_id = agent;
            }
        }

        if let Some(Value::Object(progress)) = map.remove("daily_progress") {
            for (key, value) in progress {
                let Some(agent) = AgentId::parse(&key) else {
                    continue;
                };
                if let Ok(done) = serde_json::from_value::<bool>(value) {
                    state.daily_progress.insert(agent, done);
                }
            }
        }

        state.normalize();
        state
    }

    pub fn all_missions_complete(&self) -> bool {
        AgentId::ALL
            .iter()
            .all(|id| self.daily_progress.get(id).copied().unwrap_or(false))
    }

    pub fn completed_count(&self) -> usize {
        AgentId::ALL
            .iter()
            .filter(|id| self.daily_progress.get(id).copied().unwrap_or(false))
            .count()
    }
}
