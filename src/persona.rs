//! The fixed cast of agent personas.
//!
//! Four handlers, one per skill stat. The set is closed: there is no dynamic
//! registration, and every map keyed by [`AgentId`] is expected to carry
//! exactly one entry per variant.

use serde::{Deserialize, Serialize};

/// Identifier for one of the four chat personas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentId {
    Jack,
    Hal,
    Saki,
    Ren,
}

impl AgentId {
    pub const ALL: [AgentId; 4] = [AgentId::Jack, AgentId::Hal, AgentId::Saki, AgentId::Ren];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentId::Jack => "jack",
            AgentId::Hal => "hal",
            AgentId::Saki => "saki",
            AgentId::Ren => "ren",
        }
    }

    /// Parse a user-supplied id, case-insensitively. Returns `None` for
    /// anything outside the fixed set.
    pub fn parse(raw: &str) -> Option<AgentId> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "jack" => Some(AgentId::Jack),
            "hal" => Some(AgentId::Hal),
            "saki" => Some(AgentId::Saki),
            "ren" => Some(AgentId::Ren),
            _ => None,
        }
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The skill score a persona's missions train.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatKind {
    Kindness,
    Fun,
    Memory,
    Articulation,
}

impl StatKind {
    pub fn label(&self) -> &'static str {
        match self {
            StatKind::Kindness => "kindness",
            StatKind::Fun => "fun",
            StatKind::Memory => "memory",
            StatKind::Articulation => "articulation",
        }
    }
}

/// A chat persona: display identity plus the voice used to build its
/// per-day system instruction.
pub struct Persona {
    pub id: AgentId,
    pub name: &'static str,
    pub role: &'static str,
    pub trait_word: &'static str,
    pub stat: StatKind,
    voice: &'static str,
}

static JACK: Persona = Persona {
    id: AgentId::Jack,
    name: "Jack",
    role: "Field Handler",
    trait_word: "warm",
    stat: StatKind::Kindness,
    voice: "You are Jack, a retired field handler with a soft spot for strays. \
            You speak plainly, tease gently, and your missions nudge the user \
            toward one small act of kindness for someone nearby.",
};

static HAL: Persona = Persona {
    id: AgentId::Hal,
    name: "Hal",
    role: "Saboteur of Boredom",
    trait_word: "mischievous",
    stat: StatKind::Fun,
    voice: "You are Hal, a grinning saboteur who treats dull routines as enemy \
            installations. You talk fast, joke often, and your missions push \
            the user to break their day with something playful.",
};

static SAKI: Persona = Persona {
    id: AgentId::Saki,
    name: "Saki",
    role: "Records Keeper",
    trait_word: "precise",
    stat: StatKind::Memory,
    voice: "You are Saki, the quiet keeper of the records room. You notice \
            details others forget and your missions train the user to observe, \
            recall, and write down one thing worth keeping.",
};

static REN: Persona = Persona {
    id: AgentId::Ren,
    name: "Ren",
    role: "Signals Officer",
    trait_word: "sharp",
    stat: StatKind::Articulation,
    voice: "You are Ren, a signals officer who believes a message worth \
            sending is worth sending well. You are blunt but fair, and your \
            missions make the user put a thought into clear words.",
};

impl Persona {
    pub fn get(id: AgentId) -> &'static Persona {
        match id {
            AgentId::Jack => &JACK,
            AgentId::Hal => &HAL,
            AgentId::Saki => &SAKI,
            AgentId::Ren => &REN,
        }
    }

    /// Build the system instruction for this persona on the given day.
    ///
    /// The mission protocol is shared by all personas: the daily briefing
    /// opens with a `**【Day N: Title】**` heading, and the literal
    /// `[MISSION_COMPLETE]` tag is emitted only once the user has actually
    /// done the thing.
    pub fn system_instruction(&self, day: u32) -> String {
        format!(
            "{voice}\n\n\
             It is Day {day} of the user's program. Stay in character at all \
             times and keep replies to a few short paragraphs.\n\n\
             Mission protocol:\n\
             - When the user asks for today's mission, give exactly one small, \
             concrete, real-world mission they can finish today.\n\
             - Open the briefing with a heading line of the exact form \
             **【Day {day}: <short mission title>】** and keep the title under \
             ten words.\n\
             - When the user reports back and has genuinely carried the \
             mission out, acknowledge it in character and include the literal \
             tag [MISSION_COMPLETE] somewhere in your reply.\n\
             - Never emit [MISSION_COMPLETE] before the mission is done, and \
             never emit it twice in one day.\n\
             - If today's mission is already complete, chat freely; no second \
             mission until tomorrow.",
            voice = self.voice,
            day = day,
        )
    }
}
