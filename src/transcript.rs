//! Free-text protocol helpers for the generated replies.
//!
//! The generation collaborator signals through plain text: a
//! `**【Day N: Title】**` heading names the day's mission and the literal
//! `[MISSION_COMPLETE]` tag marks success. Model output is untrusted, so
//! everything here parses defensively and falls back rather than failing.

use regex_lite::Regex;

use crate::state::{Message, Sender};

/// Literal substring a reply carries when the day's mission succeeded.
pub const MISSION_COMPLETE_MARKER: &str = "[MISSION_COMPLETE]";

/// Title used when no day-tagged heading can be found in the transcript.
pub const FALLBACK_MISSION_TITLE: &str = "Secret Mission";

/// Scan a history newest-first for the current day's mission heading and
/// return its title, or [`FALLBACK_MISSION_TITLE`] when absent.
pub fn find_mission_title(history: &[Message], day: u32) -> String {
    let pattern = format!(r"\*\*【Day {}: (.+?)】\*\*", day);
    let Ok(re) = Regex::new(&pattern) else {
        return FALLBACK_MISSION_TITLE.to_string();
    };
    for message in history.iter().rev() {
        if let Some(caps) = re.captures(&message.text) {
            if let Some(title) = caps.get(1) {
                let title = title.as_str().trim();
                if !title.is_empty() {
                    return title.to_string();
                }
            }
        }
    }
    FALLBACK_MISSION_TITLE.to_string()
}

/// Split a raw reply into its display text (every completion tag removed)
/// and whether the tag was present at all.
pub fn strip_completion_marker(raw: &str) -> (String, bool) {
    if !raw.contains(MISSION_COMPLETE_MARKER) {
        return (raw.to_string(), false);
    }
    (raw.replace(MISSION_COMPLETE_MARKER, ""), true)
}

/// Render one agent's transcript as the markdown document handed to the
/// archival collaborator.
pub fn format_markdown(agent_name: &str, day: u32, messages: &[Message]) -> String {
    let mut md = format!("# {} - Day {}\n\n", agent_name, day);
    for message in messages {
        let time = message.timestamp.format("%H:%M:%S");
        match message.sender {
            Sender::User => {
                md.push_str(&format!("## 👤 User ({})\n{}\n\n", time, message.text));
            }
            Sender::Agent => {
                md.push_str(&format!("## 🤖 {} ({})\n{}\n\n", agent_name, time, message.text));
            }
        }
    }
    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::AgentId;

    fn agent_msg(text: &str) -> Message {
        Message::from_agent(AgentId::Jack, text)
    }

    #[test]
    fn finds_the_current_days_heading() {
        let history = vec![
            agent_msg("Morning. **【Day 2: Write a postcard】**\nGet to it."),
            Message::from_user("done!"),
        ];
        assert_eq!(find_mission_title(&history, 2), "Write a postcard");
    }

    #[test]
    fn newest_heading_wins() {
        let history = vec![
            agent_msg("**【Day 3: First attempt】** too easy, scrapping it"),
            agent_msg("New orders. **【Day 3: Call an old friend】**"),
        ];
        assert_eq!(find_mission_title(&history, 3), "Call an old friend");
    }

    #[test]
    fn headings_for_other_days_are_ignored() {
        let history = vec![agent_msg("**【Day 4: Stale mission】** from yesterday")];
        assert_eq!(find_mission_title(&history, 5), FALLBACK_MISSION_TITLE);
    }

    #[test]
    fn missing_heading_falls_back() {
        let history = vec![agent_msg("no mission today, just chatter")];
        assert_eq!(find_mission_title(&history, 1), FALLBACK_MISSION_TITLE);
        assert_eq!(find_mission_title(&[], 1), FALLBACK_MISSION_TITLE);
    }

    #[test]
    fn strips_every_completion_tag() {
        let (clean, done) =
            strip_completion_marker("Well done. [MISSION_COMPLETE] Rest up. [MISSION_COMPLETE]");
        assert!(done);
        assert!(!clean.contains(MISSION_COMPLETE_MARKER));
        assert!(clean.contains("Well done."));
    }

    #[test]
    fn untagged_reply_passes_through() {
        let (clean, done) = strip_completion_marker("Keep going.");
        assert!(!done);
        assert_eq!(clean, "Keep going.");
    }

    #[test]
    fn markdown_export_sections_by_sender() {
        let messages = vec![
            Message::from_user("reporting in"),
            agent_msg("acknowledged"),
        ];
        let md = format_markdown("Jack", 2, &messages);
        assert!(md.starts_with("# Jack - Day 2\n"));
        assert!(md.contains("## 👤 User ("));
        assert!(md.contains("## 🤖 Jack ("));
        assert!(md.contains("reporting in"));
        assert!(md.contains("acknowledged"));
    }
}
