//! Commit trailer linkage
//!
//! A code commit carries at most one effective `Checkpoint-Id:` trailer
//! binding it to a checkpoint. Parsing takes the first occurrence when a
//! message somehow carries duplicates; appending is idempotent.

use regex::Regex;
use std::sync::OnceLock;
use waymark_foundation::CheckpointId;

/// Trailer key binding a commit to a checkpoint
pub const CHECKPOINT_TRAILER: &str = "Checkpoint-Id";

fn trailer_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^Checkpoint-Id:[ \t]*(\S+)[ \t]*$").expect("valid regex"))
}

/// Extract the checkpoint id from a commit message, first occurrence wins
pub fn parse(message: &str) -> Option<CheckpointId> {
    trailer_regex()
        .captures(message)
        .map(|caps| CheckpointId::from_string(&caps[1]))
}

/// Append the trailer to a commit message; idempotent
///
/// A message that already names this checkpoint is returned unchanged; a
/// message naming a different checkpoint is also returned unchanged, since
/// the first occurrence is the effective one and a second would be noise.
pub fn append(message: &str, id: &CheckpointId) -> String {
    if parse(message).is_some() {
        return message.to_string();
    }

    let trimmed = message.trim_end();
    if trimmed.is_empty() {
        return format!("{}: {}\n", CHECKPOINT_TRAILER, id);
    }

    // Keep the trailer in its own block, git-style.
    format!("{}\n\n{}: {}\n", trimmed, CHECKPOINT_TRAILER, id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> CheckpointId {
        CheckpointId::from_string(s)
    }

    #[test]
    fn test_parse_missing() {
        assert_eq!(parse("fix: a bug\n"), None);
    }

    #[test]
    fn test_parse_present() {
        let message = "fix: a bug\n\nCheckpoint-Id: ck-0000000001000-abcd1234\n";
        assert_eq!(parse(message), Some(id("ck-0000000001000-abcd1234")));
    }

    #[test]
    fn test_parse_first_occurrence_wins() {
        let message = "msg\n\nCheckpoint-Id: ck-first\nCheckpoint-Id: ck-second\n";
        assert_eq!(parse(message), Some(id("ck-first")));
    }

    #[test]
    fn test_parse_ignores_inline_mention() {
        let message = "mention of Checkpoint-Id: ck-nope in prose\nbody\n";
        // Only a line that starts with the key counts; prose mid-line is not
        // a trailer. The line above does start with "mention".
        assert_eq!(parse(message), None);
    }

    #[test]
    fn test_append_then_parse() {
        let message = append("feat: add parser", &id("ck-x"));
        assert_eq!(parse(&message), Some(id("ck-x")));
    }

    #[test]
    fn test_append_idempotent() {
        let once = append("feat: add parser", &id("ck-x"));
        let twice = append(&once, &id("ck-x"));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_append_keeps_existing_binding() {
        let message = "feat: x\n\nCheckpoint-Id: ck-original\n";
        let appended = append(message, &id("ck-other"));
        assert_eq!(parse(&appended), Some(id("ck-original")));
    }

    #[test]
    fn test_append_to_empty_message() {
        let message = append("", &id("ck-x"));
        assert_eq!(message, "Checkpoint-Id: ck-x\n");
    }
}
