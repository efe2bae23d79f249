//! Status events from the supervised tool.
//!
//! The launcher script wrapping the tool inside the container appends one
//! JSON object per line to an events file. The engine polls that file and
//! parses it with this grammar instead of scraping the tool's human-facing
//! output, so readiness and exit detection never depend on message wording.

use serde::{Deserialize, Serialize};

use crate::runtime::shell_quote;

/// Events file inside the container. Lives on tmpfs so a restored snapshot
/// never replays a stale event log.
pub const EVENTS_PATH: &str = "/tmp/coi-events.jsonl";

/// One status event emitted by the supervised launcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum StatusEvent {
    /// The tool process has started and is accepting input.
    Ready { session: String },
    /// The tool process ended with an exit code.
    Exited { session: String, code: i32 },
}

/// Parse an event log, one JSON object per line.
///
/// Lines that do not parse are skipped: the poller can observe a
/// partially-written trailing line, and that must not poison the events
/// already read.
pub fn parse_events(log: &str) -> Vec<StatusEvent> {
    log.lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            match serde_json::from_str(line) {
                Ok(event) => Some(event),
                Err(err) => {
                    tracing::debug!("skipping unparseable status event {line:?}: {err}");
                    None
                }
            }
        })
        .collect()
}

/// Whether the log contains a `ready` event for this session.
pub fn saw_ready(log: &str, session_id: &str) -> bool {
    parse_events(log)
        .iter()
        .any(|e| matches!(e, StatusEvent::Ready { session } if session == session_id))
}

/// Build the shell script that supervises the tool inside the container.
///
/// Emits `ready` right before handing off to the tool and `exited` with the
/// tool's exit code afterwards, then propagates that code.
pub fn launch_script(
    tool_command: &str,
    session_id: &str,
    workdir: &str,
    resume_id: Option<&str>,
) -> String {
    let tool_invocation = match resume_id {
        Some(resume_id) => format!("{tool_command} --resume {}", shell_quote(resume_id)),
        None => format!("{tool_command} --session-id {}", shell_quote(session_id)),
    };

    format!(
        concat!(
            "cd {workdir} && ",
            "printf '%s\\n' '{{\"event\":\"ready\",\"session\":\"{id}\"}}' >> {events} && ",
            "{tool}; code=$?; ",
            "printf '{{\"event\":\"exited\",\"session\":\"{id}\",\"code\":%d}}\\n' \"$code\" >> {events}; ",
            "exit $code"
        ),
        workdir = workdir,
        id = session_id,
        events = EVENTS_PATH,
        tool = tool_invocation,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ready_and_exited_events() {
        let log = concat!(
            "{\"event\":\"ready\",\"session\":\"abc\"}\n",
            "{\"event\":\"exited\",\"session\":\"abc\",\"code\":0}\n",
        );

        let events = parse_events(log);
        assert_eq!(
            events,
            vec![
                StatusEvent::Ready {
                    session: "abc".to_string()
                },
                StatusEvent::Exited {
                    session: "abc".to_string(),
                    code: 0
                },
            ]
        );
    }

    #[test]
    fn skips_garbage_and_truncated_lines() {
        let log = concat!(
            "not json at all\n",
            "{\"event\":\"ready\",\"session\":\"abc\"}\n",
            "{\"event\":\"exi", // torn write
        );

        let events = parse_events(log);
        assert_eq!(events.len(), 1);
        assert!(saw_ready(log, "abc"));
        assert!(!saw_ready(log, "other"));
    }

    #[test]
    fn launch_script_embeds_session_and_events_path() {
        let script = launch_script("claude", "abc-123", "/workspace", None);
        assert!(script.contains("cd /workspace"));
        assert!(script.contains("--session-id 'abc-123'"));
        assert!(script.contains(EVENTS_PATH));
        assert!(script.contains("\"event\":\"ready\""));
        assert!(script.contains("\"event\":\"exited\""));
    }

    #[test]
    fn launch_script_uses_resume_flag_when_resuming() {
        let script = launch_script("claude", "new-id", "/workspace", Some("old-id"));
        assert!(script.contains("--resume 'old-id'"));
        assert!(!script.contains("--session-id"));
    }
}
