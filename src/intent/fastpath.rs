//! Pre-classification shortcut for unambiguous, latency-critical commands.
//!
//! A small ordered set of literal rules runs before the classifier: app
//! launches and media playback are recognized directly from the text, and
//! a match bypasses the router entirely. First match wins; no scoring.

use super::FunctionCall;

/// Match an utterance against the fast-path rules.
///
/// Pure function; returns `None` when no rule applies and the input should
/// proceed to classification.
pub fn match_fast_path(text: &str) -> Option<FunctionCall> {
    let cmd = normalize_command(text);
    if cmd.is_empty() {
        return None;
    }

    // App launch: "open X" / "launch X" / "start X".
    for trigger in ["open ", "launch ", "start "] {
        if let Some(rest) = cmd.strip_prefix(trigger) {
            let name = extract_app_name(rest);
            if !name.is_empty() {
                return Some(FunctionCall::with_arg("launch_app", "name", &name));
            }
        }
    }

    // Media playback: a play trigger plus a streaming platform reference.
    if cmd.contains("play") && cmd.contains("spotify") {
        let query = extract_music_query(&cmd);
        if !query.is_empty() {
            return Some(FunctionCall::with_arg("play_media", "query", &query));
        }
    }

    None
}

/// Strip punctuation and lowercase for literal matching.
pub fn normalize_command(text: &str) -> String {
    let stripped: String = text
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    collapse_whitespace(&stripped.to_lowercase())
}

/// Pull the application name out of the remainder of a launch command,
/// dropping a leading article.
fn extract_app_name(rest: &str) -> String {
    let rest = rest.strip_prefix("the ").unwrap_or(rest);
    collapse_whitespace(rest)
}

/// Reduce a play command to the bare music query: drop trigger words,
/// platform references, and filler.
fn extract_music_query(cmd: &str) -> String {
    let mut text = cmd.to_owned();

    for trigger in ["play ", "listen to ", "put on "] {
        if let Some(rest) = text.strip_prefix(trigger) {
            text = rest.to_owned();
            break;
        }
    }

    for phrase in [
        "on spotify",
        "from spotify",
        "in spotify",
        "using spotify",
        "the song",
        "song",
        "music",
        "track",
        "please",
        "for me",
    ] {
        text = text.replace(phrase, " ");
    }

    collapse_whitespace(&text)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
