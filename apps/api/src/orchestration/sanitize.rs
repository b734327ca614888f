//! Strips credential material from error text before it is persisted or returned.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

pub const REDACTED: &str = "[REDACTED]";

/// Shortest run of key characters treated as a leak.
const MIN_LEAK_CHARS: usize = 6;
const MAX_MESSAGE_CHARS: usize = 500;

fn key_shapes() -> &'static Regex {
    static KEY_SHAPES: OnceLock<Regex> = OnceLock::new();
    KEY_SHAPES.get_or_init(|| {
        Regex::new(
            r"(?i)(sk-[a-z0-9_\-]{8,}|AIza[0-9a-z_\-]{10,}|(?:api[_-]?key|key|token)=[^&\s]+|bearer\s+[a-z0-9._\-]{8,})",
        )
        .expect("static regex is valid")
    })
}

/// Removes every run of `MIN_LEAK_CHARS` or more characters that also appears in
/// `secret`, then redacts common key shapes, then truncates.
pub fn sanitize_error_message(message: &str, secret: &str) -> String {
    let redacted = redact_secret_windows(message, secret);
    let redacted = key_shapes().replace_all(&redacted, REDACTED).into_owned();

    if redacted.chars().count() > MAX_MESSAGE_CHARS {
        let mut truncated: String = redacted.chars().take(MAX_MESSAGE_CHARS).collect();
        truncated.push('…');
        truncated
    } else {
        redacted
    }
}

fn redact_secret_windows(message: &str, secret: &str) -> String {
    let secret: Vec<char> = secret.chars().collect();
    if secret.len() < MIN_LEAK_CHARS {
        return if secret.is_empty() {
            message.to_string()
        } else {
            message.replace(&secret.iter().collect::<String>(), REDACTED)
        };
    }

    let windows: HashSet<&[char]> = secret.windows(MIN_LEAK_CHARS).collect();
    let chars: Vec<char> = message.chars().collect();
    let mut covered = vec![false; chars.len()];
    for (start, window) in chars.windows(MIN_LEAK_CHARS).enumerate() {
        if windows.contains(window) {
            covered[start..start + MIN_LEAK_CHARS]
                .iter_mut()
                .for_each(|c| *c = true);
        }
    }

    let mut out = String::with_capacity(message.len());
    let mut in_run = false;
    for (c, hidden) in chars.iter().zip(covered) {
        if hidden {
            if !in_run {
                out.push_str(REDACTED);
            }
            in_run = true;
        } else {
            out.push(*c);
            in_run = false;
        }
    }
    out
}
