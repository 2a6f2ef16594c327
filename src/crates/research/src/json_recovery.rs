//! Multi-strategy JSON recovery for LLM output (spec §7 "Content" errors).
//!
//! Agents never propagate an unparsed blob downstream (spec §9): every
//! caller of [`recover_json`] must fall back to a safe default value for its
//! own contract when every strategy fails.

use serde_json::Value;

/// Attempt to recover a JSON value from raw LLM text using, in order:
/// direct parse, fenced code-block extraction, brace-matching substring
/// extraction, and a lightweight repair pass that closes unterminated
/// strings/brackets. Returns `None` if no strategy yields valid JSON.
pub fn recover_json(raw: &str) -> Option<Value> {
    direct_parse(raw)
        .or_else(|| fenced_block(raw).and_then(|s| direct_parse(&s)))
        .or_else(|| brace_matched(raw).and_then(|s| direct_parse(&s)))
        .or_else(|| repaired(raw).and_then(|s| direct_parse(&s)))
}

fn direct_parse(raw: &str) -> Option<Value> {
    serde_json::from_str(raw.trim()).ok()
}

fn fenced_block(raw: &str) -> Option<String> {
    let start_marker = raw.find("```json").map(|i| i + "```json".len());
    let start_marker = start_marker.or_else(|| raw.find("```").map(|i| i + "```".len()));
    let start = start_marker?;
    let rest = &raw[start..];
    let end = rest.find("```")?;
    Some(rest[..end].trim().to_string())
}

fn brace_matched(raw: &str) -> Option<String> {
    let start = raw.find(['{', '['])?;
    let opening = raw.as_bytes()[start];
    let closing = if opening == b'{' { b'}' } else { b']' };
    let bytes = raw.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b if b == opening => depth += 1,
            b if b == closing => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + 1;
                    return Some(raw[start..end].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Best-effort repair: take the brace-matched substring (or the whole
/// remainder after the first opening brace if matching never closed) and
/// append enough closing characters to balance it, dropping a trailing
/// unterminated string segment.
fn repaired(raw: &str) -> Option<String> {
    let start = raw.find(['{', '['])?;
    let opening = raw.as_bytes()[start];
    let closing_char = if opening == b'{' { '}' } else { ']' };
    let mut candidate = raw[start..].to_string();

    if let Some(last_quote) = candidate.rfind('"') {
        let quote_count = candidate.matches('"').count();
        if quote_count % 2 != 0 {
            candidate.truncate(last_quote);
        }
    }

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for b in candidate.bytes() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => depth -= 1,
            _ => {}
        }
    }
    while depth > 0 {
        candidate.push(closing_char);
        depth -= 1;
    }
    Some(candidate)
}
