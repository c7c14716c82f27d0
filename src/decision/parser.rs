//! Pulls a trading decision out of a free-form model reply.

use crate::models::{Decision, TradeAction};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct RawDecision {
    decision: String,
    percentage: Value,
    #[serde(default)]
    reason: Option<String>,
}

/// First decision object embedded in `text`, if any
///
/// Every brace-balanced `{...}` span is tried in order of its opening
/// brace; braces inside JSON strings are ignored while matching.
pub fn parse_decision(text: &str) -> Option<Decision> {
    let decision = json_candidates(text).into_iter().find_map(decision_from_json);
    if decision.is_none() {
        tracing::error!("No decision JSON found in model reply");
    }
    decision
}

fn decision_from_json(candidate: &str) -> Option<Decision> {
    let raw: RawDecision = serde_json::from_str(candidate).ok()?;

    let action = match raw.decision.parse::<TradeAction>() {
        Ok(action) => action,
        Err(e) => {
            tracing::warn!("Ignoring decision object: {}", e);
            return None;
        }
    };
    let percentage = percentage_value(&raw.percentage)?;

    // A buy or sell must move at least 1% of the balance
    if action != TradeAction::Hold && percentage.round() < 1.0 {
        tracing::warn!("Ignoring {} decision with percentage {}", action, percentage);
        return None;
    }

    Some(Decision::new(
        action,
        percentage,
        raw.reason.unwrap_or_default(),
    ))
}

fn percentage_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    }
    .filter(|p: &f64| p.is_finite())
}

/// Balanced `{...}` spans, in order of their opening brace
///
/// Single scan with a stack of open brace offsets. Quotes only count once
/// inside an open brace, so prose quotes before the object are harmless.
fn json_candidates(text: &str) -> Vec<&str> {
    let mut open: Vec<usize> = Vec::new();
    let mut spans: Vec<(usize, usize)> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' if !open.is_empty() => in_string = true,
            '{' => open.push(i),
            '}' => {
                if let Some(start) = open.pop() {
                    spans.push((start, i + 1));
                }
            }
            _ => {}
        }
    }

    spans.sort_unstable_by_key(|(start, _)| *start);
    spans.into_iter().map(|(start, end)| &text[start..end]).collect()
}
