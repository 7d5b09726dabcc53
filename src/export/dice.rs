//! Dice roll detection for bot-authored messages.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use super::content::pattern;

/// `NdM` terms joined by `+`/`-` with optional constants, then `= result`
static DICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"(?i)\b(\d*d\d+(?:\s*[+\-]\s*(?:\d*d\d+|\d+))*)\s*=\s*(-?\d+)\b")
});

/// A parsed dice roll
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceRoll {
    /// Roll expression, e.g. `1d20+3`
    pub command: String,
    /// Rolled total
    pub result: i64,
}

/// Detect a dice roll in a flattened message body
///
/// Only bot-authored messages are considered; players typing roll-like text
/// are never flagged.
pub fn detect_dice(body: &str, is_bot: bool) -> Option<DiceRoll> {
    if !is_bot {
        return None;
    }
    let caps = DICE_RE.captures(body)?;
    let command: String = caps[1].chars().filter(|c| !c.is_whitespace()).collect();
    let result = caps[2].parse().ok()?;
    Some(DiceRoll { command, result })
}
