use super::rule::{Relation, SignatureRule, StrengthAdjust, TestKind};

const MULT: i64 = 10;

/// Characters with special meaning in a regex, which do not count towards
/// its literal length.
const REGEX_META: &[u8] = b"^$.[]()|*+?{}\\";

/// Strength of a rule: how specific a match on it is.
///
/// Longer literal tests score higher; `x` scores nothing; ranged and masked
/// comparisons are penalised. The database's own `!:strength` line is applied
/// last and is authoritative.
pub(crate) fn strength(rule: &SignatureRule) -> u32 {
    let base = match base_strength(&rule.test) {
        Some(value) => value,
        None => return 0,
    };

    let adjusted = match rule.strength_adjust {
        Some(adjust) => apply_adjust(base.max(1), adjust),
        None => base,
    };

    adjusted.clamp(1, u32::MAX as i64) as u32
}

fn base_strength(test: &TestKind) -> Option<i64> {
    let mut value = 2 * MULT;

    value += match test {
        TestKind::Numeric { width, .. } | TestKind::Date { width, .. } => {
            width.size() as i64 * MULT
        }
        TestKind::Float { width, .. } => width.size() as i64 * MULT,
        TestKind::String { pattern, .. } | TestKind::Pstring { pattern, .. } => {
            pattern.len() as i64 * MULT
        }
        TestKind::Search { pattern, .. } => spread(pattern.len() as i64),
        TestKind::Regex { regex, .. } => spread(literal_len(regex.as_str()) as i64),
        TestKind::Default | TestKind::Clear | TestKind::Name(_) | TestKind::Use { .. } => {
            return None;
        }
    };

    match test.relation() {
        Relation::Any => value = 0,
        Relation::Eq | Relation::Ne => value += MULT,
        Relation::Lt | Relation::Gt => value -= 2 * MULT,
        Relation::AllSet | Relation::AnyClear => value -= MULT,
    }

    Some(value.max(1))
}

/// Patterns searched over a window are worth less per byte than anchored ones
fn spread(len: i64) -> i64 {
    if len == 0 {
        0
    } else {
        len * (MULT / len).max(1)
    }
}

fn literal_len(pattern: &str) -> usize {
    let bytes = pattern.as_bytes();
    let mut count = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            i += 2;
            continue;
        }
        if !REGEX_META.contains(&bytes[i]) {
            count += 1;
        }
        i += 1;
    }
    count
}

fn apply_adjust(value: i64, adjust: StrengthAdjust) -> i64 {
    let operand = adjust.value as i64;
    match adjust.op {
        '+' => value + operand,
        '-' => value - operand,
        '*' => value * operand,
        '/' if operand != 0 => value / operand,
        _ => value,
    }
}
