//! Per-kind comparison of a test against the input
//!
//! Every function here answers "does this test hold at this offset" and, when
//! it does, where the match ends and what value the message should show.
//! Reads past the end of the buffer are non-matches.

use memchr::memmem;

use super::render::Value;
use crate::magic::{
    DateStyle, Endian, FloatWidth, NumWidth, PstringLen, Relation, StringFlags, TestKind,
};
use crate::types::STRING_MAX;

/// A test that held
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Hit {
    /// Offset just past the bytes the test consumed
    pub end: usize,
    pub value: Value,
}

/// Reads an unsigned integer of `size` bytes
pub(crate) fn read_uint(data: &[u8], offset: usize, size: usize, endian: Endian) -> Option<u64> {
    let bytes = data.get(offset..offset.checked_add(size)?)?;
    let fold = |acc: u64, byte: &u8| (acc << 8) | u64::from(*byte);
    Some(match endian {
        Endian::Big => bytes.iter().fold(0, fold),
        Endian::Little => bytes.iter().rev().fold(0, fold),
    })
}

/// Reads an ID3v2 syncsafe integer: four bytes carrying seven bits each
pub(crate) fn read_id3(data: &[u8], offset: usize, endian: Endian) -> Option<u64> {
    let bytes = data.get(offset..offset.checked_add(4)?)?;
    let fold = |acc: u64, byte: &u8| (acc << 7) | u64::from(*byte & 0x7f);
    Some(match endian {
        Endian::Big => bytes.iter().fold(0, fold),
        Endian::Little => bytes.iter().rev().fold(0, fold),
    })
}

/// Evaluates a value-bearing test at `offset`; `flip` swaps every endianness
/// (set inside `use \^name`).
pub(crate) fn evaluate(test: &TestKind, data: &[u8], offset: usize, flip: bool) -> Option<Hit> {
    let endian = |endian: Endian| if flip { endian.swapped() } else { endian };

    match test {
        TestKind::Numeric {
            width,
            endian: order,
            signed,
            arith,
            relation,
            value,
        } => {
            let read = integer(data, offset, *width, endian(*order), *signed, *arith)?;
            compare_integer(read, *value, *width, *signed, *relation).then(|| Hit {
                end: offset + width.size(),
                value: if *signed {
                    Value::Signed(width.sign_extend(read))
                } else {
                    Value::Unsigned(read)
                },
            })
        }
        TestKind::Date {
            width,
            endian: order,
            style,
            arith,
            relation,
            value,
        } => {
            let read = integer(data, offset, *width, endian(*order), true, *arith)?;
            compare_integer(read, *value, *width, true, *relation).then(|| Hit {
                end: offset + width.size(),
                value: date_value(width.sign_extend(read), *style),
            })
        }
        TestKind::Float {
            width,
            endian: order,
            relation,
            value,
        } => {
            let bits = read_uint(data, offset, width.size(), endian(*order))?;
            let read = match width {
                FloatWidth::Single => f64::from(f32::from_bits(bits as u32)),
                FloatWidth::Double => f64::from_bits(bits),
            };
            let holds = match relation {
                Relation::Any => true,
                Relation::Eq => read == *value,
                Relation::Ne => read != *value,
                Relation::Lt => read < *value,
                Relation::Gt => read > *value,
                Relation::AllSet | Relation::AnyClear => false,
            };
            holds.then(|| Hit {
                end: offset + width.size(),
                value: Value::Float(read),
            })
        }
        TestKind::String {
            pattern,
            relation,
            flags,
        } => {
            if offset >= data.len() {
                return None;
            }
            compare_string(&data[offset..], pattern, *relation, flags).map(|(len, bytes)| Hit {
                end: offset + len,
                value: Value::Bytes(bytes),
            })
        }
        TestKind::Pstring {
            len,
            include_self,
            pattern,
            relation,
            flags,
        } => {
            let size = len.size();
            let declared = match len {
                PstringLen::Byte => read_uint(data, offset, 1, Endian::Big)?,
                PstringLen::Short(order) | PstringLen::Long(order) => {
                    read_uint(data, offset, size, endian(*order))?
                }
            };
            let declared = if *include_self {
                declared.checked_sub(size as u64)?
            } else {
                declared
            };
            let start = offset.checked_add(size)?;
            let stop = start.checked_add(usize::try_from(declared).ok()?)?;
            let body = data.get(start..stop)?;
            compare_string(body, pattern, *relation, flags).map(|(matched, bytes)| Hit {
                end: start + matched,
                value: Value::Bytes(bytes),
            })
        }
        TestKind::Search {
            pattern,
            range,
            negate,
            flags,
        } => {
            let window = data.get(offset..)?;
            let limit = window.len().min(range.saturating_add(pattern.len()));
            let found = search(&window[..limit], pattern, *range, flags);
            match (found, negate) {
                (Some((start, stop)), false) => Some(Hit {
                    end: offset + if flags.start_offset { start } else { stop },
                    value: Value::Bytes(window[start..stop].to_vec()),
                }),
                (None, true) => Some(Hit {
                    end: offset,
                    value: Value::None,
                }),
                _ => None,
            }
        }
        TestKind::Regex {
            regex,
            range,
            lines,
            negate,
            flags,
        } => {
            let window = data.get(offset..)?;
            let limit = if *lines {
                memchr::memchr_iter(b'\n', window)
                    .nth(range.saturating_sub(1))
                    .map_or(window.len(), |newline| newline + 1)
            } else {
                window.len().min(*range)
            };
            let found = regex.find(&window[..limit]);
            match (found, negate) {
                (Some(found), false) => Some(Hit {
                    end: offset + if flags.start_offset { found.start() } else { found.end() },
                    value: Value::Bytes(found.as_bytes().to_vec()),
                }),
                (None, true) => Some(Hit {
                    end: offset,
                    value: Value::None,
                }),
                _ => None,
            }
        }
        TestKind::Default | TestKind::Clear | TestKind::Name(_) | TestKind::Use { .. } => None,
    }
}

/// Reads an integer and applies the type's arithmetic; the result is
/// truncated to the type width.
fn integer(
    data: &[u8],
    offset: usize,
    width: NumWidth,
    endian: Endian,
    signed: bool,
    arith: Option<(crate::magic::ArithOp, u64)>,
) -> Option<u64> {
    let raw = read_uint(data, offset, width.size(), endian)?;
    let value = match arith {
        None => raw,
        Some((op, operand)) if signed => {
            let operand = width.sign_extend(width.truncate(operand));
            op.apply_signed(width.sign_extend(raw), operand)? as u64
        }
        Some((op, operand)) => op.apply(raw, operand)?,
    };
    Some(width.truncate(value))
}

fn compare_integer(read: u64, value: u64, width: NumWidth, signed: bool, relation: Relation) -> bool {
    match relation {
        Relation::Any => true,
        Relation::Eq => read == value,
        Relation::Ne => read != value,
        Relation::AllSet => read & value == value,
        Relation::AnyClear => read & value != value,
        Relation::Lt | Relation::Gt => {
            let ordering = if signed {
                width.sign_extend(read).cmp(&width.sign_extend(value))
            } else {
                read.cmp(&value)
            };
            match relation {
                Relation::Lt => ordering.is_lt(),
                _ => ordering.is_gt(),
            }
        }
    }
}

fn date_value(seconds: i64, style: DateStyle) -> Value {
    Value::Date { seconds, style }
}

fn is_blank(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t')
}

/// Matches `pattern` at the start of `data`, returning the match length
fn match_at(data: &[u8], pattern: &[u8], flags: &StringFlags) -> Option<usize> {
    if flags.is_plain() {
        return data.starts_with(pattern).then_some(pattern.len());
    }

    let mut i = 0;
    for &expected in pattern {
        if expected == b' ' && (flags.optional_blanks || flags.compact_blanks) {
            let run = data[i..].iter().take_while(|b| is_blank(**b)).count();
            if run == 0 && !flags.optional_blanks {
                return None;
            }
            i += run;
            continue;
        }

        let actual = *data.get(i)?;
        let equal = if flags.fold_lower && expected.is_ascii_lowercase() {
            actual.to_ascii_lowercase() == expected
        } else if flags.fold_upper && expected.is_ascii_uppercase() {
            actual.to_ascii_uppercase() == expected
        } else {
            actual == expected
        };
        if !equal {
            return None;
        }
        i += 1;
    }
    Some(i)
}

/// Bytes up to the first NUL or line break, bounded by `STRING_MAX`
fn c_string(data: &[u8]) -> &[u8] {
    let data = &data[..data.len().min(STRING_MAX)];
    let end = data
        .iter()
        .position(|b| matches!(b, 0 | b'\n' | b'\r'))
        .unwrap_or(data.len());
    &data[..end]
}

fn trimmed(bytes: &[u8], flags: &StringFlags) -> Vec<u8> {
    if flags.trim {
        bytes.trim_ascii().to_vec()
    } else {
        bytes.to_vec()
    }
}

/// String comparison shared by `string` and `pstring`; yields the consumed
/// length and the value for rendering.
fn compare_string(
    data: &[u8],
    pattern: &[u8],
    relation: Relation,
    flags: &StringFlags,
) -> Option<(usize, Vec<u8>)> {
    match relation {
        Relation::Any => {
            let value = c_string(data);
            Some((value.len(), trimmed(value, flags)))
        }
        Relation::Eq => {
            let len = match_at(data, pattern, flags)?;
            Some((len, trimmed(&data[..len], flags)))
        }
        Relation::Ne => match match_at(data, pattern, flags) {
            Some(_) => None,
            None => {
                let value = c_string(data);
                Some((pattern.len().min(data.len()), trimmed(value, flags)))
            }
        },
        Relation::Lt | Relation::Gt => {
            let value = c_string(data);
            let ordering = value.cmp(pattern);
            let holds = if relation == Relation::Lt {
                ordering.is_lt()
            } else {
                ordering.is_gt()
            };
            holds.then(|| (value.len(), trimmed(value, flags)))
        }
        Relation::AllSet | Relation::AnyClear => None,
    }
}

/// First match of `pattern` starting within `range` bytes of the window
fn search(window: &[u8], pattern: &[u8], range: usize, flags: &StringFlags) -> Option<(usize, usize)> {
    if pattern.is_empty() {
        return Some((0, 0));
    }
    if flags.is_plain() {
        return memmem::find(window, pattern)
            .filter(|start| *start <= range)
            .map(|start| (start, start + pattern.len()));
    }
    (0..=range.min(window.len().saturating_sub(1)))
        .find_map(|start| match_at(&window[start..], pattern, flags).map(|len| (start, start + len)))
}
