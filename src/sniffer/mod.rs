//! Sniffer: evaluates the signature store against a captured prefix
//!
//! Top-level rules are tried in priority order and the first one whose tree
//! produces a description wins. Children refine the description depth-first;
//! the deepest rule declaring a MIME type decides the MIME type.

mod compare;
mod render;

use tracing::{debug, trace};

use crate::config::Options;
use crate::heuristics;
use crate::io::InputBuffer;
use crate::magic::{IndirectOffset, IndirectWidth, Offset, SignatureRule, SignatureStore, TestKind};
use crate::types::{MAX_RECURSION, MatchKind, MatchResult};

use compare::{read_id3, read_uint};
use render::{Value, render};

pub(crate) use render::escape;

/// Identifies inputs against one signature store
#[derive(Debug, Clone, Copy)]
pub struct Sniffer<'a> {
    store: &'a SignatureStore,
    raw: bool,
}

/// Position state threaded through rule evaluation
#[derive(Debug, Clone, Copy)]
struct Frame {
    /// Where absolute offsets start; non-zero inside `use`
    base: usize,
    /// End of the parent's match
    parent_end: usize,
    /// Swap endianness, set by `use \^name`
    flip: bool,
    depth: usize,
}

/// Accumulated output of one top-level rule tree
#[derive(Debug, Default)]
struct Evaluation {
    description: String,
    summary: Option<String>,
    mime: Option<(usize, String)>,
    extensions: Option<(usize, Vec<String>)>,
    consumed: usize,
}

impl Evaluation {
    fn record(&mut self, rule: &SignatureRule, value: &Value, end: usize, depth: usize) {
        let fragment = render(rule.description(), value);
        self.append(&fragment);

        if let Some(mime) = rule.mime() {
            if self.mime.as_ref().is_none_or(|(at, _)| depth > *at) {
                self.mime = Some((depth, mime.to_string()));
            }
        }
        if !rule.extensions().is_empty()
            && self.extensions.as_ref().is_none_or(|(at, _)| depth > *at)
        {
            self.extensions = Some((depth, rule.extensions().to_vec()));
        }
        self.consumed = self.consumed.max(end);
    }

    fn append(&mut self, fragment: &str) {
        if fragment.is_empty() {
            return;
        }
        match fragment.strip_prefix("\\b") {
            Some(rest) => self.description.push_str(rest),
            None => {
                if !self.description.is_empty() {
                    self.description.push(' ');
                }
                self.description.push_str(fragment);
            }
        }
        if self.summary.is_none() {
            let bare = fragment.strip_prefix("\\b").unwrap_or(fragment).trim();
            if !bare.is_empty() {
                self.summary = Some(bare.to_string());
            }
        }
    }

    fn is_meaningful(&self) -> bool {
        !self.description.trim().is_empty() || self.mime.is_some()
    }

    fn into_result(self, rule: &SignatureRule) -> MatchResult {
        let description = self.description.trim().to_string();
        let mut result = MatchResult::new(MatchKind::Signature, description.clone())
            .with_summary(self.summary.unwrap_or(description));
        result.mime = self.mime.map(|(_, mime)| mime);
        result.extensions = self.extensions.map(|(_, exts)| exts).unwrap_or_default();
        result.strength = rule.strength();
        result.consumed = self.consumed;
        result
    }
}

impl<'a> Sniffer<'a> {
    pub fn new(store: &'a SignatureStore) -> Self {
        Self { store, raw: false }
    }

    pub fn with_options(store: &'a SignatureStore, options: &Options) -> Self {
        Self {
            store,
            raw: options.raw,
        }
    }

    /// Classifies a captured prefix. Never fails: an input nothing matches
    /// falls back to the text/binary heuristics, or to "data" in raw mode.
    pub fn identify(&self, buffer: &InputBuffer) -> MatchResult {
        let data = buffer.as_bytes();
        if data.is_empty() {
            return MatchResult::empty().with_charset(heuristics::Encoding::Binary.charset());
        }

        let charset = heuristics::detect_encoding(data).charset();
        let result = match self.match_rules(buffer) {
            Some(result) => result,
            None if self.raw => MatchResult::data(),
            None => heuristics::classify(data),
        };
        result.with_charset(charset)
    }

    /// Classifies a complete in-memory input
    pub fn identify_bytes(&self, bytes: &[u8]) -> MatchResult {
        self.identify(&InputBuffer::from_slice(bytes))
    }

    fn match_rules(&self, buffer: &InputBuffer) -> Option<MatchResult> {
        let data = buffer.as_bytes();
        let complete = buffer.is_complete();

        for rule in self.store.rules_in_priority_order() {
            let mut evaluation = Evaluation::default();
            let frame = Frame {
                base: 0,
                parent_end: 0,
                flip: false,
                depth: 0,
            };
            if !self.evaluate(std::slice::from_ref(rule), frame, data, complete, &mut evaluation) {
                continue;
            }
            if !evaluation.is_meaningful() {
                trace!(line = rule.line(), "match produced no description");
                continue;
            }
            debug!(
                line = rule.line(),
                strength = rule.strength(),
                description = %evaluation.description,
                "signature matched"
            );
            return Some(evaluation.into_result(rule));
        }
        None
    }

    /// Evaluates sibling rules in order; returns whether any of them matched
    fn evaluate(
        &self,
        rules: &[SignatureRule],
        frame: Frame,
        data: &[u8],
        complete: bool,
        evaluation: &mut Evaluation,
    ) -> bool {
        if frame.depth > MAX_RECURSION {
            return false;
        }

        let mut any = false;
        let mut sibling_matched = false;
        for rule in rules {
            let offset = match rule.test() {
                TestKind::Name(_) => continue,
                TestKind::Clear => {
                    sibling_matched = false;
                    continue;
                }
                TestKind::Default if sibling_matched => continue,
                _ => match self.resolve(rule.offset(), frame, data, complete) {
                    Some(offset) => offset,
                    None => continue,
                },
            };

            let (end, value) = match rule.test() {
                TestKind::Default => (offset, Value::None),
                TestKind::Use { name, flip_endian } => {
                    let Some(tree) = self.store.named(name) else {
                        continue;
                    };
                    let inner = Frame {
                        base: offset,
                        parent_end: offset,
                        flip: frame.flip ^ flip_endian,
                        depth: frame.depth + 1,
                    };
                    if !self.evaluate(tree.children(), inner, data, complete, evaluation) {
                        continue;
                    }
                    (offset, Value::None)
                }
                test => match compare::evaluate(test, data, offset, frame.flip) {
                    Some(hit) => (hit.end, hit.value),
                    None => continue,
                },
            };

            trace!(line = rule.line(), offset, end, "rule matched");
            any = true;
            sibling_matched = true;
            evaluation.record(rule, &value, end, frame.depth);

            let below = Frame {
                parent_end: end,
                depth: frame.depth + 1,
                ..frame
            };
            self.evaluate(rule.children(), below, data, complete, evaluation);
        }
        any
    }

    /// Resolves an offset to a buffer position; `None` when it falls outside
    /// the input or its arithmetic overflows.
    fn resolve(&self, offset: &Offset, frame: Frame, data: &[u8], complete: bool) -> Option<usize> {
        match offset {
            Offset::Absolute(at) => frame.base.checked_add(usize::try_from(*at).ok()?),
            Offset::Relative(delta) => {
                frame.parent_end.checked_add_signed(isize::try_from(*delta).ok()?)
            }
            Offset::FromEnd(back) => {
                if !complete {
                    return None;
                }
                data.len().checked_sub(usize::try_from(*back).ok()?)
            }
            Offset::Indirect(indirect) => resolve_indirect(indirect, frame, data),
        }
    }
}

fn resolve_indirect(indirect: &IndirectOffset, frame: Frame, data: &[u8]) -> Option<usize> {
    let origin = if indirect.base_relative {
        frame.parent_end
    } else {
        frame.base
    };
    let at = origin.checked_add_signed(isize::try_from(indirect.base).ok()?)?;

    let endian = if frame.flip {
        indirect.endian.swapped()
    } else {
        indirect.endian
    };
    let raw = match indirect.width {
        IndirectWidth::Id3 => read_id3(data, at, endian)?,
        width => read_uint(data, at, width.size(), endian)?,
    };

    let mut value = if indirect.signed {
        match indirect.width {
            IndirectWidth::Byte => raw as u8 as i8 as i64,
            IndirectWidth::Short => raw as u16 as i16 as i64,
            IndirectWidth::Long | IndirectWidth::Id3 => raw as u32 as i32 as i64,
            IndirectWidth::Quad => raw as i64,
        }
    } else {
        i64::try_from(raw).ok()?
    };

    if let Some((op, operand)) = indirect.adjust {
        value = op.apply_signed(value, operand)?;
    }
    if indirect.result_relative {
        value = value.checked_add(i64::try_from(frame.parent_end).ok()?)?;
    }
    usize::try_from(value).ok()
}

/// Identifies a complete in-memory input with default options
pub fn identify(store: &SignatureStore, bytes: &[u8]) -> MatchResult {
    Sniffer::new(store).identify_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(text: &str) -> SignatureStore {
        SignatureStore::parse("test", text).unwrap()
    }

    #[test]
    fn test_fragments_join_with_backspace() {
        let store = store("0 string AB ab\n>2 byte 1 \\b, one\n>3 byte 2 two\n");
        let result = identify(&store, b"AB\x01\x02");
        assert_eq!(result.description, "ab, one two");
        assert_eq!(result.summary, "ab");
        assert_eq!(result.consumed, 4);
    }

    #[test]
    fn test_indirect_offset_resolution() {
        let frame = Frame {
            base: 0,
            parent_end: 2,
            flip: false,
            depth: 0,
        };
        let indirect = IndirectOffset {
            base: 0,
            base_relative: false,
            width: IndirectWidth::Byte,
            endian: crate::magic::Endian::Little,
            signed: false,
            adjust: Some((crate::magic::ArithOp::Add, 1)),
            result_relative: true,
        };
        assert_eq!(resolve_indirect(&indirect, frame, &[4]), Some(7));
    }

    #[test]
    fn test_empty_top_level_falls_through() {
        let store = store("0 string AB\n>2 byte 9 nine\n0 string A letter a\n");
        let result = identify(&store, b"AB\x01");
        assert_eq!(result.description, "letter a");
    }

    #[test]
    fn test_recursive_use_terminates() {
        let store = store("0 name loop\n>0 use loop\n0 byte x start\n>0 use loop\n");
        let result = identify(&store, b"\x01");
        assert_eq!(result.description, "start");
    }
}
