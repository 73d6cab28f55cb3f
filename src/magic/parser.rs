//! Parser for the textual magic format
//!
//! Each non-comment line is `[>...]offset type test message`, optionally
//! followed by `!:` attribute lines that decorate the rule above them.
//! Fields are separated by blanks; a backslash escapes a blank inside a
//! field.

use regex::bytes::RegexBuilder;

use super::rule::{
    ArithOp, DateStyle, Endian, FloatWidth, IndirectOffset, IndirectWidth, NumWidth, Offset,
    PstringLen, Relation, SignatureRule, StrengthAdjust, StringFlags, TestKind,
};
use super::strength::strength;
use crate::error::{LoadError, Location};
use crate::types::{REGEX_DEFAULT_RANGE, SEARCH_DEFAULT_RANGE};

/// Parses one magic source into its top-level rule trees, in declaration order.
pub(crate) fn parse(origin: &str, text: &str) -> Result<Vec<SignatureRule>, LoadError> {
    let mut parser = Parser::new(origin);
    for (index, line) in text.lines().enumerate() {
        parser.line(index + 1, line)?;
    }
    Ok(parser.finish())
}

struct Parser<'a> {
    origin: &'a str,
    roots: Vec<SignatureRule>,
    /// Rules whose subtree is still open, one per level
    open: Vec<SignatureRule>,
}

impl<'a> Parser<'a> {
    fn new(origin: &'a str) -> Self {
        Self {
            origin,
            roots: Vec::new(),
            open: Vec::new(),
        }
    }

    fn line(&mut self, number: usize, line: &str) -> Result<(), LoadError> {
        let text = line.trim();
        if text.is_empty() || text.starts_with('#') {
            return Ok(());
        }

        let at = Location::new(self.origin, number);
        if let Some(attribute) = text.strip_prefix("!:") {
            return self.attribute(at, attribute);
        }

        let rule = parse_rule(&at, text)?;
        self.push(at, rule)
    }

    fn push(&mut self, at: Location, rule: SignatureRule) -> Result<(), LoadError> {
        if rule.level > self.open.len() {
            return Err(LoadError::Nesting {
                at,
                level: rule.level,
                open: self.open.len().saturating_sub(1),
            });
        }
        if rule.level > 0 && matches!(rule.test, TestKind::Name(_)) {
            return Err(LoadError::Syntax {
                at,
                message: "`name` is only allowed at level 0".to_string(),
            });
        }

        self.close_to(rule.level);
        self.open.push(rule);
        Ok(())
    }

    fn close_to(&mut self, depth: usize) {
        while self.open.len() > depth {
            let Some(mut done) = self.open.pop() else {
                break;
            };
            done.strength = strength(&done);
            match self.open.last_mut() {
                Some(parent) => parent.children.push(done),
                None => self.roots.push(done),
            }
        }
    }

    fn attribute(&mut self, at: Location, attribute: &str) -> Result<(), LoadError> {
        let (name, value) = split_word(attribute);
        let Some(target) = self.open.last_mut() else {
            return Err(LoadError::OrphanAttribute {
                at,
                attribute: name.to_string(),
            });
        };

        match name {
            "mime" => {
                let (mime, _) = split_word(value);
                if mime.is_empty() {
                    return Err(syntax(at, "`!:mime` needs a type"));
                }
                target.mime = Some(mime.to_string());
            }
            "ext" => {
                let (list, _) = split_word(value);
                target.extensions = list
                    .split('/')
                    .filter(|ext| !ext.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            "strength" => {
                target.strength_adjust = Some(parse_strength(&at, value)?);
            }
            "apple" => {}
            other => {
                return Err(syntax(at, &format!("unknown attribute `!:{other}`")));
            }
        }
        Ok(())
    }

    fn finish(mut self) -> Vec<SignatureRule> {
        self.close_to(0);
        self.roots
    }
}

fn syntax(at: Location, message: &str) -> LoadError {
    LoadError::Syntax {
        at,
        message: message.to_string(),
    }
}

fn invalid_number(at: &Location, text: &str) -> LoadError {
    LoadError::InvalidNumber {
        at: at.clone(),
        text: text.to_string(),
    }
}

fn split_word(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    match text.find(char::is_whitespace) {
        Some(end) => (&text[..end], text[end..].trim_start()),
        None => (text, ""),
    }
}

/// Splits off the next blank-delimited field, honouring backslash escapes.
fn next_field(text: &str) -> (&str, &str) {
    let text = text.trim_start_matches([' ', '\t']);
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b' ' | b'\t' => break,
            _ => i += 1,
        }
    }
    let end = i.min(bytes.len());
    (&text[..end], &text[end..])
}

fn parse_strength(at: &Location, text: &str) -> Result<StrengthAdjust, LoadError> {
    let text = text.trim();
    let mut chars = text.chars();
    let op = match chars.next() {
        Some(op @ ('+' | '-' | '*' | '/')) => op,
        _ => return Err(syntax(at.clone(), "`!:strength` needs one of + - * /")),
    };
    let operand = chars.as_str().trim();
    let value = parse_int(operand)
        .and_then(|value| u32::try_from(value).ok())
        .ok_or_else(|| invalid_number(at, operand))?;
    Ok(StrengthAdjust { op, value })
}

fn parse_rule(at: &Location, text: &str) -> Result<SignatureRule, LoadError> {
    let level = text.bytes().take_while(|b| *b == b'>').count();
    let rest = &text[level..];

    let (offset_field, rest) = next_field(rest);
    if offset_field.is_empty() {
        return Err(syntax(at.clone(), "missing offset"));
    }
    let offset = parse_offset(at, offset_field)?;

    let (type_field, rest) = next_field(rest);
    if type_field.is_empty() {
        return Err(syntax(at.clone(), "missing type"));
    }

    let (mut test_field, mut rest) = next_field(rest);
    let merged;
    if matches!(test_field, "=" | "!" | "<" | ">" | "&" | "^") {
        let (value, remainder) = next_field(rest);
        merged = format!("{test_field}{value}");
        test_field = merged.as_str();
        rest = remainder;
    }

    let test = parse_test(at, type_field, test_field)?;
    let mut rule = SignatureRule::new(level, at.line, offset, test);
    rule.description = rest.trim_start_matches([' ', '\t']).trim_end().to_string();
    Ok(rule)
}

/// Parses an integer literal: decimal, `0x` hex or leading-zero octal, with
/// an optional sign. Negative values wrap into two's complement.
pub(crate) fn parse_int(text: &str) -> Option<u64> {
    let text = text.trim_end_matches(['L', 'l', 'U', 'u']);
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };

    let magnitude = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16).ok()?
    } else if digits.len() > 1 && digits.starts_with('0') {
        u64::from_str_radix(&digits[1..], 8).ok()?
    } else {
        digits.parse::<u64>().ok()?
    };

    Some(if negative {
        magnitude.wrapping_neg()
    } else {
        magnitude
    })
}

fn parse_offset(at: &Location, text: &str) -> Result<Offset, LoadError> {
    if let Some(rest) = text.strip_prefix('&') {
        if rest.starts_with('(') {
            let mut indirect = parse_indirect(at, rest)?;
            indirect.result_relative = true;
            return Ok(Offset::Indirect(Box::new(indirect)));
        }
        let value = parse_int(rest).ok_or_else(|| invalid_number(at, text))?;
        return Ok(Offset::Relative(value as i64));
    }
    if text.starts_with('(') {
        return Ok(Offset::Indirect(Box::new(parse_indirect(at, text)?)));
    }
    if let Some(rest) = text.strip_prefix('-') {
        let value = parse_int(rest).ok_or_else(|| invalid_number(at, text))?;
        return Ok(Offset::FromEnd(value));
    }
    let value = parse_int(text).ok_or_else(|| invalid_number(at, text))?;
    Ok(Offset::Absolute(value))
}

fn parse_indirect(at: &Location, text: &str) -> Result<IndirectOffset, LoadError> {
    let inner = text
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| syntax(at.clone(), &format!("unterminated indirect offset `{text}`")))?;

    let (base_relative, inner) = match inner.strip_prefix('&') {
        Some(rest) => (true, rest),
        None => (false, inner),
    };

    let split = inner
        .find(['.', ',', '+', '-', '*', '/', '%', '&', '|', '^'])
        .unwrap_or(inner.len());
    let (base_text, mut rest) = inner.split_at(split);
    let base = parse_int(base_text).ok_or_else(|| invalid_number(at, base_text))? as i64;

    let mut width = IndirectWidth::Long;
    let mut endian = Endian::Little;
    let mut signed = false;
    if let Some(separator) = rest.chars().next().filter(|c| matches!(c, '.' | ',')) {
        signed = separator == ',';
        let mut chars = rest[1..].chars();
        let code = chars
            .next()
            .ok_or_else(|| syntax(at.clone(), "missing indirect type"))?;
        (width, endian) = match code {
            'b' | 'B' | 'c' | 'C' => (IndirectWidth::Byte, Endian::Little),
            's' | 'h' => (IndirectWidth::Short, Endian::Little),
            'S' | 'H' => (IndirectWidth::Short, Endian::Big),
            'l' => (IndirectWidth::Long, Endian::Little),
            'L' => (IndirectWidth::Long, Endian::Big),
            'q' => (IndirectWidth::Quad, Endian::Little),
            'Q' => (IndirectWidth::Quad, Endian::Big),
            'i' => (IndirectWidth::Id3, Endian::Little),
            'I' => (IndirectWidth::Id3, Endian::Big),
            other => {
                return Err(syntax(at.clone(), &format!("unknown indirect type `{other}`")));
            }
        };
        rest = chars.as_str();
    }

    let adjust = match rest.chars().next() {
        None => None,
        Some(symbol) => {
            let op = ArithOp::from_symbol(symbol)
                .ok_or_else(|| syntax(at.clone(), &format!("unexpected `{symbol}` in offset")))?;
            let operand = &rest[symbol.len_utf8()..];
            let value = parse_int(operand).ok_or_else(|| invalid_number(at, operand))?;
            Some((op, value as i64))
        }
    };

    Ok(IndirectOffset {
        base,
        base_relative,
        width,
        endian,
        signed,
        adjust,
        result_relative: false,
    })
}

#[derive(Debug, Clone, Copy)]
enum TypeBase {
    Numeric(NumWidth, Endian),
    Float(FloatWidth, Endian),
    Date(NumWidth, Endian, DateStyle),
    String,
    Pstring,
    Search,
    Regex,
    Default,
    Clear,
    Name,
    Use,
}

fn lookup_type(name: &str) -> Option<TypeBase> {
    use DateStyle::{Local, Utc};
    use Endian::{Big, Little};
    use NumWidth::{Byte, Long, Quad, Short};

    let native = Endian::native();
    Some(match name {
        "byte" => TypeBase::Numeric(Byte, native),
        "short" => TypeBase::Numeric(Short, native),
        "beshort" => TypeBase::Numeric(Short, Big),
        "leshort" => TypeBase::Numeric(Short, Little),
        "long" => TypeBase::Numeric(Long, native),
        "belong" => TypeBase::Numeric(Long, Big),
        "lelong" => TypeBase::Numeric(Long, Little),
        "quad" => TypeBase::Numeric(Quad, native),
        "bequad" => TypeBase::Numeric(Quad, Big),
        "lequad" => TypeBase::Numeric(Quad, Little),
        "float" => TypeBase::Float(FloatWidth::Single, native),
        "befloat" => TypeBase::Float(FloatWidth::Single, Big),
        "lefloat" => TypeBase::Float(FloatWidth::Single, Little),
        "double" => TypeBase::Float(FloatWidth::Double, native),
        "bedouble" => TypeBase::Float(FloatWidth::Double, Big),
        "ledouble" => TypeBase::Float(FloatWidth::Double, Little),
        "date" => TypeBase::Date(Long, native, Utc),
        "bedate" => TypeBase::Date(Long, Big, Utc),
        "ledate" => TypeBase::Date(Long, Little, Utc),
        "ldate" => TypeBase::Date(Long, native, Local),
        "beldate" => TypeBase::Date(Long, Big, Local),
        "leldate" => TypeBase::Date(Long, Little, Local),
        "qdate" => TypeBase::Date(Quad, native, Utc),
        "beqdate" => TypeBase::Date(Quad, Big, Utc),
        "leqdate" => TypeBase::Date(Quad, Little, Utc),
        "qldate" => TypeBase::Date(Quad, native, Local),
        "beqldate" => TypeBase::Date(Quad, Big, Local),
        "leqldate" => TypeBase::Date(Quad, Little, Local),
        "string" => TypeBase::String,
        "pstring" => TypeBase::Pstring,
        "search" => TypeBase::Search,
        "regex" => TypeBase::Regex,
        "default" => TypeBase::Default,
        "clear" => TypeBase::Clear,
        "name" => TypeBase::Name,
        "use" => TypeBase::Use,
        _ => return None,
    })
}

/// Modifiers collected from the `/...` segments of a string-like type
#[derive(Debug, Default)]
struct Modifiers {
    flags: StringFlags,
    range: Option<usize>,
    lines: bool,
    pstring_len: Option<PstringLen>,
    include_self: bool,
}

fn parse_modifiers(
    at: &Location,
    token: &str,
    base: TypeBase,
    suffix: &str,
) -> Result<Modifiers, LoadError> {
    let mut modifiers = Modifiers::default();
    if suffix.is_empty() {
        return Ok(modifiers);
    }
    let Some(segments) = suffix.strip_prefix('/') else {
        return Err(syntax(at.clone(), &format!("unexpected `{suffix}` after `{token}`")));
    };

    let unknown = |modifier: char| LoadError::UnknownModifier {
        at: at.clone(),
        token: token.to_string(),
        modifier,
    };

    for segment in segments.split('/') {
        let digits = segment.bytes().take_while(u8::is_ascii_digit).count();
        if digits > 0 {
            if !matches!(base, TypeBase::Search | TypeBase::Regex) {
                return Err(unknown(segment.chars().next().unwrap_or('/')));
            }
            let range = segment[..digits]
                .parse::<usize>()
                .map_err(|_| invalid_number(at, segment))?;
            modifiers.range = Some(range);
        }

        for flag in segment[digits..].chars() {
            let flags = &mut modifiers.flags;
            match (base, flag) {
                (_, 'c') => flags.fold_lower = true,
                (TypeBase::Regex, 's') => flags.start_offset = true,
                (TypeBase::Regex, 'l') => modifiers.lines = true,
                (TypeBase::Regex, _) => return Err(unknown(flag)),
                (_, 'C') => flags.fold_upper = true,
                (_, 'w') => flags.optional_blanks = true,
                (_, 'W') => flags.compact_blanks = true,
                (_, 'T') => flags.trim = true,
                (_, 't') => flags.text = true,
                (_, 'b') => flags.binary = true,
                (TypeBase::Search, 's') => flags.start_offset = true,
                (TypeBase::Pstring, 'B') => modifiers.pstring_len = Some(PstringLen::Byte),
                (TypeBase::Pstring, 'H') => {
                    modifiers.pstring_len = Some(PstringLen::Short(Endian::Big))
                }
                (TypeBase::Pstring, 'h') => {
                    modifiers.pstring_len = Some(PstringLen::Short(Endian::Little))
                }
                (TypeBase::Pstring, 'L') => {
                    modifiers.pstring_len = Some(PstringLen::Long(Endian::Big))
                }
                (TypeBase::Pstring, 'l') => {
                    modifiers.pstring_len = Some(PstringLen::Long(Endian::Little))
                }
                (TypeBase::Pstring, 'J') => modifiers.include_self = true,
                _ => return Err(unknown(flag)),
            }
        }
    }
    Ok(modifiers)
}

fn parse_arith(at: &Location, token: &str, suffix: &str) -> Result<Option<(ArithOp, u64)>, LoadError> {
    let Some(symbol) = suffix.chars().next() else {
        return Ok(None);
    };
    let op = ArithOp::from_symbol(symbol).ok_or_else(|| {
        syntax(at.clone(), &format!("unexpected `{suffix}` after `{token}`"))
    })?;
    let operand = &suffix[symbol.len_utf8()..];
    let value = parse_int(operand).ok_or_else(|| invalid_number(at, operand))?;
    Ok(Some((op, value)))
}

fn parse_test(at: &Location, type_field: &str, test_field: &str) -> Result<TestKind, LoadError> {
    let split = type_field
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(type_field.len());
    let (token, suffix) = type_field.split_at(split);

    let (base, signed) = match lookup_type(token) {
        Some(base) => (base, true),
        None => match token.strip_prefix('u').and_then(lookup_type) {
            Some(base @ (TypeBase::Numeric(..) | TypeBase::Date(..))) => (base, false),
            _ => {
                return Err(LoadError::UnknownType {
                    at: at.clone(),
                    token: token.to_string(),
                });
            }
        },
    };

    match base {
        TypeBase::Numeric(width, endian) => {
            let arith = parse_arith(at, token, suffix)?;
            let (relation, value) = parse_numeric_value(at, test_field)?;
            Ok(TestKind::Numeric {
                width,
                endian,
                signed,
                arith,
                relation,
                value: width.truncate(value),
            })
        }
        TypeBase::Date(width, endian, style) => {
            let arith = parse_arith(at, token, suffix)?;
            let (relation, value) = parse_numeric_value(at, test_field)?;
            Ok(TestKind::Date {
                width,
                endian,
                style,
                arith,
                relation,
                value: width.truncate(value),
            })
        }
        TypeBase::Float(width, endian) => {
            if !suffix.is_empty() {
                return Err(syntax(at.clone(), &format!("unexpected `{suffix}` after `{token}`")));
            }
            let (relation, value) = parse_float_value(at, test_field)?;
            Ok(TestKind::Float {
                width,
                endian,
                relation,
                value,
            })
        }
        TypeBase::String | TypeBase::Pstring => {
            let modifiers = parse_modifiers(at, token, base, suffix)?;
            let (relation, pattern) = parse_string_value(test_field);
            if matches!(base, TypeBase::String) {
                Ok(TestKind::String {
                    pattern,
                    relation,
                    flags: modifiers.flags,
                })
            } else {
                Ok(TestKind::Pstring {
                    len: modifiers.pstring_len.unwrap_or(PstringLen::Byte),
                    include_self: modifiers.include_self,
                    pattern,
                    relation,
                    flags: modifiers.flags,
                })
            }
        }
        TypeBase::Search => {
            let modifiers = parse_modifiers(at, token, base, suffix)?;
            let (negate, pattern) = parse_search_value(at, test_field)?;
            Ok(TestKind::Search {
                pattern: unescape(pattern),
                range: modifiers.range.unwrap_or(SEARCH_DEFAULT_RANGE),
                negate,
                flags: modifiers.flags,
            })
        }
        TypeBase::Regex => {
            let modifiers = parse_modifiers(at, token, base, suffix)?;
            let (negate, pattern) = parse_search_value(at, test_field)?;
            let source = pattern.replace("\\ ", " ");
            let regex = RegexBuilder::new(&source)
                .case_insensitive(modifiers.flags.fold_lower || modifiers.flags.fold_upper)
                .multi_line(true)
                .unicode(false)
                .build()
                .map_err(|err| LoadError::Regex {
                    at: at.clone(),
                    message: err.to_string(),
                })?;
            Ok(TestKind::Regex {
                regex,
                range: modifiers.range.unwrap_or(REGEX_DEFAULT_RANGE),
                lines: modifiers.lines,
                negate,
                flags: modifiers.flags,
            })
        }
        TypeBase::Default | TypeBase::Clear | TypeBase::Name | TypeBase::Use => {
            if !suffix.is_empty() {
                return Err(syntax(at.clone(), &format!("unexpected `{suffix}` after `{token}`")));
            }
            match base {
                TypeBase::Default => Ok(TestKind::Default),
                TypeBase::Clear => Ok(TestKind::Clear),
                _ => {
                    let name = String::from_utf8_lossy(&unescape(test_field)).into_owned();
                    let (flip_endian, name) = match name.strip_prefix('^') {
                        Some(rest) => (true, rest.to_string()),
                        None => (false, name),
                    };
                    if name.is_empty() {
                        return Err(syntax(at.clone(), &format!("`{token}` needs a name")));
                    }
                    if matches!(base, TypeBase::Name) {
                        Ok(TestKind::Name(name))
                    } else {
                        Ok(TestKind::Use { name, flip_endian })
                    }
                }
            }
        }
    }
}

fn split_relation<'t>(text: &'t str, allowed: &[char]) -> (Option<char>, &'t str) {
    match text.chars().next() {
        Some(symbol) if allowed.contains(&symbol) => (Some(symbol), &text[symbol.len_utf8()..]),
        _ => (None, text),
    }
}

fn relation_for(symbol: Option<char>) -> Relation {
    match symbol {
        Some('!') => Relation::Ne,
        Some('<') => Relation::Lt,
        Some('>') => Relation::Gt,
        Some('&') => Relation::AllSet,
        Some('^') => Relation::AnyClear,
        _ => Relation::Eq,
    }
}

fn parse_numeric_value(at: &Location, text: &str) -> Result<(Relation, u64), LoadError> {
    if text == "x" {
        return Ok((Relation::Any, 0));
    }
    let (symbol, rest) = split_relation(text, &['=', '!', '<', '>', '&', '^']);
    let (negate, rest) = match rest.strip_prefix('~') {
        Some(rest) => (true, rest),
        None => (false, rest),
    };
    let value = parse_int(rest).ok_or_else(|| invalid_number(at, text))?;
    Ok((relation_for(symbol), if negate { !value } else { value }))
}

fn parse_float_value(at: &Location, text: &str) -> Result<(Relation, f64), LoadError> {
    if text == "x" {
        return Ok((Relation::Any, 0.0));
    }
    let (symbol, rest) = split_relation(text, &['=', '!', '<', '>']);
    let value = rest
        .parse::<f64>()
        .map_err(|_| invalid_number(at, text))?;
    Ok((relation_for(symbol), value))
}

fn parse_string_value(text: &str) -> (Relation, Vec<u8>) {
    if text == "x" {
        return (Relation::Any, Vec::new());
    }
    let (symbol, rest) = split_relation(text, &['=', '!', '<', '>']);
    (relation_for(symbol), unescape(rest))
}

fn parse_search_value<'t>(at: &Location, text: &'t str) -> Result<(bool, &'t str), LoadError> {
    let (symbol, rest) = split_relation(text, &['=', '!', '<', '>']);
    match symbol {
        None | Some('=') => Ok((false, rest)),
        Some('!') => Ok((true, rest)),
        Some(other) => Err(syntax(
            at.clone(),
            &format!("relation `{other}` is not supported for search and regex"),
        )),
    }
}

/// Decodes C-style escapes in a pattern or name
pub(crate) fn unescape(text: &str) -> Vec<u8> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'\\' || i + 1 == bytes.len() {
            out.push(bytes[i]);
            i += 1;
            continue;
        }

        i += 1;
        match bytes[i] {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'v' => out.push(0x0b),
            b'f' => out.push(0x0c),
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b'x' => {
                let digits = bytes[i + 1..]
                    .iter()
                    .take(2)
                    .take_while(|b| b.is_ascii_hexdigit())
                    .count();
                if digits == 0 {
                    out.push(b'x');
                } else {
                    let hex = &text[i + 1..i + 1 + digits];
                    out.push(u8::from_str_radix(hex, 16).unwrap_or(0));
                    i += digits;
                }
            }
            b'0'..=b'7' => {
                let digits = bytes[i..]
                    .iter()
                    .take(3)
                    .take_while(|b| (b'0'..=b'7').contains(*b))
                    .count();
                let value = bytes[i..i + digits]
                    .iter()
                    .fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
                out.push(value as u8);
                i += digits - 1;
            }
            other => out.push(other),
        }
        i += 1;
    }
    out
}
