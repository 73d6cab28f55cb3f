//! Signature rule tree
//!
//! A rule is one line of a magic database: where to look, what to compare,
//! and what to say when the comparison holds. Continuation lines become
//! children, so the database is a forest of rule trees rather than a flat
//! list with level numbers.

use regex::bytes::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            Endian::Big
        } else {
            Endian::Little
        }
    }

    pub fn swapped(self) -> Self {
        match self {
            Endian::Little => Endian::Big,
            Endian::Big => Endian::Little,
        }
    }
}

/// Width of an integer read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumWidth {
    Byte,
    Short,
    Long,
    Quad,
}

impl NumWidth {
    pub fn size(self) -> usize {
        match self {
            NumWidth::Byte => 1,
            NumWidth::Short => 2,
            NumWidth::Long => 4,
            NumWidth::Quad => 8,
        }
    }

    /// Keeps only the low `size()` bytes of `value`
    pub fn truncate(self, value: u64) -> u64 {
        match self {
            NumWidth::Quad => value,
            _ => value & ((1u64 << (self.size() * 8)) - 1),
        }
    }

    /// Sign-extends a value already truncated to this width
    pub fn sign_extend(self, value: u64) -> i64 {
        match self {
            NumWidth::Byte => value as u8 as i8 as i64,
            NumWidth::Short => value as u16 as i16 as i64,
            NumWidth::Long => value as u32 as i32 as i64,
            NumWidth::Quad => value as i64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatWidth {
    Single,
    Double,
}

impl FloatWidth {
    pub fn size(self) -> usize {
        match self {
            FloatWidth::Single => 4,
            FloatWidth::Double => 8,
        }
    }
}

/// Time zone used when rendering a date value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateStyle {
    Utc,
    Local,
}

/// Arithmetic applied to a value after it is read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    And,
    Or,
    Xor,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl ArithOp {
    pub fn from_symbol(symbol: char) -> Option<Self> {
        Some(match symbol {
            '&' => ArithOp::And,
            '|' => ArithOp::Or,
            '^' => ArithOp::Xor,
            '+' => ArithOp::Add,
            '-' => ArithOp::Sub,
            '*' => ArithOp::Mul,
            '/' => ArithOp::Div,
            '%' => ArithOp::Mod,
            _ => return None,
        })
    }

    /// Applies the operation; `None` on division by zero
    pub fn apply(self, value: u64, operand: u64) -> Option<u64> {
        Some(match self {
            ArithOp::And => value & operand,
            ArithOp::Or => value | operand,
            ArithOp::Xor => value ^ operand,
            ArithOp::Add => value.wrapping_add(operand),
            ArithOp::Sub => value.wrapping_sub(operand),
            ArithOp::Mul => value.wrapping_mul(operand),
            ArithOp::Div => value.checked_div(operand)?,
            ArithOp::Mod => value.checked_rem(operand)?,
        })
    }

    /// Signed variant used for indirect offset adjustment
    pub fn apply_signed(self, value: i64, operand: i64) -> Option<i64> {
        match self {
            ArithOp::And => Some(value & operand),
            ArithOp::Or => Some(value | operand),
            ArithOp::Xor => Some(value ^ operand),
            ArithOp::Add => value.checked_add(operand),
            ArithOp::Sub => value.checked_sub(operand),
            ArithOp::Mul => value.checked_mul(operand),
            ArithOp::Div => value.checked_div(operand),
            ArithOp::Mod => value.checked_rem(operand),
        }
    }
}

/// Comparison between the value read and the test value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Eq,
    Ne,
    Lt,
    Gt,
    /// `&`: every bit of the test value is set
    AllSet,
    /// `^`: at least one bit of the test value is clear
    AnyClear,
    /// `x`: any value
    Any,
}

/// Width of the integer read for an indirect offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndirectWidth {
    Byte,
    Short,
    Long,
    Quad,
    /// ID3 syncsafe 32-bit integer (7 bits per byte)
    Id3,
}

impl IndirectWidth {
    pub fn size(self) -> usize {
        match self {
            IndirectWidth::Byte => 1,
            IndirectWidth::Short => 2,
            IndirectWidth::Long | IndirectWidth::Id3 => 4,
            IndirectWidth::Quad => 8,
        }
    }
}

/// `(base.type op adjust)`: the offset is read from the input itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndirectOffset {
    pub base: i64,
    /// `(&base...)`: base is relative to the parent match end
    pub base_relative: bool,
    pub width: IndirectWidth,
    pub endian: Endian,
    pub signed: bool,
    pub adjust: Option<(ArithOp, i64)>,
    /// `&(...)`: the resolved offset is relative to the parent match end
    pub result_relative: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Offset {
    Absolute(u64),
    /// Counted back from the end of a complete input
    FromEnd(u64),
    /// Relative to the end of the parent's match
    Relative(i64),
    Indirect(Box<IndirectOffset>),
}

/// Modifiers for string-like tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StringFlags {
    /// `/c`: lowercase pattern characters match either case
    pub fold_lower: bool,
    /// `/C`: uppercase pattern characters match either case
    pub fold_upper: bool,
    /// `/w`: a blank in the pattern matches zero or more blanks
    pub optional_blanks: bool,
    /// `/W`: a blank in the pattern matches one or more blanks
    pub compact_blanks: bool,
    /// `/T`: trim whitespace from the rendered value
    pub trim: bool,
    /// `/s`: the match ends where it starts (search and regex)
    pub start_offset: bool,
    /// `/t` and `/b`: text or binary hint
    pub text: bool,
    pub binary: bool,
}

impl StringFlags {
    pub fn is_plain(&self) -> bool {
        !(self.fold_lower || self.fold_upper || self.optional_blanks || self.compact_blanks)
    }
}

/// Width and byte order of a `pstring` length prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PstringLen {
    Byte,
    Short(Endian),
    Long(Endian),
}

impl PstringLen {
    pub fn size(self) -> usize {
        match self {
            PstringLen::Byte => 1,
            PstringLen::Short(_) => 2,
            PstringLen::Long(_) => 4,
        }
    }
}

/// The closed set of test kinds a rule can carry
#[derive(Debug, Clone)]
pub enum TestKind {
    Numeric {
        width: NumWidth,
        endian: Endian,
        signed: bool,
        arith: Option<(ArithOp, u64)>,
        relation: Relation,
        value: u64,
    },
    Float {
        width: FloatWidth,
        endian: Endian,
        relation: Relation,
        value: f64,
    },
    Date {
        width: NumWidth,
        endian: Endian,
        style: DateStyle,
        arith: Option<(ArithOp, u64)>,
        relation: Relation,
        value: u64,
    },
    String {
        pattern: Vec<u8>,
        relation: Relation,
        flags: StringFlags,
    },
    Pstring {
        len: PstringLen,
        /// `/J`: the length prefix counts itself
        include_self: bool,
        pattern: Vec<u8>,
        relation: Relation,
        flags: StringFlags,
    },
    Search {
        pattern: Vec<u8>,
        range: usize,
        negate: bool,
        flags: StringFlags,
    },
    Regex {
        regex: Regex,
        range: usize,
        /// Range counts lines instead of bytes
        lines: bool,
        negate: bool,
        flags: StringFlags,
    },
    /// Matches when no sibling at its level has matched
    Default,
    /// Resets the sibling-matched state for `default`
    Clear,
    /// Heads a named rule tree; only valid at level 0
    Name(String),
    /// Evaluates a named rule tree at this offset
    Use { name: String, flip_endian: bool },
}

impl TestKind {
    /// Bytes the test reads past its offset when that is known statically
    pub fn static_len(&self) -> usize {
        use crate::types::STRING_MAX;

        match self {
            TestKind::Numeric { width, .. } | TestKind::Date { width, .. } => width.size(),
            TestKind::Float { width, .. } => width.size(),
            TestKind::String {
                pattern, relation, ..
            } => match relation {
                Relation::Eq | Relation::Ne => pattern.len(),
                _ => STRING_MAX.max(pattern.len()),
            },
            TestKind::Pstring { len, pattern, .. } => len.size() + STRING_MAX.max(pattern.len()),
            TestKind::Search { pattern, range, .. } => range.saturating_add(pattern.len()),
            TestKind::Regex { range, lines, .. } => {
                if *lines {
                    range.saturating_mul(crate::types::LONG_LINE_THRESHOLD)
                } else {
                    *range
                }
            }
            TestKind::Default | TestKind::Clear | TestKind::Name(_) | TestKind::Use { .. } => 0,
        }
    }

    pub fn relation(&self) -> Relation {
        match self {
            TestKind::Numeric { relation, .. }
            | TestKind::Float { relation, .. }
            | TestKind::Date { relation, .. }
            | TestKind::String { relation, .. }
            | TestKind::Pstring { relation, .. } => *relation,
            TestKind::Search { negate, .. } | TestKind::Regex { negate, .. } => {
                if *negate {
                    Relation::Ne
                } else {
                    Relation::Eq
                }
            }
            TestKind::Default
            | TestKind::Clear
            | TestKind::Name(_)
            | TestKind::Use { .. } => Relation::Any,
        }
    }
}

/// `!:strength` adjustment declared by the database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrengthAdjust {
    pub op: char,
    pub value: u32,
}

/// One signature rule and its continuation children
#[derive(Debug, Clone)]
pub struct SignatureRule {
    pub(crate) level: usize,
    pub(crate) line: usize,
    pub(crate) offset: Offset,
    pub(crate) test: TestKind,
    pub(crate) description: String,
    pub(crate) mime: Option<String>,
    pub(crate) extensions: Vec<String>,
    pub(crate) strength_adjust: Option<StrengthAdjust>,
    pub(crate) strength: u32,
    pub(crate) children: Vec<SignatureRule>,
}

impl SignatureRule {
    pub(crate) fn new(level: usize, line: usize, offset: Offset, test: TestKind) -> Self {
        Self {
            level,
            line,
            offset,
            test,
            description: String::new(),
            mime: None,
            extensions: Vec::new(),
            strength_adjust: None,
            strength: 0,
            children: Vec::new(),
        }
    }

    pub fn level(&self) -> usize {
        self.level
    }

    /// 1-based line of the rule in its source
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn offset(&self) -> &Offset {
        &self.offset
    }

    pub fn test(&self) -> &TestKind {
        &self.test
    }

    /// Description template, possibly with one printf-style conversion
    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn mime(&self) -> Option<&str> {
        self.mime.as_deref()
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn strength(&self) -> u32 {
        self.strength
    }

    pub fn children(&self) -> &[SignatureRule] {
        &self.children
    }

    /// Name of the tree this rule heads, for `name` rules
    pub fn name(&self) -> Option<&str> {
        match &self.test {
            TestKind::Name(name) => Some(name),
            _ => None,
        }
    }

    /// Total number of rules in this tree
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(SignatureRule::count).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_and_sign_extend() {
        assert_eq!(NumWidth::Byte.truncate(0x1ff), 0xff);
        assert_eq!(NumWidth::Byte.sign_extend(0xff), -1);
        assert_eq!(NumWidth::Short.sign_extend(0x7fff), 0x7fff);
        assert_eq!(NumWidth::Quad.truncate(u64::MAX), u64::MAX);
    }

    #[test]
    fn test_arith_division_by_zero() {
        assert_eq!(ArithOp::Div.apply(10, 0), None);
        assert_eq!(ArithOp::Mod.apply(10, 3), Some(1));
        assert_eq!(ArithOp::Sub.apply_signed(i64::MIN, 1), None);
    }
}
