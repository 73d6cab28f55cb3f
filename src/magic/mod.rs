//! Magic database: rule model, text parser, strength scoring and the store

mod parser;
pub mod rule;
mod store;
mod strength;

pub use rule::{
    ArithOp, DateStyle, Endian, FloatWidth, IndirectOffset, IndirectWidth, NumWidth, Offset,
    PstringLen, Relation, SignatureRule, StrengthAdjust, StringFlags, TestKind,
};
pub use store::{MagicSource, SignatureStore, load_signature_store};
