//! sift: file content-type identification from magic signature rules
//!
//! ```
//! use sift::{Options, SignatureStore, format, identify};
//!
//! let store = SignatureStore::builtin().unwrap();
//! let result = identify(&store, b"\x89PNG\r\n\x1a\n");
//! assert!(format(&result, &Options::default()).starts_with("PNG image data"));
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod format;
pub mod heuristics;
pub mod io;
pub mod magic;
pub mod sniffer;
pub mod types;

pub use batch::{Report, identify_all, identify_batch, identify_reader, identify_subject};
pub use config::Options;
pub use error::{IdentifyError, LoadError, Location};
pub use format::format;
pub use heuristics::{Encoding, classify, detect_encoding};
pub use io::{InputBuffer, Subject};
pub use magic::{MagicSource, SignatureRule, SignatureStore, load_signature_store};
pub use sniffer::{Sniffer, identify};
pub use types::{MatchKind, MatchResult};
