//! Batch identification
//!
//! Each input is captured and sniffed independently; a failure to read one
//! input is reported for that input and never stops the others.

use std::fs::File;
use std::io::{self, Read};

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::config::Options;
use crate::error::IdentifyError;
use crate::io::{InputBuffer, Subject, special_file};
use crate::magic::SignatureStore;
use crate::sniffer::Sniffer;
use crate::types::MatchResult;

/// Outcome for one input of a batch
#[derive(Debug)]
pub struct Report {
    pub name: String,
    pub outcome: Result<MatchResult, IdentifyError>,
}

impl Report {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Captures a bounded prefix from `reader` and identifies it
pub fn identify_reader<R: Read>(
    reader: R,
    store: &SignatureStore,
    options: &Options,
) -> io::Result<MatchResult> {
    let buffer = InputBuffer::capture(reader, options.capture_limit(store))?;
    Ok(Sniffer::with_options(store, options).identify(&buffer))
}

/// Identifies one input named on the command line
pub fn identify_subject(
    subject: &Subject,
    store: &SignatureStore,
    options: &Options,
) -> Result<MatchResult, IdentifyError> {
    let name = subject.display_name();
    let read_error = |source| IdentifyError::Read {
        name: name.clone(),
        source,
    };

    match subject {
        Subject::Stdin => identify_reader(io::stdin().lock(), store, options).map_err(read_error),
        Subject::Path(path) => {
            let open_error = |source| IdentifyError::Open {
                name: name.clone(),
                source,
            };
            if let Some(result) = special_file(path, options.dereference).map_err(open_error)? {
                return Ok(result);
            }
            let file = File::open(path).map_err(open_error)?;
            identify_reader(file, store, options).map_err(read_error)
        }
    }
}

/// Identifies every subject in parallel; reports come back in input order
pub fn identify_all(subjects: &[Subject], store: &SignatureStore, options: &Options) -> Vec<Report> {
    identify_batch(subjects, io::stdin(), store, options)
}

/// Like [`identify_all`], with `stdin` standing in for standard input.
///
/// Standard input is captured once, before the parallel map, and every `-`
/// in `subjects` sees that same capture.
pub fn identify_batch<R: Read>(
    subjects: &[Subject],
    stdin: R,
    store: &SignatureStore,
    options: &Options,
) -> Vec<Report> {
    debug!(inputs = subjects.len(), "identifying batch");

    let captured = subjects
        .contains(&Subject::Stdin)
        .then(|| InputBuffer::capture(stdin, options.capture_limit(store)));

    subjects
        .par_iter()
        .map(|subject| {
            let outcome = match (subject, &captured) {
                (Subject::Stdin, Some(capture)) => identify_captured(subject, capture, store, options),
                _ => identify_subject(subject, store, options),
            };
            if let Err(err) = &outcome {
                warn!(input = %subject, error = %err, "input could not be read");
            }
            Report {
                name: subject.display_name(),
                outcome,
            }
        })
        .collect()
}

fn identify_captured(
    subject: &Subject,
    capture: &io::Result<InputBuffer>,
    store: &SignatureStore,
    options: &Options,
) -> Result<MatchResult, IdentifyError> {
    match capture {
        Ok(buffer) => Ok(Sniffer::with_options(store, options).identify(buffer)),
        Err(err) => Err(IdentifyError::Read {
            name: subject.display_name(),
            source: io::Error::new(err.kind(), err.to_string()),
        }),
    }
}
