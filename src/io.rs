use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::types::{MatchKind, MatchResult};

/// Display name used for standard input
pub const STDIN_NAME: &str = "/dev/stdin";

/// Read-only prefix of an input, bounded by the capture limit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputBuffer {
    data: Bytes,
    complete: bool,
}

impl InputBuffer {
    /// `complete` records whether `data` is the whole input rather than a prefix
    pub fn new(data: impl Into<Bytes>, complete: bool) -> Self {
        Self {
            data: data.into(),
            complete,
        }
    }

    /// A buffer holding a whole in-memory input
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(bytes), true)
    }

    /// The first `limit` bytes of an in-memory input
    pub fn prefix(bytes: &[u8], limit: usize) -> Self {
        let len = bytes.len().min(limit);
        Self::new(Bytes::copy_from_slice(&bytes[..len]), bytes.len() <= limit)
    }

    /// Reads at most `limit` bytes from `reader`. Nothing past the limit is
    /// ever requested from the reader.
    pub fn capture<R: Read>(reader: R, limit: usize) -> io::Result<Self> {
        let mut data = Vec::with_capacity(limit.min(64 * 1024));
        reader.take(limit as u64).read_to_end(&mut data)?;
        let complete = data.len() < limit;
        Ok(Self::new(data, complete))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether the buffer holds the entire input, so offsets counted from
    /// the end can be resolved
    pub fn is_complete(&self) -> bool {
        self.complete
    }
}

impl AsRef<[u8]> for InputBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

/// One input named on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    Path(PathBuf),
    Stdin,
}

impl Subject {
    /// `-` means standard input; anything else is a path
    pub fn parse(arg: &str) -> Self {
        if arg == "-" {
            Subject::Stdin
        } else {
            Subject::Path(PathBuf::from(arg))
        }
    }

    pub fn display_name(&self) -> String {
        match self {
            Subject::Path(path) => path.display().to_string(),
            Subject::Stdin => STDIN_NAME.to_string(),
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}

impl From<PathBuf> for Subject {
    fn from(path: PathBuf) -> Self {
        Subject::Path(path)
    }
}

fn special(description: impl Into<String>, mime: &str) -> Option<MatchResult> {
    Some(MatchResult::new(MatchKind::Special, description).with_mime(mime))
}

/// Describes `path` from its metadata when it is not a regular file.
/// Returns `None` for regular files, whose content must be sniffed.
pub fn special_file(path: &Path, dereference: bool) -> io::Result<Option<MatchResult>> {
    let link = fs::symlink_metadata(path)?;
    let metadata = if dereference && link.file_type().is_symlink() {
        match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                let target = fs::read_link(path)?;
                return Ok(special(
                    format!("broken symbolic link to {}", target.display()),
                    "inode/symlink",
                ));
            }
            Err(err) => return Err(err),
        }
    } else {
        link
    };

    let file_type = metadata.file_type();
    if file_type.is_symlink() {
        let target = fs::read_link(path)?;
        return Ok(special(
            format!("symbolic link to {}", target.display()),
            "inode/symlink",
        ));
    }
    if file_type.is_dir() {
        return Ok(special("directory", "inode/directory"));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;

        if file_type.is_fifo() {
            return Ok(special("fifo (named pipe)", "inode/fifo"));
        }
        if file_type.is_socket() {
            return Ok(special("socket", "inode/socket"));
        }
        if file_type.is_char_device() {
            return Ok(special("character special", "inode/chardevice"));
        }
        if file_type.is_block_device() {
            return Ok(special("block special", "inode/blockdevice"));
        }
    }

    Ok(None)
}
