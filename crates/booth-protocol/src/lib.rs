//! Line protocol used by the photobooth to announce new pictures.
//!
//! Every notification travels on its own TCP connection as one UTF-8 line:
//! the picture identifier followed by `\n`. There is no framing beyond the
//! newline and the receiver never answers.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// Port the slideshow station listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 5817;

/// Upper bound on the bytes read from a single notification connection.
pub const MAX_MESSAGE_LEN: usize = 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("notification is not valid UTF-8")]
    InvalidUtf8,

    #[error("notification is empty")]
    Empty,

    #[error("notification exceeds {MAX_MESSAGE_LEN} bytes")]
    TooLong,

    #[error("picture identifier must be a relative path without '..': {0}")]
    NotRelative(String),

    #[error("picture identifier contains a control character")]
    ControlCharacter,
}

/// Identifier of a picture relative to the shared picture directory.
///
/// Always `/`-separated, never absolute and never escaping the directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PictureId(String);

impl PictureId {
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        if raw.is_empty() {
            return Err(ProtocolError::Empty);
        }
        if raw.chars().any(char::is_control) {
            return Err(ProtocolError::ControlCharacter);
        }
        if raw.starts_with('/') || raw.starts_with('\\') {
            return Err(ProtocolError::NotRelative(raw.to_string()));
        }
        let escapes = raw
            .split(['/', '\\'])
            .any(|segment| segment == "..");
        if escapes {
            return Err(ProtocolError::NotRelative(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    /// Build an identifier from `path` relative to `root`.
    pub fn relative_to(path: &Path, root: &Path) -> Result<Self, ProtocolError> {
        let relative = path
            .strip_prefix(root)
            .map_err(|_| ProtocolError::NotRelative(path.display().to_string()))?;
        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(segment) => segments.push(
                    segment
                        .to_str()
                        .ok_or(ProtocolError::InvalidUtf8)?
                        .to_string(),
                ),
                Component::CurDir => {}
                _ => return Err(ProtocolError::NotRelative(path.display().to_string())),
            }
        }
        Self::parse(&segments.join("/"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Absolute location of the picture under `root`.
    pub fn resolve(&self, root: &Path) -> PathBuf {
        self.0
            .split('/')
            .filter(|segment| !segment.is_empty() && *segment != ".")
            .fold(root.to_path_buf(), |acc, segment| acc.join(segment))
    }
}

impl fmt::Display for PictureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bytes written on the wire for one notification.
pub fn encode_notification(id: &PictureId) -> Vec<u8> {
    let mut line = Vec::with_capacity(id.0.len() + 1);
    line.extend_from_slice(id.0.as_bytes());
    line.push(b'\n');
    line
}

/// Decode the bytes received on one connection.
///
/// Trailing whitespace (including the terminating newline) is stripped and
/// the payload must be strict UTF-8.
pub fn decode_notification(buf: &[u8]) -> Result<PictureId, ProtocolError> {
    if buf.len() > MAX_MESSAGE_LEN {
        return Err(ProtocolError::TooLong);
    }
    let text = std::str::from_utf8(buf).map_err(|_| ProtocolError::InvalidUtf8)?;
    PictureId::parse(text.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_plain_line() {
        let id = decode_notification(b"12-30-00_Photomaton.jpeg\n").unwrap();
        assert_eq!(id.as_str(), "12-30-00_Photomaton.jpeg");
    }

    #[test]
    fn strips_trailing_whitespace_only() {
        let id = decode_notification(b"2024-05-01_Photomaton/10-00-00_Photomaton.jpeg \r\n\t").unwrap();
        assert_eq!(id.as_str(), "2024-05-01_Photomaton/10-00-00_Photomaton.jpeg");
    }

    #[test]
    fn rejects_invalid_utf8() {
        assert_eq!(
            decode_notification(&[0x66, 0xff, 0xfe, b'\n']),
            Err(ProtocolError::InvalidUtf8)
        );
    }

    #[test]
    fn rejects_blank_messages() {
        assert_eq!(decode_notification(b" \n"), Err(ProtocolError::Empty));
        assert_eq!(decode_notification(b""), Err(ProtocolError::Empty));
    }

    #[test]
    fn rejects_oversized_messages() {
        let buf = vec![b'a'; MAX_MESSAGE_LEN + 1];
        assert_eq!(decode_notification(&buf), Err(ProtocolError::TooLong));
    }

    #[test]
    fn rejects_paths_escaping_the_directory() {
        assert!(matches!(
            PictureId::parse("../etc/passwd"),
            Err(ProtocolError::NotRelative(_))
        ));
        assert!(matches!(
            PictureId::parse("/etc/passwd"),
            Err(ProtocolError::NotRelative(_))
        ));
        assert!(matches!(
            PictureId::parse("a/../../b.jpeg"),
            Err(ProtocolError::NotRelative(_))
        ));
        assert_eq!(
            PictureId::parse("a\u{0}b"),
            Err(ProtocolError::ControlCharacter)
        );
    }

    #[test]
    fn encode_appends_newline() {
        let id = PictureId::parse("d/12-00-00_Photomaton.jpeg").unwrap();
        assert_eq!(encode_notification(&id), b"d/12-00-00_Photomaton.jpeg\n".to_vec());
        assert_eq!(decode_notification(&encode_notification(&id)).unwrap(), id);
    }

    #[test]
    fn relative_to_uses_forward_slashes() {
        let root = Path::new("/srv/booth");
        let path = root.join("2024-05-01_Photomaton").join("10-00-00_Photomaton.jpeg");
        let id = PictureId::relative_to(&path, root).unwrap();
        assert_eq!(id.as_str(), "2024-05-01_Photomaton/10-00-00_Photomaton.jpeg");
        assert_eq!(id.resolve(Path::new("/mnt/show")), Path::new("/mnt/show").join("2024-05-01_Photomaton").join("10-00-00_Photomaton.jpeg"));
    }

    #[test]
    fn relative_to_rejects_foreign_roots() {
        let err = PictureId::relative_to(Path::new("/other/a.jpeg"), Path::new("/srv/booth"));
        assert!(matches!(err, Err(ProtocolError::NotRelative(_))));
    }
}
