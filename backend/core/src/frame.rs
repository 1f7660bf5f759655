//! Published frames and ETag minting.

use std::fmt::Write as _;

use bytes::Bytes;
use sha1::{Digest, Sha1};

/// The latest captured image for a view. Immutable once published; at most
/// one current frame exists per view.
#[derive(Debug, Clone)]
pub struct Frame {
    pub png: Bytes,
    pub etag: String,
    pub ts: i64,
}

impl Frame {
    /// Build a frame, minting the quoted SHA-1 ETag of the PNG bytes.
    pub fn new(png: Vec<u8>, ts: i64) -> Self {
        let etag = quoted_sha1(&png);
        Self {
            png: Bytes::from(png),
            etag,
            ts,
        }
    }
}

/// Quoted lowercase SHA-1 hex digest, the HTTP ETag form.
pub fn quoted_sha1(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut etag = String::with_capacity(42);
    etag.push('"');
    for byte in digest {
        let _ = write!(etag, "{byte:02x}");
    }
    etag.push('"');
    etag
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn etag_is_quoted_sha1_hex() {
        let frame = Frame::new(vec![0x89, 0x50, 0x4e, 0x47], 1);
        assert_eq!(frame.etag.len(), 42);
        assert!(frame.etag.starts_with('"') && frame.etag.ends_with('"'));
        assert!(frame.etag[1..41].chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(frame.etag, quoted_sha1(&frame.png));
    }

    #[test]
    fn etag_tracks_content() {
        let a = Frame::new(vec![1, 2, 3], 1);
        let b = Frame::new(vec![1, 2, 3], 2);
        let c = Frame::new(vec![1, 2, 4], 3);
        assert_eq!(a.etag, b.etag);
        assert_ne!(a.etag, c.etag);
    }

    #[test]
    fn known_digest() {
        // sha1("") = da39a3ee5e6b4b0d3255bfef95601890afd80709
        assert_eq!(
            quoted_sha1(b""),
            "\"da39a3ee5e6b4b0d3255bfef95601890afd80709\""
        );
    }
}
