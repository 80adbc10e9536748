//! Normalized URI wrapper.
//!
//! Spec §3 "URI normalization" and §9 design notes call this out as a
//! correctness property, not a convenience: two code paths in the source this
//! spec was distilled from forgot to normalize and produced duplicate shards.
//! `Uri`'s only constructor normalizes, so a caller cannot construct an
//! un-normalized key and hand it to the shard store or an inverted index.

use std::fmt;

/// A canonicalized source-file identifier.
///
/// Normalization: backslashes become forward slashes, and on
/// case-insensitive platforms (anything with a drive-letter prefix, i.e.
/// Windows-style paths) the drive letter is lowercased. The rest of the path
/// is left alone — symbol names and most path segments on these platforms
/// remain case-sensitive in practice, and over-aggressive lowercasing would
/// itself introduce collisions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Uri(String);

impl Uri {
    /// Constructs a `Uri` from any string-like input, normalizing it.
    pub fn new(raw: impl AsRef<str>) -> Self {
        Uri(normalize(raw.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The SHA-256 digest used to address this uri's shard blob on disk
    /// (§4.1, §6: `<root>/<h[0:2]>/<h[2:4]>/<h>.bin`).
    pub fn content_address(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        let digest = hasher.finalize();
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }
}

fn normalize(raw: &str) -> String {
    let slashed = raw.replace('\\', "/");

    // Detect a Windows-style drive prefix, optionally under a file:// scheme,
    // e.g. "file:///C:/foo" or "c:/foo", and lowercase just the drive letter.
    let (prefix_len, drive_idx) = if let Some(rest) = slashed.strip_prefix("file:///") {
        (8, drive_letter_index(rest))
    } else {
        (0, drive_letter_index(&slashed))
    };

    match drive_idx {
        Some(idx) => {
            let abs_idx = prefix_len + idx;
            let mut out = String::with_capacity(slashed.len());
            out.push_str(&slashed[..abs_idx]);
            out.push_str(&slashed[abs_idx..abs_idx + 1].to_ascii_lowercase());
            out.push_str(&slashed[abs_idx + 1..]);
            out
        }
        None => slashed,
    }
}

/// Returns the index of the drive letter if `s` looks like `X:/...` or `X:\...`.
fn drive_letter_index(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    if bytes.len() >= 3 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && bytes[2] == b'/' {
        Some(0)
    } else {
        None
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Uri {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Uri {
    fn from(s: &str) -> Self {
        Uri::new(s)
    }
}

impl From<String> for Uri {
    fn from(s: String) -> Self {
        Uri::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backslashes_become_forward_slashes() {
        let a = Uri::new(r"C:\proj\src\a.rs");
        let b = Uri::new("c:/proj/src/a.rs");
        assert_eq!(a, b);
    }

    #[test]
    fn drive_letter_is_lowercased_but_path_case_preserved() {
        let uri = Uri::new(r"D:\Proj\Src\A.rs");
        assert_eq!(uri.as_str(), "d:/Proj/Src/A.rs");
    }

    #[test]
    fn file_scheme_drive_letter_is_lowercased() {
        let uri = Uri::new("file:///C:/proj/a.rs");
        assert_eq!(uri.as_str(), "file:///c:/proj/a.rs");
    }

    #[test]
    fn non_windows_paths_are_unaffected() {
        let uri = Uri::new("file:///home/user/Project/A.rs");
        assert_eq!(uri.as_str(), "file:///home/user/Project/A.rs");
    }

    #[test]
    fn equal_after_normalization_have_equal_content_address() {
        let a = Uri::new(r"C:\proj\a.rs");
        let b = Uri::new("c:/proj/a.rs");
        assert_eq!(a.content_address(), b.content_address());
    }

    #[test]
    fn distinct_uris_normalize_to_distinct_addresses() {
        let a = Uri::new("file:///a.rs");
        let b = Uri::new("file:///b.rs");
        assert_ne!(a.content_address(), b.content_address());
    }
}
