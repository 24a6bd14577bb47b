//! MOO strings
//!
//! MOO strings are binary-transparent byte sequences: `length`, indexing and
//! ranges count bytes, and `decode_binary` may produce bytes that are not
//! valid UTF-8. `MooStr` wraps the bytes in an `Arc` so cloning a string
//! value is O(1); all mutation paths build a fresh buffer.
//!
//! Where a printable 7-bit representation is required (snapshots, the
//! `encode_binary` builtin), bytes outside the printable ASCII range use the
//! conventional `~HH` escape.

use std::fmt;
use std::sync::Arc;

/// An immutable, cheaply-cloneable byte string.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MooStr(Arc<Vec<u8>>);

impl MooStr {
    pub fn new() -> Self {
        MooStr(Arc::new(Vec::new()))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        MooStr(Arc::new(bytes))
    }

    pub fn from_str(s: &str) -> Self {
        MooStr(Arc::new(s.as_bytes().to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Byte length; this is what the `length` builtin reports.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The string as UTF-8 if it happens to be valid UTF-8.
    pub fn try_as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    /// Lossy UTF-8 rendering, for logs and player output.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }

    /// ASCII-case-insensitive comparison, used for property and verb name
    /// matching (never for value equality, which is byte-wise).
    pub fn eq_ignore_ascii_case(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other.as_bytes())
    }

    /// Encode with `~HH` escapes: printable ASCII passes through, space and
    /// everything else (including `~` itself) escapes to `~` + two hex
    /// digits. Inverse of [`MooStr::decode_binary`].
    pub fn encode_binary(&self) -> MooStr {
        let mut out = Vec::with_capacity(self.0.len());
        for &b in self.0.iter() {
            if (0x21..=0x7e).contains(&b) && b != b'~' {
                out.push(b);
            } else if b == b' ' {
                out.push(b);
            } else {
                out.push(b'~');
                out.extend_from_slice(format!("{b:02X}").as_bytes());
            }
        }
        MooStr::from_bytes(out)
    }

    /// Decode `~HH` escapes. A `~` not followed by two hex digits is an
    /// error (the caller raises E_INVARG).
    pub fn decode_binary(&self) -> Result<MooStr, ()> {
        let bytes = &self.0;
        let mut out = Vec::with_capacity(bytes.len());
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'~' {
                if i + 3 > bytes.len() {
                    return Err(());
                }
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).map_err(|_| ())?;
                let b = u8::from_str_radix(hex, 16).map_err(|_| ())?;
                out.push(b);
                i += 3;
            } else {
                out.push(bytes[i]);
                i += 1;
            }
        }
        Ok(MooStr::from_bytes(out))
    }
}

impl Default for MooStr {
    fn default() -> Self {
        MooStr::new()
    }
}

impl fmt::Debug for MooStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MooStr({:?})", self.to_string_lossy())
    }
}

impl fmt::Display for MooStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_lossy())
    }
}

impl From<&str> for MooStr {
    fn from(s: &str) -> Self {
        MooStr::from_str(s)
    }
}

impl From<String> for MooStr {
    fn from(s: String) -> Self {
        MooStr(Arc::new(s.into_bytes()))
    }
}
