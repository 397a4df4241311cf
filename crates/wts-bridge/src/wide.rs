//! UTF-16 string helpers and fixed-capacity wide buffers.

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Encode a Rust string as a null-terminated wide string.
pub fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0u16)).collect()
}

/// Decode UTF-16 up to the first NUL (or the end of the slice).
pub fn from_wide(units: &[u16]) -> String {
    let end = units.iter().position(|&c| c == 0).unwrap_or(units.len());
    String::from_utf16_lossy(&units[..end])
}

/// Decode a null-terminated wide string pointer to a Rust String.
///
/// # Safety
/// `ptr` must be null or a valid, null-terminated UTF-16 string pointer.
pub unsafe fn from_wide_ptr(ptr: *const u16) -> String {
    if ptr.is_null() {
        return String::new();
    }
    let mut len = 0usize;
    while *ptr.add(len) != 0 {
        len += 1;
    }
    String::from_utf16_lossy(std::slice::from_raw_parts(ptr, len))
}

/// A fixed-capacity UTF-16 buffer with an explicit length, mirroring the
/// `WCHAR name[N]` fields of the WTS structures.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct WideBuf<const N: usize> {
    units: [u16; N],
    len: usize,
}

impl<const N: usize> WideBuf<N> {
    pub const CAPACITY: usize = N;

    pub const fn new() -> Self {
        Self { units: [0; N], len: 0 }
    }

    /// Copy a native field; the content ends at the first NUL.
    pub fn from_units(raw: &[u16; N]) -> Self {
        let len = raw.iter().position(|&c| c == 0).unwrap_or(N);
        Self { units: *raw, len }.normalized()
    }

    /// Encode `s`; `None` when it does not fit in `N` units.
    pub fn from_str_checked(s: &str) -> Option<Self> {
        let mut units = [0u16; N];
        let mut len = 0;
        for unit in s.encode_utf16() {
            if unit == 0 {
                break;
            }
            *units.get_mut(len)? = unit;
            len += 1;
        }
        Some(Self { units, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The content, without the terminator.
    pub fn as_units(&self) -> &[u16] {
        &self.units[..self.len]
    }

    /// The full native array, zero-padded after the content.
    pub fn to_native(&self) -> [u16; N] {
        self.units
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf16_lossy(self.as_units())
    }

    fn normalized(mut self) -> Self {
        self.units[self.len..].iter_mut().for_each(|c| *c = 0);
        self
    }
}

impl<const N: usize> Default for WideBuf<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Debug for WideBuf<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_string_lossy())
    }
}

impl<const N: usize> fmt::Display for WideBuf<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl<const N: usize> Serialize for WideBuf<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string_lossy())
    }
}

impl<'de, const N: usize> Deserialize<'de> for WideBuf<N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str_checked(&s).ok_or_else(|| {
            de::Error::custom(format!("string exceeds {} UTF-16 units", N))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_wide_is_null_terminated() {
        assert_eq!(to_wide("ab"), vec![b'a' as u16, b'b' as u16, 0]);
        assert_eq!(to_wide(""), vec![0]);
    }

    #[test]
    fn from_wide_stops_at_nul() {
        let units = [b'R' as u16, b'D' as u16, b'P' as u16, 0, b'x' as u16];
        assert_eq!(from_wide(&units), "RDP");
        assert_eq!(from_wide(&units[..2]), "RD");
    }

    #[test]
    fn from_wide_ptr_handles_null() {
        assert_eq!(unsafe { from_wide_ptr(std::ptr::null()) }, "");
        let w = to_wide("console");
        assert_eq!(unsafe { from_wide_ptr(w.as_ptr()) }, "console");
    }

    #[test]
    fn wide_buf_from_units_drops_garbage_after_nul() {
        let mut raw = [0u16; 8];
        raw[..3].copy_from_slice(&[b'a' as u16, b'b' as u16, 0]);
        raw[5] = b'z' as u16;
        let buf = WideBuf::<8>::from_units(&raw);
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.to_string_lossy(), "ab");
        assert_eq!(buf.to_native()[5], 0);
    }

    #[test]
    fn wide_buf_full_without_terminator() {
        let raw = [b'x' as u16; 4];
        let buf = WideBuf::<4>::from_units(&raw);
        assert_eq!(buf.len(), 4);
        assert_eq!(buf.to_string(), "xxxx");
    }

    #[test]
    fn wide_buf_rejects_overflow() {
        assert!(WideBuf::<3>::from_str_checked("abc").is_some());
        assert!(WideBuf::<3>::from_str_checked("abcd").is_none());
    }

    #[test]
    fn wide_buf_serde_as_string() {
        let buf = WideBuf::<21>::from_str_checked("alice").unwrap();
        let json = serde_json::to_string(&buf).unwrap();
        assert_eq!(json, "\"alice\"");
        let back: WideBuf<21> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, buf);
        assert!(serde_json::from_str::<WideBuf<2>>("\"abc\"").is_err());
    }
}
