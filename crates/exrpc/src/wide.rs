//! UTF-16 strings in the RPC runtime's wire character encoding

use std::fmt;

/// Owned UTF-16 string without terminator
#[derive(Clone, Default, PartialEq, Eq)]
pub struct WideString(Vec<u16>);

impl WideString {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn as_slice(&self) -> &[u16] {
        &self.0
    }

    /// Length in UTF-16 code units
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf16_lossy(&self.0)
    }

    /// Overwrite the buffer with zeros, then empty it
    pub fn wipe(&mut self) {
        for unit in self.0.iter_mut() {
            // SAFETY: `unit` is a valid, aligned &mut u16
            unsafe { std::ptr::write_volatile(unit, 0) };
        }
        self.0.clear();
    }
}

impl From<&str> for WideString {
    fn from(s: &str) -> Self {
        Self(s.encode_utf16().collect())
    }
}

impl fmt::Debug for WideString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_string_lossy())
    }
}

impl fmt::Display for WideString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}
