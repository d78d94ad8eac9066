use std::fmt;

use crate::error::{Error, Result};

/// Upper bound on matches collected by [`Signature::find_all`].
pub const MAX_MATCHES: usize = 1000;

/// A byte pattern with wildcards, e.g. `"48 8D 3D ? ? ? ? E8"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub bytes: Vec<Option<u8>>,
    /// Added to the match address.
    pub offset: i64,
    /// The adjusted address holds a 32-bit displacement relative to the next instruction.
    pub relative: bool,
}

impl Signature {
    pub fn parse(pattern: &str) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidSignature {
            pattern: pattern.to_string(),
            reason,
        };

        let mut bytes = Vec::new();
        for token in pattern.split_whitespace() {
            if token.chars().all(|c| c == '?') && token.len() <= 2 {
                bytes.push(None);
                continue;
            }
            if token.len() != 2 || !token.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(invalid(format!("token \"{}\" is not a byte", token)));
            }
            let byte = u8::from_str_radix(token, 16)
                .map_err(|e| invalid(format!("token \"{}\": {}", token, e)))?;
            bytes.push(Some(byte));
        }

        if bytes.is_empty() {
            return Err(invalid("pattern is empty".into()));
        }
        if bytes.iter().all(Option::is_none) {
            return Err(invalid("pattern has no concrete bytes".into()));
        }

        Ok(Self {
            bytes,
            offset: 0,
            relative: false,
        })
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    pub fn relative(mut self, relative: bool) -> Self {
        self.relative = relative;
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn matches_at(&self, haystack: &[u8], at: usize) -> bool {
        let Some(window) = haystack.get(at..at + self.bytes.len()) else {
            return false;
        };
        window
            .iter()
            .zip(&self.bytes)
            .all(|(b, p)| p.map_or(true, |p| p == *b))
    }

    pub fn find_in(&self, haystack: &[u8]) -> Option<usize> {
        if haystack.len() < self.bytes.len() {
            return None;
        }
        (0..=haystack.len() - self.bytes.len()).find(|&i| self.matches_at(haystack, i))
    }

    pub fn find_all(&self, haystack: &[u8]) -> Vec<usize> {
        let mut results = Vec::new();
        if haystack.len() < self.bytes.len() {
            return results;
        }
        let mut i = 0;
        while i <= haystack.len() - self.bytes.len() && results.len() < MAX_MATCHES {
            if self.matches_at(haystack, i) {
                results.push(i);
            }
            i += 1;
        }
        results
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.bytes.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            match byte {
                Some(b) => write!(f, "{:02X}", b)?,
                None => f.write_str("?")?,
            }
        }
        Ok(())
    }
}
