//! Version strings accepted when registering a package version

use crate::{Error, Result};
use std::fmt;

/// A validated version: dotted numeric release (`1`, `2.9.12`), optionally
/// followed by a pre-release (`a1`, `b2`, `rc1`), `.postN` and `.devN`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Version(String);

impl Version {
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = || Error::InvalidVersion(input.to_string());

        let mut rest = take_number(input).ok_or_else(invalid)?;
        while let Some(tail) = rest.strip_prefix('.') {
            match take_number(tail) {
                Some(after) => rest = after,
                // `.post` / `.dev` suffixes start with a dot too
                None => break,
            }
        }

        for pre in ["rc", "a", "b"] {
            if let Some(tail) = rest.strip_prefix(pre) {
                rest = take_number(tail).ok_or_else(invalid)?;
                break;
            }
        }
        if let Some(tail) = rest.strip_prefix(".post") {
            rest = take_number(tail).ok_or_else(invalid)?;
        }
        if let Some(tail) = rest.strip_prefix(".dev") {
            rest = take_number(tail).ok_or_else(invalid)?;
        }

        if !rest.is_empty() {
            return Err(invalid());
        }
        Ok(Version(input.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Strip a non-empty run of digits, returning what follows it
fn take_number(s: &str) -> Option<&str> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if end == 0 {
        None
    } else {
        Some(&s[end..])
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_versions() {
        for v in ["1", "2.9.12", "1.0a1", "1.0rc2", "3.1.post4", "0.1.dev7", "1.2b3.post1.dev2"] {
            assert!(Version::parse(v).is_ok(), "{}", v);
        }
    }

    #[test]
    fn test_invalid_versions() {
        for v in ["", "2.9.12.2error", "1..2", ".1", "1.", "v1.0", "1.0rc", "1.0.post"] {
            let err = Version::parse(v).unwrap_err();
            assert!(err.to_string().contains("Invalid version format"), "{}", v);
        }
    }
}
