//! Package addresses: `[team:]owner/package[/sub/path][:kind:value]`

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Why an address string was rejected
#[derive(Error, Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressErrorKind {
    #[error("Invalid team name")]
    InvalidTeamName,
    #[error("Invalid user name")]
    InvalidUserName,
    #[error("Invalid package name")]
    InvalidPackageName,
    #[error("Invalid element in subpath")]
    InvalidSubpathElement,
    #[error("Subpath not allowed, specify package as owner/package_name")]
    SubpathNotAllowed,
    #[error("Only one of hash, version or tag may be given")]
    ConflictingSelector,
    #[error("Unknown selector keyword")]
    UnknownSelectorKeyword,
    #[error("Specify package as owner/package_name")]
    Malformed,
}

/// Identifies one installed package: the unit of removal and of the
/// on-disk record
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PackageKey {
    pub team: Option<String>,
    pub owner: String,
    pub package: String,
}

impl PackageKey {
    pub fn new(team: Option<&str>, owner: &str, package: &str) -> Self {
        PackageKey {
            team: team.map(str::to_string),
            owner: owner.to_string(),
            package: package.to_string(),
        }
    }
}

impl fmt::Display for PackageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(team) = &self.team {
            write!(f, "{}:", team)?;
        }
        write!(f, "{}/{}", self.owner, self.package)
    }
}

/// Which kind of selector narrows an address to one instance
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectorKind {
    Hash,
    Version,
    Tag,
}

impl SelectorKind {
    /// Long keyword used in address strings
    pub fn keyword(&self) -> &'static str {
        match self {
            SelectorKind::Hash => "hash",
            SelectorKind::Version => "version",
            SelectorKind::Tag => "tag",
        }
    }

    fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "h" | "hash" => Some(SelectorKind::Hash),
            "v" | "version" => Some(SelectorKind::Version),
            "t" | "tag" => Some(SelectorKind::Tag),
            _ => None,
        }
    }
}

/// A hash prefix, version or tag qualifying an address
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Selector {
    Hash(String),
    Version(String),
    Tag(String),
}

impl Selector {
    pub fn new(kind: SelectorKind, value: impl Into<String>) -> Self {
        let value = value.into();
        match kind {
            SelectorKind::Hash => Selector::Hash(value.to_ascii_lowercase()),
            SelectorKind::Version => Selector::Version(value),
            SelectorKind::Tag => Selector::Tag(value),
        }
    }

    pub fn kind(&self) -> SelectorKind {
        match self {
            Selector::Hash(_) => SelectorKind::Hash,
            Selector::Version(_) => SelectorKind::Version,
            Selector::Tag(_) => SelectorKind::Tag,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Selector::Hash(v) | Selector::Version(v) | Selector::Tag(v) => v,
        }
    }
}

/// A parsed package specifier
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageAddress {
    pub team: Option<String>,
    pub owner: String,
    pub package: String,
    pub subpath: Vec<String>,
    pub selector: Option<Selector>,
}

impl PackageAddress {
    /// Parse an address string.
    ///
    /// A team prefix is recognised by a `:` that comes before the first `/`.
    /// Whatever follows the first `:` after that is the selector.
    pub fn parse(spec: &str, allow_subpath: bool) -> Result<Self> {
        let (team, rest) = match (spec.find(':'), spec.find('/')) {
            (Some(colon), Some(slash)) if colon < slash => {
                (Some(&spec[..colon]), &spec[colon + 1..])
            }
            (Some(colon), None) => (Some(&spec[..colon]), &spec[colon + 1..]),
            _ => (None, spec),
        };

        if let Some(team) = team {
            if !is_valid_team(team) {
                return Err(Error::address(AddressErrorKind::InvalidTeamName, spec));
            }
        }

        let (path, selector) = match rest.split_once(':') {
            Some((path, selector)) => (path, Some(selector)),
            None => (rest, None),
        };

        let mut parts = path.split('/');
        let (owner, package) = match (parts.next(), parts.next()) {
            (Some(owner), Some(package)) => (owner, package),
            _ => return Err(Error::address(AddressErrorKind::Malformed, spec)),
        };
        if !is_valid_identifier(owner) {
            return Err(Error::address(AddressErrorKind::InvalidUserName, spec));
        }
        if !is_valid_identifier(package) {
            return Err(Error::address(AddressErrorKind::InvalidPackageName, spec));
        }

        let subpath: Vec<String> = parts.map(str::to_string).collect();
        if !subpath.is_empty() && !allow_subpath {
            return Err(Error::address(AddressErrorKind::SubpathNotAllowed, spec));
        }
        if subpath.iter().any(|element| !is_valid_identifier(element)) {
            return Err(Error::address(
                AddressErrorKind::InvalidSubpathElement,
                spec,
            ));
        }

        let selector = selector
            .map(|s| parse_selector(s, spec))
            .transpose()?;

        Ok(PackageAddress {
            team: team.map(str::to_string),
            owner: owner.to_string(),
            package: package.to_string(),
            subpath,
            selector,
        })
    }

    /// The record key this address belongs to
    pub fn key(&self) -> PackageKey {
        PackageKey {
            team: self.team.clone(),
            owner: self.owner.clone(),
            package: self.package.clone(),
        }
    }

    /// Attach a selector; fails if one is already present
    pub fn with_selector(mut self, selector: Selector) -> Result<Self> {
        if self.selector.is_some() {
            return Err(Error::address(
                AddressErrorKind::ConflictingSelector,
                self.to_string(),
            ));
        }
        self.selector = Some(selector);
        Ok(self)
    }

    /// The same package with no subpath and no selector
    pub fn top_level(&self) -> Self {
        PackageAddress {
            subpath: Vec::new(),
            selector: None,
            ..self.clone()
        }
    }
}

impl From<&PackageKey> for PackageAddress {
    fn from(key: &PackageKey) -> Self {
        PackageAddress {
            team: key.team.clone(),
            owner: key.owner.clone(),
            package: key.package.clone(),
            subpath: Vec::new(),
            selector: None,
        }
    }
}

impl FromStr for PackageAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        PackageAddress::parse(s, true)
    }
}

impl fmt::Display for PackageAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(team) = &self.team {
            write!(f, "{}:", team)?;
        }
        write!(f, "{}/{}", self.owner, self.package)?;
        for element in &self.subpath {
            write!(f, "/{}", element)?;
        }
        if let Some(selector) = &self.selector {
            write!(f, ":{}:{}", selector.kind().keyword(), selector.value())?;
        }
        Ok(())
    }
}

fn parse_selector(raw: &str, spec: &str) -> Result<Selector> {
    let tokens: Vec<&str> = raw.split(':').collect();
    let mut selectors = Vec::new();

    for pair in tokens.chunks(2) {
        let kind = SelectorKind::from_keyword(pair[0])
            .ok_or_else(|| Error::address(AddressErrorKind::UnknownSelectorKeyword, spec))?;
        match pair.get(1) {
            Some(value) if !value.is_empty() => selectors.push(Selector::new(kind, *value)),
            _ => return Err(Error::address(AddressErrorKind::Malformed, spec)),
        }
    }

    if selectors.len() > 1 {
        return Err(Error::address(AddressErrorKind::ConflictingSelector, spec));
    }
    selectors
        .pop()
        .ok_or_else(|| Error::address(AddressErrorKind::Malformed, spec))
}

/// Owner, package and subpath grammar: an ASCII letter or underscore,
/// then letters, digits or underscores.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Team grammar: a lower-case ASCII letter followed by lower-case letters or digits.
pub fn is_valid_team(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}
