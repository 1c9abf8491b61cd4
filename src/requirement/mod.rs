//! Requirement model.
//!
//! A [`Requirement`] identifies one installable unit: either a named package
//! with an optional version (`numpy==1.7.2`, `numpy>=1.7.1`, `scipy`) or a
//! package fetched straight from a [`SourceLocation`]
//! (`http://host/pkg.tar.gz`, `-e git+https://host/repo@branch#egg=repo`).
//!
//! # Canonical form
//!
//! [`Requirement::freeze`] renders the pip-style specifier that
//! [`parser::parse`] reads back into an equal value:
//!
//! | Requirement | `freeze()` |
//! |---|---|
//! | name + version | `numpy==1.7.2` |
//! | name + version, at-least | `numpy>=1.7.1` |
//! | name only | `scipy` |
//! | source location | the location text, verbatim |
//! | any of the above, editable | `-e ` prefix |
//!
//! # Cache file names
//!
//! Named requirements map to cache record names with [`Requirement::rob_filename`]
//! (`numpy__1_7_2.rob`) and back with [`Requirement::from_rob_filename`], so a
//! plain directory listing of the cache reconstructs what is cached.

pub mod parser;

pub use parser::{filter_requirement_lines, parse, parse_lines};

use crate::core::RobustusError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use url::Url;

/// Extension of cache record files.
pub const ROB_EXTENSION: &str = "rob";

/// Where a requirement is fetched from when it is not a registry name.
///
/// The original text is kept verbatim so that `freeze()` reproduces exactly
/// what the user wrote; the parsed [`Url`] is kept alongside for structured
/// access. Local directories (`/abs/path`, `./rel`, `~/src/pkg`) have no URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    raw: String,
    url: Option<Url>,
}

impl SourceLocation {
    /// Parses `text` as an absolute URI with a non-empty scheme.
    ///
    /// Returns `None` for anything else, including `name==version` text.
    pub fn parse_url(text: &str) -> Option<Self> {
        let text = text.trim();
        let url = Url::parse(text).ok()?;
        if url.scheme().is_empty() {
            return None;
        }
        Some(Self {
            raw: text.to_string(),
            url: Some(url),
        })
    }

    /// A local directory or archive path.
    pub fn local(path: impl Into<String>) -> Self {
        Self {
            raw: path.into(),
            url: None,
        }
    }

    /// The location exactly as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    pub fn scheme(&self) -> Option<&str> {
        self.url.as_ref().map(Url::scheme)
    }

    pub fn host(&self) -> Option<String> {
        self.url.as_ref().and_then(|url| url.host_str().map(str::to_string))
    }

    pub fn path(&self) -> &str {
        match &self.url {
            Some(url) => url.path(),
            None => &self.raw,
        }
    }

    pub fn fragment(&self) -> Option<&str> {
        self.url.as_ref().and_then(Url::fragment)
    }

    pub fn is_local(&self) -> bool {
        self.url.is_none()
    }

    /// Filesystem path of a local location, with `~` expanded.
    pub fn local_path(&self) -> Option<PathBuf> {
        if !self.is_local() {
            return None;
        }
        Some(PathBuf::from(shellexpand::tilde(&self.raw).into_owned()))
    }

    /// The package name from an `#egg=<name>` fragment.
    pub fn egg_name(&self) -> Option<&str> {
        self.fragment()?
            .split('&')
            .find_map(|part| part.strip_prefix("egg="))
            .filter(|name| !name.is_empty())
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// One installable unit, named or located.
///
/// Always carries a name or a source location. `version` usually holds a
/// version string; for overlay packages (`ros_overlay==https://...`) it holds
/// a fetch location instead, so it is never interpreted as semver here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Requirement {
    name: Option<String>,
    version: Option<String>,
    source: Option<SourceLocation>,
    editable: bool,
    allow_greater_version: bool,
}

/// Identity used when collapsing duplicates: the source location when present,
/// otherwise the name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequirementKey {
    Source(String),
    Name(String),
    /// Name plus version, used for overlay packages where every version is a
    /// distinct location.
    Overlay(String, String),
}

impl Requirement {
    /// A registry requirement, `name` or `name==version`.
    pub fn named(name: impl Into<String>, version: Option<&str>) -> Self {
        Self {
            name: Some(name.into()),
            version: version.map(str::to_string),
            source: None,
            editable: false,
            allow_greater_version: false,
        }
    }

    /// A requirement fetched from `source`.
    pub fn from_source(source: SourceLocation) -> Self {
        Self {
            name: None,
            version: None,
            source: Some(source),
            editable: false,
            allow_greater_version: false,
        }
    }

    #[must_use]
    pub fn with_editable(mut self, editable: bool) -> Self {
        self.editable = editable;
        self
    }

    #[must_use]
    pub fn with_allow_greater_version(mut self, allow: bool) -> Self {
        self.allow_greater_version = allow;
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn source(&self) -> Option<&SourceLocation> {
        self.source.as_ref()
    }

    pub const fn is_editable(&self) -> bool {
        self.editable
    }

    pub const fn allows_greater_version(&self) -> bool {
        self.allow_greater_version
    }

    /// Name for display and builder dispatch: the explicit name, else the egg
    /// fragment of the source location.
    pub fn display_name(&self) -> Option<&str> {
        self.name().or_else(|| self.source.as_ref().and_then(SourceLocation::egg_name))
    }

    /// Pip-format specifier with all flags.
    pub fn freeze(&self) -> String {
        if self.editable {
            format!("-e {}", self.freeze_base())
        } else {
            self.freeze_base()
        }
    }

    /// Pip-format specifier without the `-e` flag.
    pub fn freeze_base(&self) -> String {
        if let Some(source) = &self.source {
            return source.as_str().to_string();
        }
        let name = self.name.as_deref().unwrap_or_default();
        match &self.version {
            Some(version) if self.allow_greater_version => format!("{name}>={version}"),
            Some(version) => format!("{name}=={version}"),
            None => name.to_string(),
        }
    }

    /// Whether a cached `other` satisfies this request.
    ///
    /// Same source location, or same name with either no requested version or
    /// a textually equal one. A versioned request is not satisfied by an
    /// unversioned record.
    pub fn allows(&self, other: &Requirement) -> bool {
        match (&self.source, &other.source) {
            (Some(mine), Some(theirs)) => mine == theirs,
            (None, None) => match (&self.name, &other.name) {
                (Some(mine), Some(theirs)) if mine == theirs => {
                    self.version.is_none() || other.version == self.version
                }
                _ => false,
            },
            _ => false,
        }
    }

    /// Identity key for deduplication.
    pub fn key(&self) -> RequirementKey {
        match (&self.source, &self.name) {
            (Some(source), _) => RequirementKey::Source(source.as_str().to_string()),
            (None, Some(name)) => RequirementKey::Name(name.clone()),
            (None, None) => RequirementKey::Name(String::new()),
        }
    }

    /// Cache record file name: `<name>__<version>.rob` with dots in the version
    /// replaced by underscores, or `<name>.rob` when unversioned.
    ///
    /// Characters that are unsafe in file names (the `/` and `:` of overlay
    /// locations) and underscores that would be ambiguous are written as
    /// `%XX`, so `__` only ever separates name from version.
    ///
    /// `None` for unnamed source-location requirements, whose records are
    /// keyed by a hash instead (see [`crate::cache::Fingerprint`]).
    pub fn rob_filename(&self) -> Option<String> {
        if self.source.is_some() {
            return None;
        }
        let name = encode_rob_part(self.name.as_deref()?, RobPart::Name);
        Some(match &self.version {
            Some(version) => format!("{name}__{}.{ROB_EXTENSION}", encode_rob_part(version, RobPart::Version)),
            None => format!("{name}.{ROB_EXTENSION}"),
        })
    }

    /// Inverse of [`rob_filename`](Self::rob_filename).
    ///
    /// Accepts a bare file name or a full path.
    pub fn from_rob_filename(path: impl AsRef<Path>) -> Result<Self, RobustusError> {
        let path = path.as_ref();
        let malformed = || RobustusError::CacheCorruption {
            path: path.display().to_string(),
            reason: "not a <name>[__<version>].rob file name".to_string(),
        };

        if path.extension().and_then(|ext| ext.to_str()) != Some(ROB_EXTENSION) {
            return Err(malformed());
        }
        let stem = path.file_stem().and_then(|stem| stem.to_str()).ok_or_else(malformed)?;

        let (name, version) = match stem.split_once("__") {
            Some((name, version)) if !name.is_empty() && !version.is_empty() => (name, Some(version)),
            Some(_) => return Err(malformed()),
            None if stem.is_empty() => return Err(malformed()),
            None => (stem, None),
        };
        let name = decode_rob_part(name, RobPart::Name).ok_or_else(malformed)?;
        let version = version
            .map(|version| decode_rob_part(version, RobPart::Version).ok_or_else(malformed))
            .transpose()?;
        Ok(Self::named(name, version.as_deref()))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum RobPart {
    Name,
    Version,
}

impl RobPart {
    /// The character written as `_`.
    const fn underscored(self) -> char {
        match self {
            Self::Name => '_',
            Self::Version => '.',
        }
    }
}

/// Encodes one half of a rob file name. The result never contains `__`, a
/// name never ends with `_` and a version never starts with one.
fn encode_rob_part(text: &str, part: RobPart) -> String {
    let count = text.chars().count();
    let mut out = String::with_capacity(text.len());
    for (i, c) in text.chars().enumerate() {
        let underscore_allowed = !out.ends_with('_')
            && match part {
                RobPart::Name => i + 1 < count,
                RobPart::Version => i > 0,
            };
        if c == part.underscored() && underscore_allowed {
            out.push('_');
        } else if c.is_ascii_alphanumeric() || matches!(c, '-' | '+') || (c == '.' && part == RobPart::Name) {
            out.push(c);
        } else {
            let mut buf = [0; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                out.push_str(&format!("%{byte:02X}"));
            }
        }
    }
    out
}

fn decode_rob_part(text: &str, part: RobPart) -> Option<String> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let escaped = hex::decode(bytes.get(i + 1..i + 3)?).ok()?;
                out.extend(escaped);
                i += 3;
            }
            b'_' => {
                out.push(part.underscored() as u8);
                i += 1;
            }
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }
    String::from_utf8(out).ok()
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.freeze())
    }
}

impl FromStr for Requirement {
    type Err = RobustusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}
