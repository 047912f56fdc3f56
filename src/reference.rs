//! Image reference normalization
//!
//! Parses user-supplied image identifiers the way the Docker CLI does:
//! short names are expanded to `docker.io/library/<name>`, and the
//! familiar form strips that default domain again for display and for
//! the engine's push endpoint.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

/// Maximum total number of characters in a repository name, domain included.
pub const NAME_TOTAL_LENGTH_MAX: usize = 255;

const DEFAULT_DOMAIN: &str = "docker.io";
const LEGACY_DEFAULT_DOMAIN: &str = "index.docker.io";
const OFFICIAL_REPO_PREFIX: &str = "library/";

const ALPHA_NUMERIC: &str = r"[a-z0-9]+";
const SEPARATOR: &str = r"(?:[._]|__|[-]+)";
const DOMAIN_COMPONENT: &str = r"(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9])";
const TAG: &str = r"[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}";
const DIGEST: &str = r"[A-Za-z][A-Za-z0-9]*(?:[-_+.][A-Za-z][A-Za-z0-9]*)*:[0-9a-fA-F]{32,}";

fn name_pattern() -> String {
    let path_component = format!("{ALPHA_NUMERIC}(?:{SEPARATOR}{ALPHA_NUMERIC})*");
    let domain = format!(r"{DOMAIN_COMPONENT}(?:\.{DOMAIN_COMPONENT})*(?::[0-9]+)?");
    format!("(?:{domain}/)?{path_component}(?:/{path_component})*")
}

static REFERENCE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^({})(?::({TAG}))?(?:@({DIGEST}))?$", name_pattern()))
        .expect("reference pattern is valid")
});

static ANCHORED_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^{}$", name_pattern())).expect("name pattern is valid")
});

static ANCHORED_TAG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("^{TAG}$")).expect("tag pattern is valid"));

static ANCHORED_IDENTIFIER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[a-f0-9]{64}$").expect("identifier pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("repository name must have at least one component")]
    NameEmpty,
    #[error("invalid repository name ({0}), cannot specify 64-byte hexadecimal strings")]
    HexIdentifier(String),
    #[error("invalid reference format: repository name must be lowercase")]
    NameContainsUppercase,
    #[error("repository name must not be more than {NAME_TOTAL_LENGTH_MAX} characters")]
    NameTooLong,
    #[error("invalid reference format")]
    ReferenceInvalidFormat,
    #[error("invalid tag format")]
    TagInvalidFormat,
    #[error("invalid checksum digest format")]
    DigestInvalidFormat,
    #[error("unsupported digest algorithm")]
    DigestUnsupported,
}

/// A normalized image reference.
///
/// ```
/// use dockerpush::reference::Reference;
///
/// let reference = Reference::parse_normalized("ubuntu:22.04").unwrap();
/// assert_eq!(reference.name(), "docker.io/library/ubuntu");
/// assert_eq!(reference.familiar_name(), "ubuntu");
/// assert_eq!(reference.tag(), Some("22.04"));
/// assert!(!reference.is_canonical());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    domain: String,
    path: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl Reference {
    /// Parse a user-supplied identifier, filling in the default domain and
    /// the official repository prefix.
    pub fn parse_normalized(s: &str) -> Result<Self, ParseError> {
        if s.is_empty() {
            return Err(ParseError::NameEmpty);
        }
        if ANCHORED_IDENTIFIER_REGEX.is_match(s) {
            return Err(ParseError::HexIdentifier(s.to_string()));
        }

        let (domain, remainder) = split_docker_domain(s);
        let remote_name = match remainder.find(':') {
            Some(i) => &remainder[..i],
            None => remainder.as_str(),
        };
        if remote_name.to_lowercase() != remote_name {
            return Err(ParseError::NameContainsUppercase);
        }

        Self::parse_qualified(&format!("{domain}/{remainder}"))
    }

    /// Parse a reference that already carries its domain.
    fn parse_qualified(s: &str) -> Result<Self, ParseError> {
        let caps = REFERENCE_REGEX
            .captures(s)
            .ok_or_else(|| classify_mismatch(s))?;

        let name = &caps[1];
        if name.len() > NAME_TOTAL_LENGTH_MAX {
            return Err(ParseError::NameTooLong);
        }
        let (domain, path) = name
            .split_once('/')
            .ok_or(ParseError::ReferenceInvalidFormat)?;

        let digest = match caps.get(3) {
            Some(d) => {
                validate_digest(d.as_str())?;
                Some(d.as_str().to_string())
            }
            None => None,
        };

        Ok(Reference {
            domain: domain.to_string(),
            path: path.to_string(),
            tag: caps.get(2).map(|t| t.as_str().to_string()),
            digest,
        })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Fully qualified repository name, `domain/path`.
    pub fn name(&self) -> String {
        format!("{}/{}", self.domain, self.path)
    }

    /// Short form of the repository name as a user would type it.
    pub fn familiar_name(&self) -> String {
        if self.domain != DEFAULT_DOMAIN {
            return self.name();
        }
        match self.path.strip_prefix(OFFICIAL_REPO_PREFIX) {
            Some(short) if !short.contains('/') => short.to_string(),
            _ => self.path.clone(),
        }
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// A canonical reference is pinned to a content digest.
    pub fn is_canonical(&self) -> bool {
        self.digest.is_some()
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.familiar_name())?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Reference {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Reference::parse_normalized(s)
    }
}

fn split_docker_domain(name: &str) -> (String, String) {
    let (mut domain, mut remainder) = match name.find('/') {
        Some(i) if looks_like_domain(&name[..i]) => {
            (name[..i].to_string(), name[i + 1..].to_string())
        }
        _ => (DEFAULT_DOMAIN.to_string(), name.to_string()),
    };

    if domain == LEGACY_DEFAULT_DOMAIN {
        domain = DEFAULT_DOMAIN.to_string();
    }
    if domain == DEFAULT_DOMAIN && !remainder.contains('/') {
        remainder = format!("{OFFICIAL_REPO_PREFIX}{remainder}");
    }
    (domain, remainder)
}

fn looks_like_domain(component: &str) -> bool {
    component.contains('.') || component.contains(':') || component == "localhost"
}

// Tell a bad tag apart from an otherwise malformed reference.
fn classify_mismatch(s: &str) -> ParseError {
    let without_digest = s.split('@').next().unwrap_or(s);
    if let Some(i) = without_digest.rfind(':') {
        let (name, tag) = (&without_digest[..i], &without_digest[i + 1..]);
        if !tag.contains('/') && ANCHORED_NAME_REGEX.is_match(name) && !ANCHORED_TAG_REGEX.is_match(tag) {
            return ParseError::TagInvalidFormat;
        }
    }
    ParseError::ReferenceInvalidFormat
}

fn validate_digest(digest: &str) -> Result<(), ParseError> {
    let (algorithm, encoded) = digest
        .split_once(':')
        .ok_or(ParseError::DigestInvalidFormat)?;
    let expected_len = match algorithm {
        "sha256" => 64,
        "sha384" => 96,
        "sha512" => 128,
        _ => return Err(ParseError::DigestUnsupported),
    };
    let is_lower_hex = encoded
        .chars()
        .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
    if encoded.len() != expected_len || !is_lower_hex {
        return Err(ParseError::DigestInvalidFormat);
    }
    Ok(())
}
