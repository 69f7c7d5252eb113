//! Owned domain names used as tree keys. Labels are kept in query order (most
//! specific first), lowercased on construction so all matching is
//! case-insensitive. The root name is the empty label list.
use std::fmt;

use crate::error::{InternalError, RPZError};

/// Longest label accepted, per RFC1035
const MAX_LABEL_LEN: usize = 63;

#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct DomainName {
    labels: Vec<String>,
}

impl DomainName {
    /// The root name `.`
    pub fn root() -> Self {
        DomainName { labels: Vec::new() }
    }

    pub fn from_labels(labels: Vec<String>) -> Self {
        DomainName { labels }
    }

    pub fn is_root(&self) -> bool {
        self.labels.is_empty()
    }

    /// Number of labels, the root having none.
    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// A wildcard name begins with the single label `*`.
    pub fn is_wildcard(&self) -> bool {
        self.labels.first().map(|l| l == "*").unwrap_or(false)
    }

    /// The name with its first label removed; None for the root.
    pub fn parent(&self) -> Option<DomainName> {
        if self.is_root() {
            None
        } else {
            Some(DomainName {
                labels: self.labels[1..].to_vec(),
            })
        }
    }

    /// True when `self` equals `other` or sits below it.
    pub fn is_subdomain_of(&self, other: &DomainName) -> bool {
        let n = self.labels.len();
        let m = other.labels.len();
        n >= m && self.labels[n - m..] == other.labels[..]
    }

    /// Strip `suffix` off the tail of the name, keeping the leading labels.
    /// None when the name is not below `suffix`.
    pub fn strip_suffix(&self, suffix: &DomainName) -> Option<DomainName> {
        if !self.is_subdomain_of(suffix) {
            return None;
        }
        Some(DomainName {
            labels: self.labels[..self.labels.len() - suffix.labels.len()].to_vec(),
        })
    }

    /// `self` followed by `tail`, as in joining a relative name to an origin.
    pub fn concat(&self, tail: &DomainName) -> DomainName {
        let mut labels = self.labels.clone();
        labels.extend_from_slice(&tail.labels);
        DomainName { labels }
    }

    /// A wildcard label pushed in front, turning `name` into `*.name`.
    pub fn to_wildcard(&self) -> DomainName {
        let mut labels = Vec::with_capacity(self.labels.len() + 1);
        labels.push(String::from("*"));
        labels.extend_from_slice(&self.labels);
        DomainName { labels }
    }
}

/// ```
/// use rpzlib::name::DomainName;
///
/// let dn = DomainName::try_from("www.Example.COM").unwrap();
/// assert_eq!(dn.to_string(), "www.example.com.");
///
/// let dn = DomainName::try_from(".").unwrap();
/// assert_eq!(dn.to_string(), ".");
/// ```
impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, ".")?;
        } else {
            for label in &self.labels {
                write!(f, "{}.", label)?;
            }
        }
        Ok(())
    }
}

/// ```
/// use rpzlib::name::DomainName;
///
/// let dn = DomainName::try_from("www.example.com").unwrap();
/// assert_eq!(dn.label_count(), 3);
///
/// let dn = DomainName::try_from("com.").unwrap();
/// assert_eq!(dn.label_count(), 1);
///
/// assert!(DomainName::try_from("").is_err());
/// ```
impl TryFrom<&str> for DomainName {
    type Error = RPZError;

    fn try_from(domain: &str) -> Result<Self, Self::Error> {
        // safeguard
        if domain.is_empty() {
            return Err(RPZError::RPZInternalError(InternalError::EmptyDomainName));
        }

        // handle case for root domain
        let labels: Vec<String> = if domain == "." {
            vec![]
        } else {
            domain
                .split('.')
                .filter(|x| !x.is_empty())
                .map(|x| x.to_lowercase())
                .collect()
        };

        if labels.iter().any(|l| l.len() > MAX_LABEL_LEN) {
            return Err(RPZError::RPZInternalError(
                InternalError::DomainNameTooLong,
            ));
        }

        Ok(DomainName { labels })
    }
}
