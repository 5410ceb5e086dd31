use envi_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Globally unique repository name: `<owner>/<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepositoryLocator {
    owner: String,
    name: String,
}

impl RepositoryLocator {
    pub fn new(owner: &str, name: &str) -> Result<Self> {
        let locator = format!("{}/{}", owner, name);
        validate_segment(&locator, owner)?;
        validate_segment(&locator, name)?;
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backend key of the current encrypted archive.
    pub fn archive_path(&self) -> String {
        format!("archives/{}/{}.enc", self.owner, self.name)
    }
}

/// Checks a user or repository name segment.
pub fn validate_segment(locator: &str, segment: &str) -> Result<()> {
    let reject = |reason| {
        Err(Error::InvalidLocator {
            locator: locator.to_string(),
            reason,
        })
    };

    if segment.is_empty() {
        return reject("empty segment");
    }
    if segment == "." || segment == ".." {
        return reject("reserved segment");
    }
    if !segment
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return reject("only ASCII letters, digits, '.', '_' and '-' are allowed");
    }
    Ok(())
}

impl FromStr for RepositoryLocator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (owner, name) = s.split_once('/').ok_or_else(|| Error::InvalidLocator {
            locator: s.to_string(),
            reason: "expected <owner>/<name>",
        })?;
        Self::new(owner, name)
    }
}

impl TryFrom<String> for RepositoryLocator {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<RepositoryLocator> for String {
    fn from(locator: RepositoryLocator) -> Self {
        locator.to_string()
    }
}

impl fmt::Display for RepositoryLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}
