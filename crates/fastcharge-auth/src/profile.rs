use std::fmt;

use crate::credential_store::CredentialError;

const DEFAULT_FILE_NAME: &str = "auth.json";
const FILE_PREFIX: &str = "auth.";
const FILE_SUFFIX: &str = ".json";

/// Credential profile. The unnamed profile is [`Profile::Default`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Profile {
    #[default]
    Default,
    Named(String),
}

impl Profile {
    /// Parses an optional profile name; `None` or an empty name selects the default.
    pub fn parse(name: Option<&str>) -> Result<Self, CredentialError> {
        match name.map(str::trim).filter(|name| !name.is_empty()) {
            None => Ok(Self::Default),
            Some(name) if is_valid_profile_name(name) => Ok(Self::Named(name.to_string())),
            Some(name) => Err(CredentialError::InvalidProfile(name.to_string())),
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Default => None,
            Self::Named(name) => Some(name),
        }
    }

    pub(crate) fn file_name(&self) -> String {
        match self {
            Self::Default => DEFAULT_FILE_NAME.to_string(),
            Self::Named(name) => format!("{FILE_PREFIX}{name}{FILE_SUFFIX}"),
        }
    }

    pub(crate) fn from_file_name(file_name: &str) -> Option<Self> {
        if file_name == DEFAULT_FILE_NAME {
            return Some(Self::Default);
        }
        let name = file_name
            .strip_prefix(FILE_PREFIX)?
            .strip_suffix(FILE_SUFFIX)?;
        is_valid_profile_name(name).then(|| Self::Named(name.to_string()))
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("default"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

fn is_valid_profile_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains("..")
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
}
