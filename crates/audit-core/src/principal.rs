//! Principal type discriminators for dataset access entries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of principal an access entry grants a role to.
///
/// On the wire the discriminator is the name of the single entity key carried
/// by the entry (`userByEmail`, `specialGroup`, ...). Keys this crate does not
/// know about are kept verbatim in [`PrincipalType::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PrincipalType {
    /// An individual user identified by email address.
    UserByEmail,
    GroupByEmail,
    /// Every user in a Google Workspace domain.
    Domain,
    /// `projectOwners`, `projectReaders`, `allAuthenticatedUsers`, ...
    SpecialGroup,
    IamMember,
    /// An authorized view.
    View,
    /// An authorized routine.
    Routine,
    /// An authorized dataset.
    Dataset,
    Other(String),
}

impl PrincipalType {
    pub const USER_BY_EMAIL: &'static str = "userByEmail";
    pub const GROUP_BY_EMAIL: &'static str = "groupByEmail";
    pub const DOMAIN: &'static str = "domain";
    pub const SPECIAL_GROUP: &'static str = "specialGroup";
    pub const IAM_MEMBER: &'static str = "iamMember";
    pub const VIEW: &'static str = "view";
    pub const ROUTINE: &'static str = "routine";
    pub const DATASET: &'static str = "dataset";

    /// Every discriminator key with a dedicated variant.
    pub const KNOWN_KEYS: [&'static str; 8] = [
        Self::USER_BY_EMAIL,
        Self::GROUP_BY_EMAIL,
        Self::DOMAIN,
        Self::SPECIAL_GROUP,
        Self::IAM_MEMBER,
        Self::VIEW,
        Self::ROUTINE,
        Self::DATASET,
    ];

    /// Map a wire key to its principal type.
    pub fn from_key(key: &str) -> Self {
        match key {
            Self::USER_BY_EMAIL => PrincipalType::UserByEmail,
            Self::GROUP_BY_EMAIL => PrincipalType::GroupByEmail,
            Self::DOMAIN => PrincipalType::Domain,
            Self::SPECIAL_GROUP => PrincipalType::SpecialGroup,
            Self::IAM_MEMBER => PrincipalType::IamMember,
            Self::VIEW => PrincipalType::View,
            Self::ROUTINE => PrincipalType::Routine,
            Self::DATASET => PrincipalType::Dataset,
            other => PrincipalType::Other(other.to_string()),
        }
    }

    /// The wire key for this principal type.
    pub fn as_str(&self) -> &str {
        match self {
            PrincipalType::UserByEmail => Self::USER_BY_EMAIL,
            PrincipalType::GroupByEmail => Self::GROUP_BY_EMAIL,
            PrincipalType::Domain => Self::DOMAIN,
            PrincipalType::SpecialGroup => Self::SPECIAL_GROUP,
            PrincipalType::IamMember => Self::IAM_MEMBER,
            PrincipalType::View => Self::VIEW,
            PrincipalType::Routine => Self::ROUTINE,
            PrincipalType::Dataset => Self::DATASET,
            PrincipalType::Other(key) => key,
        }
    }

    /// True only for individual users identified by email.
    pub fn is_individual_user(&self) -> bool {
        matches!(self, PrincipalType::UserByEmail)
    }
}

impl fmt::Display for PrincipalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for PrincipalType {
    fn from(key: &str) -> Self {
        Self::from_key(key)
    }
}

impl From<String> for PrincipalType {
    fn from(key: String) -> Self {
        Self::from_key(&key)
    }
}

impl From<PrincipalType> for String {
    fn from(principal: PrincipalType) -> Self {
        principal.as_str().to_string()
    }
}
