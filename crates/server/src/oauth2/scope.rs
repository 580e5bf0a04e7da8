//! Closed vocabularies for scopes and grant types.
//!
//! Request bodies carry free-form strings; they are parsed into these enums at
//! the boundary and anything outside the allow-list is rejected.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// The URN form of the device grant used at the token endpoint (RFC 8628 §3.4).
pub const DEVICE_CODE_GRANT_URN: &str = "urn:ietf:params:oauth:grant-type:device_code";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    RefreshToken,
    ClientCredentials,
    DeviceCode,
}

impl GrantType {
    pub const ALL: [GrantType; 4] = [
        GrantType::AuthorizationCode,
        GrantType::RefreshToken,
        GrantType::ClientCredentials,
        GrantType::DeviceCode,
    ];

    /// Name stored on the client record.
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::AuthorizationCode => "authorization_code",
            GrantType::RefreshToken => "refresh_token",
            GrantType::ClientCredentials => "client_credentials",
            GrantType::DeviceCode => "device_code",
        }
    }

    /// Name a client sends as `grant_type` at the token endpoint.
    pub fn wire_name(&self) -> &'static str {
        match self {
            GrantType::DeviceCode => DEVICE_CODE_GRANT_URN,
            other => other.as_str(),
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownValue(pub String);

impl fmt::Display for UnknownValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown value '{}'", self.0)
    }
}

impl std::error::Error for UnknownValue {}

impl FromStr for GrantType {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "authorization_code" => Ok(GrantType::AuthorizationCode),
            "refresh_token" => Ok(GrantType::RefreshToken),
            "client_credentials" => Ok(GrantType::ClientCredentials),
            "device_code" | DEVICE_CODE_GRANT_URN => Ok(GrantType::DeviceCode),
            other => Err(UnknownValue(other.to_string())),
        }
    }
}

/// Scopes understood by the task manager's resource servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
pub enum Scope {
    #[serde(rename = "profile")]
    Profile,
    #[serde(rename = "todos:read")]
    TodosRead,
    #[serde(rename = "todos:write")]
    TodosWrite,
    #[serde(rename = "projects:read")]
    ProjectsRead,
    #[serde(rename = "projects:write")]
    ProjectsWrite,
    #[serde(rename = "wiki:read")]
    WikiRead,
    #[serde(rename = "wiki:write")]
    WikiWrite,
    #[serde(rename = "snippets:read")]
    SnippetsRead,
    #[serde(rename = "snippets:write")]
    SnippetsWrite,
    #[serde(rename = "calendar:read")]
    CalendarRead,
    #[serde(rename = "calendar:write")]
    CalendarWrite,
}

impl Scope {
    pub const ALL: [Scope; 11] = [
        Scope::Profile,
        Scope::TodosRead,
        Scope::TodosWrite,
        Scope::ProjectsRead,
        Scope::ProjectsWrite,
        Scope::WikiRead,
        Scope::WikiWrite,
        Scope::SnippetsRead,
        Scope::SnippetsWrite,
        Scope::CalendarRead,
        Scope::CalendarWrite,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Profile => "profile",
            Scope::TodosRead => "todos:read",
            Scope::TodosWrite => "todos:write",
            Scope::ProjectsRead => "projects:read",
            Scope::ProjectsWrite => "projects:write",
            Scope::WikiRead => "wiki:read",
            Scope::WikiWrite => "wiki:write",
            Scope::SnippetsRead => "snippets:read",
            Scope::SnippetsWrite => "snippets:write",
            Scope::CalendarRead => "calendar:read",
            Scope::CalendarWrite => "calendar:write",
        }
    }

    /// Shown on the consent and device verification pages.
    pub fn description(&self) -> &'static str {
        match self {
            Scope::Profile => "See your name and account id",
            Scope::TodosRead => "View your todos",
            Scope::TodosWrite => "Create, edit and complete your todos",
            Scope::ProjectsRead => "View your projects",
            Scope::ProjectsWrite => "Create and modify your projects",
            Scope::WikiRead => "Read your wiki pages",
            Scope::WikiWrite => "Edit your wiki pages",
            Scope::SnippetsRead => "View your snippets",
            Scope::SnippetsWrite => "Create and modify your snippets",
            Scope::CalendarRead => "View your calendar",
            Scope::CalendarWrite => "Reschedule items on your calendar",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scope::ALL
            .iter()
            .copied()
            .find(|scope| scope.as_str() == s)
            .ok_or_else(|| UnknownValue(s.to_string()))
    }
}

/// A flat set of scopes, rendered space-separated (RFC 6749 §3.3).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeSet(BTreeSet<Scope>);

impl ScopeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, scope: Scope) -> bool {
        self.0.contains(&scope)
    }

    pub fn is_subset(&self, other: &ScopeSet) -> bool {
        self.0.is_subset(&other.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = Scope> + '_ {
        self.0.iter().copied()
    }

    /// Parse a stored value. Unknown entries (e.g. a scope retired after the
    /// row was written) are dropped rather than failing the whole record.
    pub fn from_stored(s: &str) -> Self {
        Self(s.split_whitespace().filter_map(|p| p.parse().ok()).collect())
    }
}

impl FromStr for ScopeSet {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split_whitespace()
            .map(Scope::from_str)
            .collect::<Result<BTreeSet<_>, _>>()
            .map(Self)
    }
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for scope in &self.0 {
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(scope.as_str())?;
            first = false;
        }
        Ok(())
    }
}

impl FromIterator<Scope> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = Scope>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Join grant types for storage on the client record.
pub fn grant_types_to_string(grants: &[GrantType]) -> String {
    let set: BTreeSet<GrantType> = grants.iter().copied().collect();
    set.iter()
        .map(GrantType::as_str)
        .collect::<Vec<_>>()
        .join(" ")
}
