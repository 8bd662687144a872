//! Authority names and the authenticated principal.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Role granted to a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Authority {
    User,
    Admin,
}

/// Bidirectional table between authorities and their wire names.
/// Entries are in declaration order, so a variant's discriminant is its index.
const AUTHORITY_NAMES: &[(Authority, &str)] = &[
    (Authority::User, "ROLE_USER"),
    (Authority::Admin, "ROLE_ADMIN"),
];

impl Authority {
    pub fn name(&self) -> &'static str {
        AUTHORITY_NAMES[*self as usize].1
    }

    /// Look up an authority by its wire name (e.g. `ROLE_ADMIN`).
    pub fn from_name(name: &str) -> Option<Self> {
        AUTHORITY_NAMES
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(authority, _)| *authority)
    }

    /// Join authority names with commas, as stored in the `auth` claim.
    pub fn join(authorities: &BTreeSet<Authority>) -> String {
        authorities
            .iter()
            .map(Authority::name)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl Serialize for Authority {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Authority {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Authority::from_name(&name)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown authority: {}", name)))
    }
}

/// Identity attached to an authenticated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Subject identifier (member email)
    pub subject: String,
    /// Granted authorities
    pub authorities: BTreeSet<Authority>,
}

impl Principal {
    pub fn new(subject: impl Into<String>, authorities: BTreeSet<Authority>) -> Self {
        Self {
            subject: subject.into(),
            authorities,
        }
    }

    pub fn has_authority(&self, authority: Authority) -> bool {
        self.authorities.contains(&authority)
    }
}
