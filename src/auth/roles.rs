// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authorities derived from provider role names.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Prefix shared by every authority tag.
pub const AUTHORITY_PREFIX: &str = "ROLE_";

/// A normalized permission tag, e.g. `ROLE_ADMIN`.
///
/// Authorities are compared byte-for-byte. The rule language and the mapper
/// both produce the uppercased, prefixed form, so a role `admin` in a token
/// and a rule naming `ADMIN` meet at `ROLE_ADMIN`.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct Authority(String);

impl Authority {
    /// Build the authority granted by a provider role name.
    ///
    /// The name is uppercased and prefixed verbatim, so `"admin"` becomes
    /// `ROLE_ADMIN` and `"ROLE_admin"` becomes `ROLE_ROLE_ADMIN`.
    pub fn from_role(role: &str) -> Self {
        Authority(format!("{AUTHORITY_PREFIX}{}", role.to_uppercase()))
    }

    /// Parse an authority as written in a rule table.
    ///
    /// Accepts `ADMIN`, `admin` or `ROLE_ADMIN`; all yield `ROLE_ADMIN`.
    /// Returns `None` for blank names.
    pub fn from_rule_name(name: &str) -> Option<Self> {
        let name = name.trim();
        let upper = name.to_uppercase();
        let bare = upper.strip_prefix(AUTHORITY_PREFIX).unwrap_or(&upper);
        if bare.is_empty() {
            return None;
        }
        Some(Authority(format!("{AUTHORITY_PREFIX}{bare}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Authority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Map role names to the authority set they grant.
///
/// Pure and total: duplicates collapse, an empty input gives an empty set.
pub fn to_authorities<I, S>(role_names: I) -> BTreeSet<Authority>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    role_names
        .into_iter()
        .map(|role| Authority::from_role(role.as_ref()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_role_maps_to_prefixed_upper_case() {
        let authorities = to_authorities(["user"]);
        assert_eq!(authorities.len(), 1);
        assert!(authorities.contains(&Authority::from_role("user")));
        assert_eq!(authorities.iter().next().unwrap().as_str(), "ROLE_USER");
    }

    #[test]
    fn empty_roles_give_empty_set() {
        let authorities = to_authorities(Vec::<String>::new());
        assert!(authorities.is_empty());
    }

    #[test]
    fn duplicates_collapse_regardless_of_case() {
        let authorities = to_authorities(["admin", "ADMIN", "Admin", "user"]);
        let tags: Vec<&str> = authorities.iter().map(Authority::as_str).collect();
        assert_eq!(tags, vec!["ROLE_ADMIN", "ROLE_USER"]);
    }

    #[test]
    fn mapper_does_not_strip_existing_prefix() {
        let authorities = to_authorities(["ROLE_ADMIN"]);
        assert_eq!(
            authorities.iter().next().unwrap().as_str(),
            "ROLE_ROLE_ADMIN"
        );
    }

    #[test]
    fn rule_names_normalize_to_the_same_tag() {
        let expected = Authority::from_role("admin");
        assert_eq!(Authority::from_rule_name("ADMIN"), Some(expected.clone()));
        assert_eq!(Authority::from_rule_name("admin"), Some(expected.clone()));
        assert_eq!(Authority::from_rule_name("ROLE_ADMIN"), Some(expected.clone()));
        assert_eq!(Authority::from_rule_name(" role_admin "), Some(expected));
    }

    #[test]
    fn blank_rule_names_are_rejected() {
        assert_eq!(Authority::from_rule_name(""), None);
        assert_eq!(Authority::from_rule_name("ROLE_"), None);
        assert_eq!(Authority::from_rule_name("   "), None);
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&Authority::from_role("user")).unwrap();
        assert_eq!(json, r#""ROLE_USER""#);
    }
}
