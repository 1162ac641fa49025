// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authorization rules and the ordered rule table.
//!
//! ## Rule File
//!
//! ```json
//! {
//!   "default": "authenticated",
//!   "known_authorities": ["USER", "ADMIN"],
//!   "rules": [
//!     { "pattern": "/actuator/**", "access": "public" },
//!     { "pattern": "/admin", "access": "authority", "authorities": ["ADMIN"] },
//!     { "pattern": "/reports/**", "methods": ["POST"], "access": "authority",
//!       "authorities": ["ADMIN", "AUDITOR"], "match": "all" }
//!   ]
//! }
//! ```
//!
//! Rules are evaluated top to bottom and the first match decides, so narrow
//! patterns must come before wide ones. A rule that can never match because an
//! earlier one covers it is reported at load time but not rejected.

use std::collections::BTreeSet;
use std::path::Path;

use axum::http::Method;
use serde::Deserialize;

use super::pattern::PathPattern;
use crate::auth::{Authority, Principal};
use crate::error::ConfigError;

/// How a multi-authority requirement is combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Every listed authority is needed
    All,
    /// One listed authority is enough
    Any,
}

/// Authorities a rule demands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    authorities: Vec<Authority>,
    mode: MatchMode,
}

impl Requirement {
    pub fn single(authority: Authority) -> Self {
        Self {
            authorities: vec![authority],
            mode: MatchMode::All,
        }
    }

    pub fn all(authorities: impl IntoIterator<Item = Authority>) -> Self {
        Self::with_mode(authorities, MatchMode::All)
    }

    pub fn any(authorities: impl IntoIterator<Item = Authority>) -> Self {
        Self::with_mode(authorities, MatchMode::Any)
    }

    fn with_mode(authorities: impl IntoIterator<Item = Authority>, mode: MatchMode) -> Self {
        let unique: BTreeSet<Authority> = authorities.into_iter().collect();
        Self {
            authorities: unique.into_iter().collect(),
            mode,
        }
    }

    pub fn authorities(&self) -> &[Authority] {
        &self.authorities
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    pub fn is_satisfied_by(&self, principal: &Principal) -> bool {
        match self.mode {
            MatchMode::All => self.authorities.iter().all(|a| principal.has_authority(a)),
            MatchMode::Any => self.authorities.iter().any(|a| principal.has_authority(a)),
        }
    }
}

/// What a matching rule grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// No authentication needed
    Public,
    /// Any authenticated principal
    Authenticated,
    /// An authenticated principal holding the required authorities
    Authority(Requirement),
}

/// Policy for paths no rule matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultPolicy {
    /// Same as an `authenticated` rule
    #[default]
    Authenticated,
    /// Refuse everyone; absent principals are still challenged
    Deny,
}

/// One entry of the rule table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pattern: PathPattern,
    /// `None` matches every method
    methods: Option<Vec<Method>>,
    access: Access,
}

impl Rule {
    pub fn new(pattern: &str, access: Access) -> Result<Self, ConfigError> {
        Ok(Self {
            pattern: PathPattern::parse(pattern)?,
            methods: None,
            access,
        })
    }

    pub fn public(pattern: &str) -> Result<Self, ConfigError> {
        Self::new(pattern, Access::Public)
    }

    pub fn authenticated(pattern: &str) -> Result<Self, ConfigError> {
        Self::new(pattern, Access::Authenticated)
    }

    /// Rule requiring a single authority, named as in the rule language
    /// (`ADMIN`, `admin` or `ROLE_ADMIN`).
    pub fn authority(pattern: &str, authority: &str) -> Result<Self, ConfigError> {
        let authority =
            Authority::from_rule_name(authority).ok_or_else(|| ConfigError::InvalidAuthority {
                pattern: pattern.to_string(),
                authority: authority.to_string(),
            })?;
        Self::new(pattern, Access::Authority(Requirement::single(authority)))
    }

    /// Restrict the rule to the given methods.
    pub fn with_methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        let methods: Vec<Method> = methods.into_iter().collect();
        self.methods = if methods.is_empty() { None } else { Some(methods) };
        self
    }

    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    pub fn access(&self) -> &Access {
        &self.access
    }

    pub fn matches(&self, path: &str, method: &Method) -> bool {
        self.pattern.matches(path)
            && self
                .methods
                .as_ref()
                .is_none_or(|methods| methods.contains(method))
    }

    fn methods_overlap(&self, other: &Rule) -> bool {
        match (&self.methods, &other.methods) {
            (Some(a), Some(b)) => a.iter().any(|m| b.contains(m)),
            _ => true,
        }
    }

    fn methods_cover(&self, other: &Rule) -> bool {
        match (&self.methods, &other.methods) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(a), Some(b)) => b.iter().all(|m| a.contains(m)),
        }
    }

    fn authorities(&self) -> &[Authority] {
        match &self.access {
            Access::Authority(req) => req.authorities(),
            _ => &[],
        }
    }
}

/// Ordered rule list plus the policy for unmatched paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTable {
    rules: Vec<Rule>,
    default: DefaultPolicy,
}

impl RuleTable {
    /// Table from rules in evaluation order, without load-time checks.
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules,
            default: DefaultPolicy::default(),
        }
    }

    pub fn with_default(mut self, default: DefaultPolicy) -> Self {
        self.default = default;
        self
    }

    /// Table that passed load-time validation.
    ///
    /// Rejects authority rules with nothing to require, duplicate rules and,
    /// when `known` is given, authorities outside it. Shadowed rules are
    /// logged.
    pub fn validated(
        rules: Vec<Rule>,
        default: DefaultPolicy,
        known: Option<&BTreeSet<Authority>>,
    ) -> Result<Self, ConfigError> {
        for (index, rule) in rules.iter().enumerate() {
            // An empty `all` is vacuously true for every principal.
            if matches!(rule.access, Access::Authority(ref req) if req.authorities().is_empty()) {
                return Err(ConfigError::EmptyAuthorities {
                    pattern: rule.pattern.to_string(),
                });
            }

            if let Some(previous) = rules[..index]
                .iter()
                .position(|earlier| earlier.pattern == rule.pattern && earlier.methods_overlap(rule))
            {
                return Err(ConfigError::DuplicateRule {
                    index,
                    previous,
                    pattern: rule.pattern.to_string(),
                });
            }

            if let Some(known) = known {
                if let Some(unknown) = rule.authorities().iter().find(|a| !known.contains(*a)) {
                    return Err(ConfigError::UnknownAuthority {
                        pattern: rule.pattern.to_string(),
                        authority: unknown.to_string(),
                    });
                }
            }
        }

        let table = Self { rules, default };
        for (shadowed, by) in table.shadowed() {
            tracing::warn!(
                rule = shadowed,
                pattern = %table.rules[shadowed].pattern,
                shadowed_by = by,
                shadowed_by_pattern = %table.rules[by].pattern,
                "Rule can never match; an earlier rule covers it"
            );
        }
        Ok(table)
    }

    /// Parse and validate a JSON rule file body.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let file: RuleFile = serde_json::from_str(json)?;
        file.into_table()
    }

    /// Read and validate a JSON rule file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadRules {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// The table the gateway demo runs with when no rule file is given.
    pub fn gateway_default() -> Result<Self, ConfigError> {
        let rules = [
            Rule::public("/actuator/**"),
            Rule::public("/"),
            Rule::public("/docs/**"),
            Rule::public("/api-doc/**"),
            Rule::authority("/user", "USER"),
            Rule::authority("/admin", "ADMIN"),
            Rule::authority("/cart/user", "USER"),
            Rule::authority("/cart/admin", "ADMIN"),
            Rule::authority("/products/user", "USER"),
            Rule::authority("/products/admin", "ADMIN"),
            Rule::authenticated("/**"),
        ];
        let rules = rules.into_iter().collect::<Result<Vec<_>, _>>()?;
        Self::validated(rules, DefaultPolicy::Authenticated, None)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn default_policy(&self) -> DefaultPolicy {
        self.default
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First rule matching the request, with its index.
    pub fn first_match(&self, path: &str, method: &Method) -> Option<(usize, &Rule)> {
        self.rules
            .iter()
            .enumerate()
            .find(|(_, rule)| rule.matches(path, method))
    }

    /// Pairs `(shadowed, by)` of rules that can never match because the
    /// earlier rule `by` matches every request they would.
    pub fn shadowed(&self) -> Vec<(usize, usize)> {
        self.rules
            .iter()
            .enumerate()
            .filter_map(|(index, rule)| {
                self.rules[..index]
                    .iter()
                    .position(|earlier| {
                        earlier.pattern.covers(&rule.pattern) && earlier.methods_cover(rule)
                    })
                    .map(|by| (index, by))
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleFile {
    #[serde(default)]
    default: DefaultPolicy,
    #[serde(default)]
    known_authorities: Option<Vec<String>>,
    rules: Vec<RuleEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum AccessKind {
    Public,
    Authenticated,
    Authority,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleEntry {
    pattern: String,
    #[serde(default)]
    methods: Vec<String>,
    access: AccessKind,
    #[serde(default)]
    authorities: Vec<String>,
    #[serde(default, rename = "match")]
    mode: Option<MatchMode>,
}

impl RuleFile {
    fn into_table(self) -> Result<RuleTable, ConfigError> {
        let known = self
            .known_authorities
            .map(|names| {
                names
                    .iter()
                    .map(|name| {
                        Authority::from_rule_name(name).ok_or_else(|| {
                            ConfigError::InvalidAuthority {
                                pattern: "known_authorities".to_string(),
                                authority: name.clone(),
                            }
                        })
                    })
                    .collect::<Result<BTreeSet<_>, _>>()
            })
            .transpose()?;

        let rules = self
            .rules
            .into_iter()
            .map(RuleEntry::into_rule)
            .collect::<Result<Vec<_>, _>>()?;

        RuleTable::validated(rules, self.default, known.as_ref())
    }
}

impl RuleEntry {
    fn into_rule(self) -> Result<Rule, ConfigError> {
        let pattern = self.pattern;

        let methods = self
            .methods
            .iter()
            .map(|m| {
                Method::from_bytes(m.trim().to_uppercase().as_bytes()).map_err(|_| {
                    ConfigError::InvalidMethod {
                        pattern: pattern.clone(),
                        method: m.clone(),
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let access = match self.access {
            AccessKind::Public | AccessKind::Authenticated if !self.authorities.is_empty() => {
                return Err(ConfigError::UnexpectedAuthorities { pattern });
            }
            AccessKind::Public => Access::Public,
            AccessKind::Authenticated => Access::Authenticated,
            AccessKind::Authority => {
                let authorities = self
                    .authorities
                    .iter()
                    .map(|name| {
                        Authority::from_rule_name(name).ok_or_else(|| {
                            ConfigError::InvalidAuthority {
                                pattern: pattern.clone(),
                                authority: name.clone(),
                            }
                        })
                    })
                    .collect::<Result<BTreeSet<_>, _>>()?;

                match (authorities.len(), self.mode) {
                    (0, _) => return Err(ConfigError::EmptyAuthorities { pattern }),
                    (1, _) => Access::Authority(Requirement::all(authorities)),
                    (_, Some(MatchMode::All)) => Access::Authority(Requirement::all(authorities)),
                    (_, Some(MatchMode::Any)) => Access::Authority(Requirement::any(authorities)),
                    (_, None) => return Err(ConfigError::MissingMatchMode { pattern }),
                }
            }
        };

        Ok(Rule::new(&pattern, access)?.with_methods(methods))
    }
}
