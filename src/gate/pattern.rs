// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Path patterns for authorization rules.
//!
//! | Pattern        | Matches                                         |
//! |----------------|-------------------------------------------------|
//! | `/admin`       | `/admin` and `/admin/`                          |
//! | `/cart/*`      | `/cart/x`, not `/cart` or `/cart/x/y`           |
//! | `/actuator/**` | `/actuator`, `/actuator/health`, `/actuator/a/b`|
//! | `/**` or `*`   | every path                                      |
//!
//! Wildcards are only allowed as the last segment.

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Any,
    Exact(String),
    /// One more segment below the prefix
    Segment(String),
    /// The prefix itself or anything below it
    Subtree(String),
}

/// A parsed rule path pattern.
#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    kind: Kind,
}

impl PartialEq for PathPattern {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Eq for PathPattern {}

impl PathPattern {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let invalid = |reason| ConfigError::InvalidPattern {
            pattern: raw.to_string(),
            reason,
        };

        let trimmed = raw.trim();
        if trimmed == "*" || trimmed == "/**" {
            return Ok(Self::new(raw, Kind::Any));
        }
        if !trimmed.starts_with('/') {
            return Err(invalid("must start with '/'"));
        }

        let (prefix, wildcard) = if let Some(prefix) = trimmed.strip_suffix("/**") {
            (prefix, Some(true))
        } else if let Some(prefix) = trimmed.strip_suffix("/*") {
            (prefix, Some(false))
        } else {
            (trimmed, None)
        };

        if prefix.contains('*') {
            return Err(invalid("wildcards are only allowed as the last segment"));
        }
        if prefix.contains("//") {
            return Err(invalid("empty path segment"));
        }

        let kind = match wildcard {
            Some(true) => Kind::Subtree(prefix.to_string()),
            Some(false) => Kind::Segment(prefix.to_string()),
            None => Kind::Exact(normalize(prefix).to_string()),
        };
        Ok(Self::new(raw, kind))
    }

    fn new(raw: &str, kind: Kind) -> Self {
        Self {
            raw: raw.to_string(),
            kind,
        }
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, path: &str) -> bool {
        let path = normalize(path);
        match &self.kind {
            Kind::Any => true,
            Kind::Exact(exact) => path == exact,
            Kind::Subtree(prefix) => in_subtree(prefix, path),
            Kind::Segment(prefix) => path
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
                .is_some_and(|rest| !rest.is_empty() && !rest.contains('/')),
        }
    }

    /// Whether every path matched by `other` is also matched by `self`.
    pub fn covers(&self, other: &PathPattern) -> bool {
        match (&self.kind, &other.kind) {
            (Kind::Any, _) => true,
            (_, Kind::Any) => false,
            (Kind::Subtree(p), Kind::Exact(q) | Kind::Segment(q) | Kind::Subtree(q)) => {
                in_subtree(p, q)
            }
            (Kind::Segment(_), Kind::Exact(q)) => self.matches(q),
            (Kind::Segment(p), Kind::Segment(q)) => p == q,
            (Kind::Exact(p), Kind::Exact(q)) => p == q,
            _ => false,
        }
    }
}

impl std::fmt::Display for PathPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Drop one trailing slash, except on the root path.
fn normalize(path: &str) -> &str {
    if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}

fn in_subtree(prefix: &str, path: &str) -> bool {
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}
