// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Startup configuration errors.
//!
//! Everything here is raised while loading settings or the rule table. The
//! gate itself assumes a table that already passed these checks.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid path pattern '{pattern}': {reason}")]
    InvalidPattern {
        pattern: String,
        reason: &'static str,
    },

    #[error("Invalid HTTP method '{method}' in rule '{pattern}'")]
    InvalidMethod { pattern: String, method: String },

    #[error("Invalid authority name '{authority}' in rule '{pattern}'")]
    InvalidAuthority { pattern: String, authority: String },

    #[error("Rule '{pattern}' requires an authority but lists none")]
    EmptyAuthorities { pattern: String },

    #[error("Rule '{pattern}' lists several authorities without \"match\": \"all\" or \"any\"")]
    MissingMatchMode { pattern: String },

    #[error("Rule '{pattern}' lists authorities but its access is not \"authority\"")]
    UnexpectedAuthorities { pattern: String },

    #[error("Rule #{index} '{pattern}' duplicates rule #{previous}")]
    DuplicateRule {
        index: usize,
        previous: usize,
        pattern: String,
    },

    #[error("Rule '{pattern}' names unknown authority '{authority}'")]
    UnknownAuthority { pattern: String, authority: String },

    #[error("Failed to read rule file {}: {source}", path.display())]
    ReadRules {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse rule file: {0}")]
    ParseRules(#[from] serde_json::Error),

    #[error("Rule table has no backing file to reload from")]
    NoRuleSource,

    #[error("Missing required setting {0}")]
    MissingSetting(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },
}
