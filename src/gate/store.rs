// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Process-wide holder of the active rule table.
//!
//! Readers take a snapshot per request and never lock. A reload builds a
//! complete new table first and swaps it in whole, so a request sees either
//! the old table or the new one.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::http::Method;

use super::{Decision, RuleTable};
use crate::auth::Principal;
use crate::error::ConfigError;

#[derive(Clone)]
pub struct RuleStore {
    current: Arc<ArcSwap<RuleTable>>,
    /// File the table was loaded from, if any
    source: Option<PathBuf>,
}

impl RuleStore {
    /// Store with a fixed table and no reload source.
    pub fn new(table: RuleTable) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(table)),
            source: None,
        }
    }

    /// Load and validate the table from a rule file, remembering the path for
    /// reloads.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let table = RuleTable::load(path)?;
        Ok(Self {
            current: Arc::new(ArcSwap::from_pointee(table)),
            source: Some(path.to_path_buf()),
        })
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Snapshot of the active table.
    pub fn current(&self) -> Arc<RuleTable> {
        self.current.load_full()
    }

    /// Decide against the active table.
    pub fn authorize(&self, path: &str, method: &Method, principal: Option<&Principal>) -> Decision {
        self.current.load().authorize(path, method, principal)
    }

    /// Swap in a new table.
    pub fn replace(&self, table: RuleTable) {
        self.current.store(Arc::new(table));
    }

    /// Re-read the rule file and swap in the result.
    ///
    /// On any error the active table is left untouched. Returns the rule count
    /// of the new table.
    pub fn reload(&self) -> Result<usize, ConfigError> {
        let path = self.source.as_ref().ok_or(ConfigError::NoRuleSource)?;
        let table = RuleTable::load(path)?;
        let count = table.len();
        self.replace(table);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::Rule;

    const OPEN: &str = r#"{ "rules": [ { "pattern": "/**", "access": "public" } ] }"#;
    const CLOSED: &str = r#"{ "rules": [
        { "pattern": "/", "access": "public" },
        { "pattern": "/**", "access": "authenticated" }
    ] }"#;

    #[test]
    fn authorize_uses_active_table() {
        let store = RuleStore::new(RuleTable::new(vec![Rule::public("/**").unwrap()]));
        assert_eq!(store.authorize("/x", &Method::GET, None), Decision::Allow);

        store.replace(RuleTable::new(vec![Rule::authenticated("/**").unwrap()]));
        assert_eq!(store.authorize("/x", &Method::GET, None), Decision::Challenge);
    }

    #[test]
    fn snapshot_survives_swap() {
        let store = RuleStore::new(RuleTable::new(vec![Rule::public("/**").unwrap()]));
        let before = store.current();
        store.replace(RuleTable::new(vec![]));

        assert_eq!(before.len(), 1);
        assert!(store.current().is_empty());
    }

    #[test]
    fn reload_swaps_in_new_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        std::fs::write(&path, OPEN).unwrap();

        let store = RuleStore::from_file(&path).unwrap();
        assert_eq!(store.source(), Some(path.as_path()));
        assert_eq!(store.authorize("/private", &Method::GET, None), Decision::Allow);

        std::fs::write(&path, CLOSED).unwrap();
        assert_eq!(store.reload().unwrap(), 2);
        assert_eq!(store.authorize("/private", &Method::GET, None), Decision::Challenge);
    }

    #[test]
    fn failed_reload_keeps_previous_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        std::fs::write(&path, OPEN).unwrap();
        let store = RuleStore::from_file(&path).unwrap();

        std::fs::write(&path, r#"{ "rules": [ { "pattern": "nope", "access": "public" } ] }"#)
            .unwrap();
        assert!(matches!(store.reload(), Err(ConfigError::InvalidPattern { .. })));
        assert_eq!(store.current().len(), 1);
        assert_eq!(store.authorize("/private", &Method::GET, None), Decision::Allow);
    }

    #[test]
    fn reload_without_source_is_an_error() {
        let store = RuleStore::new(RuleTable::gateway_default().unwrap());
        assert!(matches!(store.reload(), Err(ConfigError::NoRuleSource)));
    }

    #[test]
    fn clones_share_the_table() {
        let store = RuleStore::new(RuleTable::new(vec![]));
        let clone = store.clone();
        store.replace(RuleTable::gateway_default().unwrap());
        assert_eq!(clone.current().len(), RuleTable::gateway_default().unwrap().len());
    }
}
