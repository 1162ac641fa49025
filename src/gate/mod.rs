// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authorization Gate
//!
//! Decides, per request, whether the principal (if any) may reach a path.
//!
//! The decision is a pure function of the rule table, the request path and
//! method, and the principal. It never logs and never blocks; callers report
//! refusals themselves.
//!
//! ## Evaluation
//!
//! 1. Walk the rules in declaration order
//! 2. The first rule matching path and method decides
//! 3. Without a match, the table's default policy decides
//!
//! | Access          | Principal present          | Principal absent |
//! |-----------------|----------------------------|------------------|
//! | public          | Allow                      | Allow            |
//! | authenticated   | Allow                      | Challenge        |
//! | authority       | Allow if satisfied, Deny   | Challenge        |
//! | default `deny`  | Deny                       | Challenge        |

pub mod pattern;
pub mod reload;
pub mod rules;
pub mod store;

use axum::http::Method;
use serde::Serialize;

use crate::auth::Principal;

pub use pattern::PathPattern;
pub use reload::RuleReloader;
pub use rules::{Access, DefaultPolicy, MatchMode, Requirement, Rule, RuleTable};
pub use store::RuleStore;

/// Outcome of an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// Forward the request
    Allow,
    /// Authenticated, but not permitted (403)
    Deny,
    /// Authentication needed (401 or login redirect)
    Challenge,
}

impl RuleTable {
    /// Decide whether `principal` may perform `method` on `path`.
    pub fn authorize(&self, path: &str, method: &Method, principal: Option<&Principal>) -> Decision {
        let access = match self.first_match(path, method) {
            Some((_, rule)) => rule.access(),
            None => return self.default_decision(principal),
        };

        match (access, principal) {
            (Access::Public, _) => Decision::Allow,
            (_, None) => Decision::Challenge,
            (Access::Authenticated, Some(_)) => Decision::Allow,
            (Access::Authority(req), Some(p)) if req.is_satisfied_by(p) => Decision::Allow,
            (Access::Authority(_), Some(_)) => Decision::Deny,
        }
    }

    fn default_decision(&self, principal: Option<&Principal>) -> Decision {
        match (self.default_policy(), principal) {
            (_, None) => Decision::Challenge,
            (DefaultPolicy::Authenticated, Some(_)) => Decision::Allow,
            (DefaultPolicy::Deny, Some(_)) => Decision::Deny,
        }
    }
}
