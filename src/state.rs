// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use tracing::{info, warn};

use crate::auth::{GatePipeline, JwksManager, JwksVerifier, SharedSecretVerifier, TokenVerifier};
use crate::config::{Settings, VerifierSettings, JWKS_URL_ENV};
use crate::error::ConfigError;
use crate::gate::{RuleStore, RuleTable};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: GatePipeline,
    /// Present in JWKS mode, for health reporting
    pub jwks: Option<JwksManager>,
}

impl AppState {
    pub fn new(pipeline: GatePipeline) -> Self {
        Self {
            pipeline,
            jwks: None,
        }
    }

    /// Build the verifier, rule store and pipeline described by `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        let rules = match settings.rules_file {
            Some(ref path) => RuleStore::from_file(path)?,
            None => {
                info!("No rule file configured, using built-in gateway table");
                RuleStore::new(RuleTable::gateway_default()?)
            }
        };

        let checks = settings.claim_checks();
        let mut jwks = None;
        let verifier: Arc<dyn TokenVerifier> = match settings.verifier {
            VerifierSettings::Jwks { ref jwks_url } => {
                let manager =
                    JwksManager::new(jwks_url.as_str()).map_err(|e| ConfigError::InvalidSetting {
                        name: JWKS_URL_ENV,
                        reason: e.to_string(),
                    })?;
                jwks = Some(manager.clone());
                Arc::new(JwksVerifier::new(manager, checks))
            }
            VerifierSettings::SharedSecret(ref secret) => {
                Arc::new(SharedSecretVerifier::new(secret.as_bytes(), checks))
            }
            #[cfg(feature = "dev")]
            VerifierSettings::Insecure => {
                warn!("Token signatures are NOT verified, never run this in production");
                Arc::new(crate::auth::InsecureVerifier)
            }
        };

        let table = rules.current();
        if table.is_empty() {
            warn!("Rule table is empty, every request falls to the default policy");
        }
        info!(
            rules = table.len(),
            default = ?table.default_policy(),
            verifier = verifier.name(),
            client_id = %settings.pipeline.role_source.client_id,
            "Authorization gate configured"
        );

        let pipeline = GatePipeline::new(rules, verifier, settings.pipeline.clone());
        Ok(Self { pipeline, jwks })
    }
}
