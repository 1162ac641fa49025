// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Role Gate - role-based authorization for HTTP requests
//!
//! Verifies bearer tokens from an OIDC provider, maps the roles they carry
//! to `ROLE_*` authorities, and decides each request against an ordered
//! table of path rules.
//!
//! ## Modules
//!
//! - `api` - Demo HTTP handlers and health checks (Axum)
//! - `auth` - Claims extraction, token verification, request pipeline
//! - `config` - Environment settings
//! - `gate` - Path patterns, rule tables and decisions
//! - `state` - Shared application state

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod gate;
pub mod state;
