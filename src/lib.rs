//! # Spoorgids
//!
//! A conversational-assistant skill for Dutch public-transit queries.
//!
//! Spoorgids turns loosely specified travel intent ("morgen om 9 van
//! Amsterdam naar Utrecht, zonder overstap") into precise calls against the
//! NS rail-information API, resolves ambiguous station names, applies hard
//! and soft constraints, and returns ranked, cached results as JSON
//! envelopes a chat layer can render directly.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌─────────┐   ┌──────────┐   ┌─────────┐
//! │ Heuristics │──▶│ Planner │──▶│ Resolver │──▶│ Gateway │
//! │ (free text)│   │ (plan)  │   │ (codes)  │   │ + cache │
//! └───────────┘   └─────────┘   └──────────┘   └────┬────┘
//!                                                   │
//!                      ┌────────────────────────────┤
//!                      ▼                            ▼
//!               ┌─────────────┐            ┌──────────────┐
//!               │ Constraints │            │ Normalization │
//!               │ + ranking   │◀───────────│ (canonical)  │
//!               └──────┬──────┘            └──────────────┘
//!                      ▼
//!               result envelope
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! spoor ask "van Amsterdam Centraal naar Utrecht morgen om 9"
//! spoor exec trips.search --args '{"from": "ASD", "to": "UT"}'
//! spoor stations "den haag"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Typed error taxonomy and envelopes |
//! | [`models`] | Canonical data types |
//! | [`gateway`] | Upstream HTTP client with mirror affinity |
//! | [`normalize`] | Untyped payload → canonical records |
//! | [`resolver`] | Fuzzy station-name resolution |
//! | [`heuristics`] | Route/directness/time extraction from Dutch text |
//! | [`planner`] | Intent → allow-listed upstream plan |
//! | [`constraints`] | Hard filtering and soft ranking |
//! | [`cache`] | TTL result cache |
//! | [`recommend`] | Deterministic trip recommendation |
//! | [`execute`] | The orchestrating [`Skill`] |

pub mod cache;
pub mod config;
pub mod constraints;
pub mod error;
pub mod execute;
pub mod gateway;
pub mod heuristics;
pub mod models;
pub mod normalize;
pub mod planner;
pub mod recommend;
pub mod resolver;

pub use execute::Skill;
