//! Negotiator configuration stored as TOML (default `.negotiator/config.toml`).

use std::fs;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Negotiator configuration (TOML).
///
/// Intended to be edited by humans. Missing fields default to the values the
/// hosted service runs with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NegotiatorConfig {
    /// Round budget: reviews allowed before completion is forced.
    pub max_rounds: u32,

    pub responder: ResponderConfig,

    pub persistence: PersistenceConfig,
}

/// Settings for the built-in canned responders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ResponderConfig {
    /// Simulated latency before the first proposal.
    pub proposal_delay_ms: u64,
    /// Simulated latency before each revised proposal.
    pub revision_delay_ms: u64,
    /// Simulated latency before each review.
    pub review_delay_ms: u64,
    /// First round (1-indexed) on which the canned reviewer approves.
    pub approve_from_round: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceBackend {
    /// Append-only JSON lines under `persistence.dir`.
    Jsonl,
    /// Keep records in process memory (lost on exit).
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PersistenceConfig {
    pub backend: PersistenceBackend,
    /// Directory for the `jsonl` backend.
    pub dir: PathBuf,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            proposal_delay_ms: 1000,
            revision_delay_ms: 1200,
            review_delay_ms: 1500,
            approve_from_round: 3,
        }
    }
}

impl ResponderConfig {
    /// Zero latency; used by tests and local smoke runs.
    pub fn instant() -> Self {
        Self {
            proposal_delay_ms: 0,
            revision_delay_ms: 0,
            review_delay_ms: 0,
            ..Self::default()
        }
    }

    pub fn proposal_delay(&self) -> Duration {
        Duration::from_millis(self.proposal_delay_ms)
    }

    pub fn revision_delay(&self) -> Duration {
        Duration::from_millis(self.revision_delay_ms)
    }

    pub fn review_delay(&self) -> Duration {
        Duration::from_millis(self.review_delay_ms)
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: PersistenceBackend::Jsonl,
            dir: PathBuf::from(".negotiator").join("records"),
        }
    }
}

impl Default for NegotiatorConfig {
    fn default() -> Self {
        Self {
            max_rounds: 4,
            responder: ResponderConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

impl NegotiatorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_rounds == 0 {
            return Err(anyhow!("max_rounds must be > 0"));
        }
        if self.responder.approve_from_round == 0 {
            return Err(anyhow!("responder.approve_from_round must be > 0"));
        }
        if self.persistence.backend == PersistenceBackend::Jsonl
            && self.persistence.dir.as_os_str().is_empty()
        {
            return Err(anyhow!("persistence.dir must be set for the jsonl backend"));
        }
        Ok(())
    }

    /// The round budget as a validated non-zero value.
    pub fn round_budget(&self) -> Result<NonZeroU32> {
        NonZeroU32::new(self.max_rounds).ok_or_else(|| anyhow!("max_rounds must be > 0"))
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `NegotiatorConfig::default()`.
pub fn load_config(path: &Path) -> Result<NegotiatorConfig> {
    if !path.exists() {
        let cfg = NegotiatorConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: NegotiatorConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &NegotiatorConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, NegotiatorConfig::default());
        assert_eq!(cfg.max_rounds, 4);
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let cfg = NegotiatorConfig {
            max_rounds: 6,
            responder: ResponderConfig::instant(),
            persistence: PersistenceConfig {
                backend: PersistenceBackend::Memory,
                dir: PathBuf::from("unused"),
            },
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "max_rounds = 2\n\n[responder]\napprove_from_round = 1\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_rounds, 2);
        assert_eq!(cfg.responder.approve_from_round, 1);
        assert_eq!(cfg.responder.review_delay_ms, 1500);
        assert_eq!(cfg.persistence, PersistenceConfig::default());
    }

    #[test]
    fn zero_round_budget_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "max_rounds = 0\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("max_rounds must be > 0"));
    }

    #[test]
    fn round_budget_matches_max_rounds() {
        let cfg = NegotiatorConfig::default();
        assert_eq!(cfg.round_budget().expect("budget").get(), 4);
    }
}
