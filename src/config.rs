//! Runtime configuration loading from environment variables.
//!
//! All configuration values are loaded from `DETBOX_*` environment variables
//! with sensible defaults. Invalid numbers fall back to defaults without
//! crashing; only an unreadable or malformed rules file is an error.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `DETBOX_NAMESPACE_PREFIX` | `sandbox/` | Package prefix for remapped classes |
//! | `DETBOX_COST_BUDGET` | 10000000 | Overall cost budget per invocation |
//! | `DETBOX_MAX_STACK_DEPTH` | 256 | Sandboxed call depth limit (floor 8) |
//! | `DETBOX_RANDOM_SEED` | 0 | Seed of the deterministic random source |
//! | `DETBOX_RULES_FILE` | unset | TOML document with `[[rule]]` and `[[fixup]]` tables |
//! | `DETBOX_CLASS_PATH` | `.` | Class directories, separated like `PATH` |
//! | `DETBOX_VISIBLE_ANNOTATIONS` | unset | Comma-separated annotation types to retain |
//! | `DETBOX_LOG_FORMAT` | `json` | `json` or `pretty` |
//! | `DETBOX_LOG_LEVEL` | `warn` | `EnvFilter` directive |

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::hierarchy::{
    ChainResolver, ClassResolver, DirectoryResolver, HierarchyError, SandboxConfig,
    DEFAULT_COST_BUDGET, DEFAULT_MAX_STACK_DEPTH, DEFAULT_NAMESPACE_PREFIX,
};
use crate::rules::{FixupPolicy, RuleCatalog, RuleError};
use crate::telemetry::{LogConfig, LogFormat};

/// Stack depth below which ordinary tasks cannot run.
pub const MIN_STACK_DEPTH: usize = 8;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read rules file {path}: {source}")]
    RulesFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid rules file {path}: {source}")]
    Rules {
        path: PathBuf,
        #[source]
        source: RuleError,
    },

    #[error(transparent)]
    Invalid(#[from] HierarchyError),
}

/// Effective configuration summary (serializable).
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub namespace_prefix: String,
    pub cost_budget: u64,
    pub max_stack_depth: usize,
    pub random_seed: u64,
    pub rules_file: Option<PathBuf>,
    pub rule_count: usize,
    pub fixup_count: usize,
    pub class_path: Vec<PathBuf>,
    pub visible_annotations: Vec<String>,
    pub log_format: &'static str,
    pub log_level: String,
}

/// All configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub sandbox: SandboxConfig,
    pub rules_file: Option<PathBuf>,
    pub class_path: Vec<PathBuf>,
    pub logging: LogConfig,
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Namespace prefix, normalized to end in `/`. Dots become slashes.
fn load_namespace_prefix() -> String {
    match std::env::var("DETBOX_NAMESPACE_PREFIX") {
        Ok(val) if !val.trim().is_empty() => {
            let mut prefix = val.trim().replace('.', "/");
            if !prefix.ends_with('/') {
                prefix.push('/');
            }
            prefix
        }
        _ => DEFAULT_NAMESPACE_PREFIX.to_string(),
    }
}

/// Read a rules document. Namespace rules and fixups share one file; the
/// fixups are placed ahead of the standard set.
pub fn load_rules_file(path: &Path) -> Result<(RuleCatalog, FixupPolicy), ConfigError> {
    let source = std::fs::read_to_string(path).map_err(|source| ConfigError::RulesFile {
        path: path.to_path_buf(),
        source,
    })?;
    let rules_error = |source| ConfigError::Rules { path: path.to_path_buf(), source };
    let catalog = RuleCatalog::from_toml(&source).map_err(rules_error)?;
    let fixups = FixupPolicy::from_toml(&source).map_err(rules_error)?;
    Ok((catalog, FixupPolicy::standard().overlay(fixups)))
}

fn load_class_path() -> Vec<PathBuf> {
    match std::env::var_os("DETBOX_CLASS_PATH") {
        Some(val) if !val.is_empty() => std::env::split_paths(&val).collect(),
        _ => vec![PathBuf::from(".")],
    }
}

fn load_logging() -> LogConfig {
    let defaults = LogConfig::default();
    let format = std::env::var("DETBOX_LOG_FORMAT")
        .ok()
        .and_then(|v| LogFormat::parse(&v))
        .unwrap_or(defaults.format);
    let level = std::env::var("DETBOX_LOG_LEVEL")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(defaults.level);
    LogConfig { format, level, output_path: None }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid numeric values fall back to safe defaults.
pub fn load() -> Result<EnvConfig, ConfigError> {
    let cost_budget = parse_u64("DETBOX_COST_BUDGET", DEFAULT_COST_BUDGET).max(1);
    let max_stack_depth = parse_usize("DETBOX_MAX_STACK_DEPTH", DEFAULT_MAX_STACK_DEPTH);
    let max_stack_depth = max_stack_depth.max(MIN_STACK_DEPTH);
    let random_seed = parse_u64("DETBOX_RANDOM_SEED", 0);

    let mut sandbox = SandboxConfig::default()
        .with_namespace_prefix(&load_namespace_prefix())
        .with_cost_budget(cost_budget)
        .with_max_stack_depth(max_stack_depth)
        .with_random_seed(random_seed);

    let rules_file = std::env::var_os("DETBOX_RULES_FILE")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);
    if let Some(path) = &rules_file {
        let (catalog, fixups) = load_rules_file(path)?;
        sandbox = sandbox.with_rules(catalog).with_fixups(fixups);
    }

    if let Ok(val) = std::env::var("DETBOX_VISIBLE_ANNOTATIONS") {
        for name in val.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            sandbox = sandbox.with_visible_annotation(name);
        }
    }

    sandbox.validate()?;

    Ok(EnvConfig {
        sandbox,
        rules_file,
        class_path: load_class_path(),
        logging: load_logging(),
    })
}

impl EnvConfig {
    /// Resolver over every class path entry, searched in order.
    pub fn resolver(&self) -> Arc<dyn ClassResolver> {
        let mut resolvers: Vec<Arc<dyn ClassResolver>> = self
            .class_path
            .iter()
            .map(|p| Arc::new(DirectoryResolver::new(p.clone())) as Arc<dyn ClassResolver>)
            .collect();
        if resolvers.len() == 1 {
            return resolvers.remove(0);
        }
        Arc::new(ChainResolver::new(resolvers))
    }

    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            namespace_prefix: self.sandbox.namespace_prefix.clone(),
            cost_budget: self.sandbox.cost_budget,
            max_stack_depth: self.sandbox.max_stack_depth,
            random_seed: self.sandbox.random_seed,
            rules_file: self.rules_file.clone(),
            rule_count: self.sandbox.rules.rules.len(),
            fixup_count: self.sandbox.fixups.len(),
            class_path: self.class_path.clone(),
            visible_annotations: self.sandbox.visible_annotations.iter().cloned().collect(),
            log_format: self.logging.format.as_str(),
            log_level: self.logging.level.clone(),
        }
    }
}
