//! Config CLI subcommands: show, defaults.
//!
//! These commands read configuration directly from environment variables.

use crate::config::{self, EffectiveConfig, MIN_STACK_DEPTH};
use crate::hierarchy::{DEFAULT_COST_BUDGET, DEFAULT_MAX_STACK_DEPTH, DEFAULT_NAMESPACE_PREFIX};

use super::{EXIT_CONFIG, EXIT_OK};

/// Print effective config as key-value pairs to stdout, or as JSON.
pub fn run_show(json: bool) -> i32 {
    let env = match config::load() {
        Ok(env) => env,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return EXIT_CONFIG;
        }
    };
    let cfg = env.effective_config();
    if json {
        match serde_json::to_string_pretty(&cfg) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Cannot serialize configuration: {}", e);
                return EXIT_CONFIG;
            }
        }
    } else {
        print_config(&cfg);
    }
    EXIT_OK
}

/// Print default config values (no env overrides) to stdout.
pub fn run_defaults() {
    println!("DETBOX_NAMESPACE_PREFIX={}", DEFAULT_NAMESPACE_PREFIX);
    println!("DETBOX_COST_BUDGET={}", DEFAULT_COST_BUDGET);
    println!("DETBOX_MAX_STACK_DEPTH={} (minimum {})", DEFAULT_MAX_STACK_DEPTH, MIN_STACK_DEPTH);
    println!("DETBOX_RANDOM_SEED=0");
    println!("DETBOX_CLASS_PATH=.");
    println!("DETBOX_LOG_FORMAT=json");
    println!("DETBOX_LOG_LEVEL=warn");
}

fn print_config(cfg: &EffectiveConfig) {
    println!("DETBOX_NAMESPACE_PREFIX={}", cfg.namespace_prefix);
    println!("DETBOX_COST_BUDGET={}", cfg.cost_budget);
    println!("DETBOX_MAX_STACK_DEPTH={}", cfg.max_stack_depth);
    println!("DETBOX_RANDOM_SEED={}", cfg.random_seed);
    match &cfg.rules_file {
        Some(path) => println!("DETBOX_RULES_FILE={}", path.display()),
        None => println!("DETBOX_RULES_FILE="),
    }
    let class_path: Vec<String> = cfg.class_path.iter().map(|p| p.display().to_string()).collect();
    println!("DETBOX_CLASS_PATH={}", class_path.join(":"));
    println!("DETBOX_VISIBLE_ANNOTATIONS={}", cfg.visible_annotations.join(","));
    println!("DETBOX_LOG_FORMAT={}", cfg.log_format);
    println!("DETBOX_LOG_LEVEL={}", cfg.log_level);
    println!("# rules={} fixups={}", cfg.rule_count, cfg.fixup_count);
}
