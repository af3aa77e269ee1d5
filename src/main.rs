//! detbox entry point.
//!
//! ## CLI Subcommands
//!
//! - `detbox run <entry> [json-input]` - Invoke a task class
//! - `detbox inspect <class>` - Show a class as the sandbox rewrites it
//! - `detbox annotations <class>` - Show stitched class annotations
//! - `detbox config show|defaults` - Show configuration

use std::process::ExitCode;

use detbox_core::cli::{config_cmd, inspect_cmd, run_cmd, EXIT_CONFIG};
use detbox_core::config;
use detbox_core::telemetry::{init_logging, LogConfig};

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");

    init_tracing();

    let code = match command {
        "run" => match args.get(2) {
            Some(entry) => run_cmd::run(entry, args.get(3).map(|s| s.as_str())),
            None => usage_error("run"),
        },
        "inspect" => match args.get(2) {
            Some(class) => inspect_cmd::run_inspect(class),
            None => usage_error("inspect"),
        },
        "annotations" => match args.get(2) {
            Some(class) => inspect_cmd::run_annotations(class),
            None => usage_error("annotations"),
        },
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => config_cmd::run_show(args.get(3).map(|s| s.as_str()) == Some("--json")),
                "defaults" => {
                    config_cmd::run_defaults();
                    0
                }
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    EXIT_CONFIG
                }
            }
        }
        "help" | "--help" | "-h" => {
            match args.get(2) {
                Some(subcommand) => print_command_help(subcommand),
                None => print_usage(),
            }
            0
        }
        "version" | "--version" | "-V" => {
            println!("detbox {}", env!("CARGO_PKG_VERSION"));
            0
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            EXIT_CONFIG
        }
    };
    ExitCode::from(code as u8)
}

/// Logging is best effort: a bad `DETBOX_LOG_LEVEL` is reported and the
/// command still runs.
fn init_tracing() {
    let log_config = config::load().map(|env| env.logging).unwrap_or_else(|_| LogConfig::default());
    if let Err(e) = init_logging(&log_config) {
        eprintln!("Logging disabled: {}", e);
    }
}

fn usage_error(command: &str) -> i32 {
    eprintln!("Missing argument for '{}'", command);
    print_command_help(command);
    EXIT_CONFIG
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "detbox - deterministic bytecode sandbox v{}

USAGE:
    detbox [COMMAND] [ARGS]

COMMANDS:
    run          Invoke a task class on a JSON input
    inspect      Show a class as the sandbox rewrites it
    annotations  Show the stitched class-level annotations of a class
    config       Show configuration (show, defaults)
    version      Show version information
    help         Show this help message

ENVIRONMENT:
    DETBOX_CLASS_PATH           Class directories (default: .)
    DETBOX_NAMESPACE_PREFIX     Sandbox package prefix (default: sandbox/)
    DETBOX_COST_BUDGET          Cost budget per invocation (default: 10000000)
    DETBOX_MAX_STACK_DEPTH      Call depth limit (default: 256)
    DETBOX_RANDOM_SEED          Seed of the sandboxed random source (default: 0)
    DETBOX_RULES_FILE           TOML rules and fixups
    DETBOX_VISIBLE_ANNOTATIONS  Annotation types to retain, comma-separated
    DETBOX_LOG_FORMAT           json or pretty (default: json)
    DETBOX_LOG_LEVEL            Log filter (default: warn)

EXIT CODES:
    0  Success
    1  Task or lookup failed
    2  Configuration or usage error
",
        version
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "run" => {
            eprintln!(
                "detbox run - Invoke a task class

USAGE:
    detbox run <entry> [json-input]

DESCRIPTION:
    Loads <entry> into a fresh root sandbox, calls its apply method with
    the given input and prints the execution summary as JSON. Input uses
    the host value encoding, e.g. '{{\"type\":\"long\",\"value\":1234}}'.
    Without input the task receives null.

EXAMPLES:
    detbox run com.acme.Multiplier '{{\"type\":\"long\",\"value\":1234}}'
"
            );
        }
        "inspect" => {
            eprintln!(
                "detbox inspect - Show a rewritten class

USAGE:
    detbox inspect <class>

DESCRIPTION:
    Prints the runtime name, policy, digest, rewrite counters and members
    of <class> as loaded in a root sandbox.
"
            );
        }
        "annotations" => {
            eprintln!(
                "detbox annotations - Show stitched annotations

USAGE:
    detbox annotations <class>

DESCRIPTION:
    Prints one annotation per line, sandboxed entries first, then retained
    originals (see DETBOX_VISIBLE_ANNOTATIONS).
"
            );
        }
        "config" => {
            eprintln!(
                "detbox config - Show configuration

USAGE:
    detbox config show [--json]
    detbox config defaults
"
            );
        }
        _ => {
            eprintln!("No help available for '{}'", command);
            print_usage();
        }
    }
}
