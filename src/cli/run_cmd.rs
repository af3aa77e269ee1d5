//! `detbox run`: invoke a task class once and print its summary.

use crate::bridge::{self, HostValue};

use super::{open_root, EXIT_CONFIG, EXIT_FAILURE, EXIT_OK};

/// Parse the optional JSON input argument. Absent input is `null`.
pub fn parse_input(raw: Option<&str>) -> Result<HostValue, serde_json::Error> {
    match raw {
        None => Ok(HostValue::Null),
        Some(text) => serde_json::from_str(text),
    }
}

/// Returns 0 when the task produced a result, 1 when the summary carries a
/// failure, 2 for configuration or input errors.
pub fn run(entry: &str, raw_input: Option<&str>) -> i32 {
    let input = match parse_input(raw_input) {
        Ok(input) => input,
        Err(e) => {
            eprintln!("Invalid input JSON: {}", e);
            return EXIT_CONFIG;
        }
    };
    let (_, root) = match open_root() {
        Ok(opened) => opened,
        Err(code) => return code,
    };

    let summary = match bridge::invoke(&root, entry, &input) {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("Sandbox unavailable: {}", e);
            return EXIT_FAILURE;
        }
    };
    match serde_json::to_string_pretty(&summary) {
        Ok(text) => println!("{}", text),
        Err(e) => {
            eprintln!("Cannot serialize summary: {}", e);
            return EXIT_FAILURE;
        }
    }
    if summary.is_success() {
        EXIT_OK
    } else {
        EXIT_FAILURE
    }
}
