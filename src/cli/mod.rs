//! CLI module for the `detbox` binary.
//!
//! Every command builds a root sandbox from `DETBOX_*` configuration and
//! prints its result to stdout. Diagnostics go to stderr.
//!
//! ## Usage
//!
//! ```bash
//! detbox run com.acme.Task '{"type":"long","value":1234}'
//! detbox inspect com.acme.Task
//! detbox annotations com.acme.UserData
//! detbox config show
//! ```

pub mod config_cmd;
pub mod inspect_cmd;
pub mod run_cmd;

use crate::config::{self, EnvConfig};
use crate::hierarchy::SandboxNode;

/// Exit code for success.
pub const EXIT_OK: i32 = 0;
/// Exit code when the command ran but the task or lookup failed.
pub const EXIT_FAILURE: i32 = 1;
/// Exit code for configuration or usage errors.
pub const EXIT_CONFIG: i32 = 2;

/// Load configuration and create the root node, reporting errors on stderr.
pub(crate) fn open_root() -> Result<(EnvConfig, SandboxNode), i32> {
    let env = config::load().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        EXIT_CONFIG
    })?;
    let root = SandboxNode::create_root(env.sandbox.clone(), env.resolver()).map_err(|e| {
        eprintln!("Cannot create sandbox: {}", e);
        EXIT_CONFIG
    })?;
    Ok((env, root))
}
