//! Compile OpenAPI documents into Effect Schema TypeScript clients.
//!
//! The library entry point is [`generate`]; the `effect-codegen` binary wraps
//! it in a `sync` command that reads a local or remote document and writes
//! the generated modules to disk.

#![forbid(unsafe_code)]
#![deny(unused_must_use, dead_code, missing_debug_implementations)]
#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro
)]

use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

mod cli;
pub mod config;
pub mod error;
pub mod openapi;

pub use error::{GenError, Result};
pub use openapi::{GenerateOptions, GeneratedClient, GeneratedFile, OutputKind, generate};

/// Environment variable controlling log output.
pub const LOG_ENV: &str = "EFFECT_CODEGEN_LOG";

/// Run the command line with `args` (including the program name) and return
/// the process exit code.
pub fn run_cli(args: Vec<String>) -> i32 {
    init_tracing();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Failed to create tokio runtime: {err}");
            return 1;
        }
    };

    runtime.block_on(cli::dispatch(args))
}

pub(crate) fn init_tracing() {
    let crate_root = module_path!().to_string();

    // EFFECT_CODEGEN_LOG controls log level: "trace", "debug", "info", "warn", "error"
    // or a full tracing filter spec like "effect_codegen=debug,reqwest=warn"
    let filter = match std::env::var(LOG_ENV) {
        Ok(level) if is_plain_level(&level) => {
            format!("{crate_root}={level}")
        }
        Ok(spec) => spec,
        Err(_) => format!("{crate_root}=info"),
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_filter(EnvFilter::new(filter));

    if tracing_subscriber::registry()
        .with(fmt_layer)
        .try_init()
        .is_err()
    {
        eprintln!("Warning: tracing subscriber already initialized");
    }
}

fn is_plain_level(s: &str) -> bool {
    matches!(
        s.to_ascii_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_levels() {
        assert!(is_plain_level("debug"));
        assert!(is_plain_level("WARN"));
        assert!(!is_plain_level("effect_codegen=debug"));
        assert!(!is_plain_level("verbose"));
    }
}
