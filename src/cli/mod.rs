pub mod sync;

use std::time::Instant;

use clap::{CommandFactory, Parser, Subcommand};

use crate::error::Result;

#[derive(Parser, Debug)]
#[command(
    name = "effect-codegen",
    version,
    about = "Generate Effect Schema TypeScript clients from OpenAPI documents"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 🔄 Generate client modules from an OpenAPI document
    Sync(sync::SyncArgs),
}

pub async fn run_cli_async<F, Fut>(f: F) -> i32
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    match f().await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("❌ {err}");
            1
        }
    }
}

pub async fn dispatch(args: Vec<String>) -> i32 {
    match Cli::try_parse_from(args) {
        Ok(cli) => match cli.command {
            Some(Commands::Sync(args)) => sync::run(args).await,
            None => {
                let mut cmd = Cli::command();
                let _ = cmd.print_help();
                println!();
                0
            }
        },
        Err(e) => {
            let code = e.exit_code();
            let _ = e.print();
            code
        }
    }
}

pub fn format_elapsed_ms(start: Instant) -> String {
    let elapsed = start.elapsed();
    if elapsed.as_secs() == 0 {
        return format!("{}ms", elapsed.as_millis());
    }
    format!("{}s {}ms", elapsed.as_secs(), elapsed.subsec_millis())
}
