use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::Args;
use tracing::{debug, info};

use crate::cli::{format_elapsed_ms, run_cli_async};
use crate::config::{ConfigFile, SpecSource, SyncConfig, SyncSection};
use crate::error::{GenError, Result};
use crate::openapi::{GeneratedClient, generate};

const FETCH_TIMEOUT_SECS: u64 = 30;

#[derive(Args, Debug, Clone, Default)]
pub struct SyncArgs {
    #[arg(long, value_name = "PATH", help = "Path to a local OpenAPI document (JSON or YAML)")]
    pub spec: Option<PathBuf>,
    #[arg(long, value_name = "URL", help = "URL of a remote OpenAPI document")]
    pub url: Option<String>,
    #[arg(long, short = 'n', help = "Name of the aggregate client. Defaults to Api")]
    pub name: Option<String>,
    #[arg(long, short = 'o', value_name = "DIR", help = "Output directory. Defaults to ./generated")]
    pub out: Option<PathBuf>,
    #[arg(
        long = "import-extension",
        value_name = "EXT",
        help = "Extension for relative imports (.js by default, `none` to omit)"
    )]
    pub import_extension: Option<String>,
    #[arg(long = "type-only", help = "Emit plain TypeScript types instead of Effect schemas")]
    pub type_only: bool,
    #[arg(long, help = "Emit structs instead of classes for named objects")]
    pub structs: bool,
    #[arg(long, short = 'c', value_name = "FILE", help = "TOML config file with a [sync] table")]
    pub config: Option<PathBuf>,
}

impl SyncArgs {
    fn into_config(self) -> Result<SyncConfig> {
        let flags = SyncSection {
            spec: self.spec,
            url: self.url,
            name: self.name,
            out: self.out,
            import_extension: self.import_extension,
            type_only: self.type_only.then_some(true),
            structs: self.structs.then_some(true),
        };
        let file = match &self.config {
            Some(path) => ConfigFile::load(path)?.sync,
            None => SyncSection::default(),
        };
        flags.merge(file).resolve()
    }
}

pub async fn run(args: SyncArgs) -> i32 {
    run_cli_async(|| run_inner(args)).await
}

async fn run_inner(args: SyncArgs) -> Result<()> {
    let start_time = Instant::now();
    let config = args.into_config()?;

    let text = match &config.source {
        SpecSource::File(path) => tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GenError::io("read", path, e))?,
        SpecSource::Url(url) => fetch_spec(url).await?,
    };

    let client = generate(&text, &config.options)?;
    write_files(&config.out_dir, &client).await?;

    println!(
        "✅ Generated {} files in {} ({})",
        client.files.len(),
        config.out_dir.display(),
        format_elapsed_ms(start_time)
    );
    Ok(())
}

async fn fetch_spec(url: &str) -> Result<String> {
    let fetch_error = |message: String| GenError::Fetch {
        url: url.to_string(),
        message,
    };
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
        .build()
        .map_err(|e| fetch_error(format!("Failed to build HTTP client: {e}")))?;

    debug!(%url, "Fetching OpenAPI document");
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| fetch_error(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(fetch_error(format!("server responded with {status}")));
    }
    let text = response.text().await.map_err(|e| fetch_error(e.to_string()))?;
    info!(%url, bytes = text.len(), "Fetched OpenAPI document");
    Ok(text)
}

/// Write every generated file, replacing existing ones.
async fn write_files(out_dir: &Path, client: &GeneratedClient) -> Result<()> {
    tokio::fs::create_dir_all(out_dir)
        .await
        .map_err(|e| GenError::io("create", out_dir, e))?;
    for file in &client.files {
        let path = out_dir.join(&file.path);
        tokio::fs::write(&path, &file.contents)
            .await
            .map_err(|e| GenError::io("write", &path, e))?;
        info!(path = %path.display(), bytes = file.contents.len(), "Wrote file");
    }
    Ok(())
}
