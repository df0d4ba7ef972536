//! Sync configuration.
//!
//! Settings come from command-line flags layered over an optional TOML file:
//!
//! ```toml
//! [sync]
//! spec = "openapi.yaml"
//! name = "PetStore"
//! out = "src/generated"
//! import-extension = ".js"
//! type-only = false
//! structs = false
//! ```
//!
//! Relative paths in the file are resolved against the file's directory.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{GenError, Result};
use crate::openapi::{DEFAULT_IMPORT_EXTENSION, GenerateOptions, OutputKind};

/// Output directory when neither flag nor file names one.
pub const DEFAULT_OUT_DIR: &str = "generated";

/// Client name when neither flag nor file names one.
pub const DEFAULT_CLIENT_NAME: &str = "Api";

/// The `[sync]` table, also used for the flag values before merging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct SyncSection {
    pub spec: Option<PathBuf>,
    pub url: Option<String>,
    pub name: Option<String>,
    pub out: Option<PathBuf>,
    pub import_extension: Option<String>,
    pub type_only: Option<bool>,
    pub structs: Option<bool>,
}

/// Config file structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub sync: SyncSection,
}

impl ConfigFile {
    /// Load and parse a config file, resolving its relative paths.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| GenError::io("read", path, e))?;
        let mut config: Self = toml::from_str(&contents).map_err(|e| GenError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        let rebase = |p: PathBuf| if p.is_relative() { base.join(p) } else { p };
        config.sync.spec = config.sync.spec.map(rebase);
        config.sync.out = config.sync.out.map(rebase);
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }
}

/// Where the OpenAPI document comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecSource {
    File(PathBuf),
    Url(String),
}

/// Fully resolved settings for one `sync` run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub source: SpecSource,
    pub out_dir: PathBuf,
    pub options: GenerateOptions,
}

/// `none` (or an empty value) disables the extension; a missing dot is added.
fn normalize_extension(extension: &str) -> String {
    match extension.trim() {
        "" | "none" => String::new(),
        ext if ext.starts_with('.') => ext.to_string(),
        ext => format!(".{ext}"),
    }
}

impl SyncSection {
    /// Fill every unset value in `self` from `defaults`.
    pub fn merge(self, defaults: Self) -> Self {
        // A source given on the command line replaces the file's source entirely.
        let (spec, url) = if self.spec.is_some() || self.url.is_some() {
            (self.spec, self.url)
        } else {
            (defaults.spec, defaults.url)
        };
        Self {
            spec,
            url,
            name: self.name.or(defaults.name),
            out: self.out.or(defaults.out),
            import_extension: self.import_extension.or(defaults.import_extension),
            type_only: self.type_only.or(defaults.type_only),
            structs: self.structs.or(defaults.structs),
        }
    }

    /// Validate and apply defaults.
    pub fn resolve(self) -> Result<SyncConfig> {
        let source = match (self.spec, self.url) {
            (Some(path), None) => SpecSource::File(path),
            (None, Some(url)) => SpecSource::Url(url),
            (Some(_), Some(_)) => {
                return Err(GenError::Usage(
                    "Provide either --spec or --url, not both".to_string(),
                ));
            }
            (None, None) => {
                return Err(GenError::Usage(
                    "Missing spec source: provide --spec <path> or --url <url>".to_string(),
                ));
            }
        };

        let output_kind = if self.type_only.unwrap_or(false) {
            OutputKind::TypeOnly
        } else {
            OutputKind::Schema
        };
        Ok(SyncConfig {
            source,
            out_dir: self.out.unwrap_or_else(|| PathBuf::from(DEFAULT_OUT_DIR)),
            options: GenerateOptions {
                output_kind,
                prefer_struct: self.structs.unwrap_or(false),
                client_name: self.name.unwrap_or_else(|| DEFAULT_CLIENT_NAME.to_string()),
                import_extension: self
                    .import_extension
                    .as_deref()
                    .map_or_else(|| DEFAULT_IMPORT_EXTENSION.to_string(), normalize_extension),
            },
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_source_is_exclusive() {
        let both = SyncSection {
            spec: Some("a.json".into()),
            url: Some("https://example.com/openapi.json".into()),
            ..SyncSection::default()
        };
        assert!(matches!(both.resolve(), Err(GenError::Usage(_))));
        assert!(matches!(SyncSection::default().resolve(), Err(GenError::Usage(_))));
    }

    #[test]
    fn test_defaults() {
        let config = SyncSection {
            url: Some("https://example.com/openapi.json".into()),
            ..SyncSection::default()
        }
        .resolve()
        .unwrap();
        assert_eq!(config.source, SpecSource::Url("https://example.com/openapi.json".into()));
        assert_eq!(config.out_dir, PathBuf::from(DEFAULT_OUT_DIR));
        assert_eq!(config.options, GenerateOptions::default());
    }

    #[test]
    fn test_import_extension_values() {
        assert_eq!(normalize_extension("none"), "");
        assert_eq!(normalize_extension(""), "");
        assert_eq!(normalize_extension(".ts"), ".ts");
        assert_eq!(normalize_extension("mjs"), ".mjs");
    }

    #[test]
    fn test_flags_win_over_file() {
        let file = SyncSection {
            spec: Some("from-file.yaml".into()),
            name: Some("FileName".into()),
            type_only: Some(true),
            ..SyncSection::default()
        };
        let flags = SyncSection {
            url: Some("https://example.com/spec.json".into()),
            name: Some("FlagName".into()),
            ..SyncSection::default()
        };
        let merged = flags.merge(file);
        assert_eq!(merged.spec, None, "a flag source replaces the file source");
        assert_eq!(merged.name.as_deref(), Some("FlagName"));
        assert_eq!(merged.type_only, Some(true));
        let config = merged.resolve().unwrap();
        assert_eq!(config.options.output_kind, OutputKind::TypeOnly);
    }

    #[test]
    fn test_load_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("effect-codegen.toml");
        fs::write(
            &path,
            "[sync]\nspec = \"openapi.yaml\"\nname = \"PetStore\"\nimport-extension = \"none\"\nstructs = true\n",
        )
        .unwrap();

        let config = ConfigFile::load(&path).unwrap();
        assert_eq!(config.sync.spec, Some(dir.path().join("openapi.yaml")));
        let resolved = config.sync.resolve().unwrap();
        assert_eq!(resolved.options.client_name, "PetStore");
        assert_eq!(resolved.options.import_extension, "");
        assert!(resolved.options.prefer_struct);
    }

    #[test]
    fn test_invalid_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[sync]\nunknown = 1\n").unwrap();
        assert!(matches!(ConfigFile::load(&path), Err(GenError::Config { .. })));

        let missing = dir.path().join("missing.toml");
        assert!(matches!(ConfigFile::load(&missing), Err(GenError::Io { .. })));
    }
}
