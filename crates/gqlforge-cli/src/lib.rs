//! Library interface for the gqlforge CLI

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use gqlforge_codegen::{FileMap, GenerateConfig, GenerateRequest, GeneratorService};
use tracing::{debug, info, warn};

#[derive(Args, Debug, Clone, Default)]
pub struct GenerateArgs {
    /// GraphQL schema file
    #[arg(short, long)]
    pub schema: PathBuf,

    /// Directory the generated project is written to
    #[arg(short, long)]
    pub output: PathBuf,

    /// TOML file with generation settings; flags take precedence
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Go module name
    #[arg(short, long)]
    pub module: Option<String>,

    /// Package of the generated exec file
    #[arg(long)]
    pub exec_package: Option<String>,

    #[arg(long)]
    pub model_package: Option<String>,

    #[arg(long)]
    pub resolver_package: Option<String>,

    /// Package to bind same-named types from (repeatable)
    #[arg(long)]
    pub autobind: Vec<String>,

    /// Custom model binding as `Name=import/path.Type` (repeatable)
    #[arg(long = "model", value_parser = parse_model)]
    pub models: Vec<(String, String)>,

    /// Branch, tag or commit for remote packages
    #[arg(long)]
    pub github_ref: Option<String>,

    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Also write integration test scaffolding under tests/
    #[arg(long)]
    pub generate_tests: bool,

    #[arg(long)]
    pub omit_getters: bool,

    #[arg(long)]
    pub omit_slice_element_pointers: bool,
}

/// Parse `Name=import/path.Type`
pub fn parse_model(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, go_ref)) if !name.is_empty() && go_ref.contains('.') => {
            Ok((name.trim().to_string(), go_ref.trim().to_string()))
        }
        _ => Err(format!("expected Name=import/path.Type, got '{}'", s)),
    }
}

pub fn load_config(path: &Path) -> Result<GenerateConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse config file {}", path.display()))
}

impl GenerateArgs {
    /// Apply explicit flags on top of file settings
    pub fn merge_into(&self, mut config: GenerateConfig) -> GenerateConfig {
        if let Some(module) = &self.module {
            config.module_name = module.clone();
        }
        if let Some(pkg) = &self.exec_package {
            config.package_name = pkg.clone();
        }
        if let Some(pkg) = &self.model_package {
            config.model_package = pkg.clone();
        }
        if let Some(pkg) = &self.resolver_package {
            config.resolver_package = pkg.clone();
        }
        if !self.autobind.is_empty() {
            config.autobind = self.autobind.clone();
        }
        for (name, go_ref) in &self.models {
            config.models.insert(name.clone(), go_ref.clone());
        }
        if self.github_ref.is_some() {
            config.github_ref = self.github_ref.clone();
        }
        if self.github_token.is_some() {
            config.github_token = self.github_token.clone();
        }
        config.generate_tests |= self.generate_tests;
        config.omit_getters |= self.omit_getters;
        config.omit_slice_element_pointers |= self.omit_slice_element_pointers;
        config
    }

    pub fn request(&self) -> Result<GenerateRequest> {
        let schema = fs::read_to_string(&self.schema)
            .with_context(|| format!("Failed to read schema {}", self.schema.display()))?;
        let base = match &self.config {
            Some(path) => load_config(path)?,
            None => GenerateConfig::default(),
        };
        Ok(GenerateRequest {
            schema,
            config: Some(self.merge_into(base)),
            additional_files: BTreeMap::new(),
        })
    }
}

pub async fn handle_generate(args: &GenerateArgs) -> Result<()> {
    let request = args.request()?;
    info!("Generating from {}", args.schema.display());

    let result = GeneratorService::new()
        .generate(&request)
        .await
        .context("Code generation failed")?;
    for error in &result.errors {
        warn!("{}", error);
    }

    let written = write_files(&args.output, &result.files)?;
    info!("Wrote {} files to {}", written, args.output.display());
    Ok(())
}

/// Write a file map below `root`, refusing paths that leave it
pub fn write_files(root: &Path, files: &FileMap) -> Result<usize> {
    for (name, content) in files {
        let relative = Path::new(name);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            bail!("Refusing to write {} outside {}", name, root.display());
        }
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        debug!("wrote {}", path.display());
    }
    Ok(files.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_model() {
        assert_eq!(
            parse_model("User=github.com/acme/api/models.User").unwrap(),
            ("User".to_string(), "github.com/acme/api/models.User".to_string())
        );
        assert!(parse_model("User").is_err());
        assert!(parse_model("=models.User").is_err());
    }

    #[test]
    fn test_flags_override_file_settings() {
        let file = GenerateConfig {
            module_name: "example.com/file".to_string(),
            model_package: "models".to_string(),
            autobind: vec!["github.com/acme/a".to_string()],
            ..Default::default()
        };
        let args = GenerateArgs {
            module: Some("example.com/flag".to_string()),
            models: vec![("User".to_string(), "github.com/acme/a.User".to_string())],
            omit_getters: true,
            ..Default::default()
        };
        let merged = args.merge_into(file);
        assert_eq!(merged.module_name, "example.com/flag");
        assert_eq!(merged.model_package, "models");
        assert_eq!(merged.autobind, vec!["github.com/acme/a".to_string()]);
        assert_eq!(merged.models["User"], "github.com/acme/a.User");
        assert!(merged.omit_getters);
    }

    #[test]
    fn test_write_files_rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = FileMap::new();
        files.insert("../evil.go".to_string(), b"package evil".to_vec());
        assert!(write_files(dir.path(), &files).is_err());
    }
}
