//! Request-level generation
//!
//! [`GeneratorService`] turns a [`GenerateRequest`] into a complete Go
//! project: it loads the remote packages named by autobind and custom
//! models, runs the orchestrator on a fresh registry, and adds the project
//! files a gqlgen checkout expects next to the generated code.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use gqlforge_core::{PackageLoader, TypeRegistry};
use gqlforge_parser::{GitHubFetcher, RemotePackageLoader, SourceFetcher};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::config::{split_type_ref, Config, ConfigBuilder, ConfigOptions};
use crate::error::CodegenError;
use crate::interceptor::relative_path;
use crate::orchestrator::GenerationOrchestrator;
use crate::testgen::TestGenerator;
use crate::FileMap;

const REMOTE_HOST: &str = "github.com/";
const GQLGEN_VERSION: &str = "v0.17.0";
const GO_VERSION: &str = "1.24";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub schema: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<GenerateConfig>,
    /// File name -> contents, copied verbatim into the result
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional_files: BTreeMap<String, String>,
}

/// Per-request generation settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateConfig {
    pub module_name: String,
    /// Package of the generated exec file
    pub package_name: String,
    pub model_package: String,
    pub resolver_package: String,
    /// Accepted for request compatibility; schemas are always validated
    pub skip_validation: bool,
    pub omit_slice_element_pointers: bool,
    pub omit_getters: bool,

    /// Token for private repositories
    pub github_token: Option<String>,
    /// Branch, tag or commit; each repository's default branch when empty
    pub github_ref: Option<String>,
    pub autobind: Vec<String>,
    /// GraphQL type name -> `github.com/owner/repo/pkg.Type`
    pub models: BTreeMap<String, String>,

    pub generate_tests: bool,
}

impl GenerateConfig {
    fn to_options(&self, schema: &str) -> ConfigOptions {
        ConfigOptions {
            schema: schema.to_string(),
            module_name: self.module_name.clone(),
            exec_package: self.package_name.clone(),
            model_package: self.model_package.clone(),
            resolver_package: self.resolver_package.clone(),
            omit_slice_element_pointers: self.omit_slice_element_pointers,
            omit_getters: self.omit_getters,
            github_ref: self.github_ref.clone(),
            autobind: self.autobind.clone(),
            models: self.models.clone(),
            ..Default::default()
        }
    }

    /// Hosted packages referenced by autobind entries and custom models
    pub fn remote_packages(&self) -> BTreeSet<String> {
        let autobind = self
            .autobind
            .iter()
            .filter(|pkg| pkg.starts_with(REMOTE_HOST))
            .cloned();
        let models = self
            .models
            .values()
            .filter(|go_ref| go_ref.starts_with(REMOTE_HOST))
            .filter_map(|go_ref| split_type_ref(go_ref).map(|(path, _)| path.to_string()));
        autobind.chain(models).collect()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerateResult {
    pub files: FileMap,
    /// Non-fatal problems, such as remote packages that could not be loaded
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

#[derive(Default)]
pub struct GeneratorService {
    fetcher: Option<Arc<dyn SourceFetcher>>,
}

impl GeneratorService {
    /// Service fetching remote packages from GitHub
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fetcher(fetcher: Arc<dyn SourceFetcher>) -> Self {
        Self {
            fetcher: Some(fetcher),
        }
    }

    #[instrument(skip_all, level = "debug")]
    pub async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResult, CodegenError> {
        let settings = request.config.clone().unwrap_or_default();
        let registry = Arc::new(TypeRegistry::new());
        let mut errors = Vec::new();

        let remote = settings.remote_packages();
        if !remote.is_empty() {
            self.load_remote_packages(&settings, &registry, &remote, &mut errors)
                .await;
        }

        let opts = settings.to_options(&request.schema);
        let config = ConfigBuilder::with_registry(registry).build_config_with_options(&opts)?;
        let mut orchestrator = GenerationOrchestrator::new(config);
        let mut files = orchestrator.run()?;

        let config = orchestrator.config();
        files.insert("schema.graphqls".to_string(), request.schema.clone().into_bytes());
        files.insert(
            "gqlgen.yml".to_string(),
            gqlgen_yml(config, &settings)?.into_bytes(),
        );
        files.insert("go.mod".to_string(), go_mod(&config.module).into_bytes());

        if settings.generate_tests {
            match TestGenerator::new().generate_tests(&config.schema, &config.module) {
                Ok(tests) => {
                    for (name, content) in tests {
                        files.insert(format!("tests/{}", name), content);
                    }
                }
                Err(e) => {
                    warn!("failed to generate tests: {}", e);
                    errors.push(format!("failed to generate tests: {}", e));
                }
            }
        }

        for (name, content) in &request.additional_files {
            files.insert(name.clone(), content.clone().into_bytes());
        }

        info!(files = files.len(), errors = errors.len(), "request generated");
        Ok(GenerateResult { files, errors })
    }

    /// Load every package, recording failures and carrying on
    ///
    /// Types from packages that failed to load are generated instead of
    /// bound.
    async fn load_remote_packages(
        &self,
        settings: &GenerateConfig,
        registry: &Arc<TypeRegistry>,
        packages: &BTreeSet<String>,
        errors: &mut Vec<String>,
    ) {
        let fetcher: Arc<dyn SourceFetcher> = match &self.fetcher {
            Some(fetcher) => Arc::clone(fetcher),
            None => match GitHubFetcher::new(settings.github_token.clone()) {
                Ok(fetcher) => Arc::new(fetcher),
                Err(e) => {
                    warn!("remote packages unavailable: {}", e);
                    errors.push(e.to_string());
                    return;
                }
            },
        };

        let registry = Arc::clone(registry) as Arc<dyn PackageLoader>;
        let mut loader = RemotePackageLoader::new(fetcher, registry);
        if let Some(git_ref) = &settings.github_ref {
            loader = loader.with_ref(git_ref.clone());
        }

        for path in packages {
            info!(
                git_ref = settings.github_ref.as_deref().unwrap_or("default"),
                "loading remote package {}", path
            );
            if let Err(e) = loader.load_package(path).await {
                warn!("failed to load package {}: {}", path, e);
                errors.push(format!("failed to load package {}: {}", path, e));
            }
        }
        for degraded in loader.degraded() {
            warn!(
                package = %degraded.package,
                declaration = %degraded.declaration,
                "unresolved type {} replaced by string", degraded.expression
            );
        }
    }
}

#[derive(Serialize)]
struct GqlgenYml {
    schema: Vec<String>,
    exec: FileSection,
    model: FileSection,
    resolver: ResolverSection,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    autobind: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    models: BTreeMap<String, ModelSection>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    omit_slice_element_pointers: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    omit_getters: bool,
}

#[derive(Serialize)]
struct FileSection {
    filename: String,
    package: String,
}

#[derive(Serialize)]
struct ResolverSection {
    filename: String,
    package: String,
    #[serde(rename = "type")]
    type_name: String,
}

#[derive(Serialize)]
struct ModelSection {
    model: Vec<String>,
}

/// Project configuration matching what was generated
fn gqlgen_yml(config: &Config, settings: &GenerateConfig) -> Result<String, CodegenError> {
    let yml = GqlgenYml {
        schema: vec![config.schema_filename.clone()],
        exec: FileSection {
            filename: relative_path(&config.exec.filename),
            package: config.exec.package.clone(),
        },
        model: FileSection {
            filename: relative_path(&config.model.filename),
            package: config.model.package.clone(),
        },
        resolver: ResolverSection {
            filename: relative_path(&config.resolver.filename),
            package: config.resolver.package.clone(),
            type_name: config.resolver.type_name.clone(),
        },
        autobind: config.autobind.clone(),
        models: settings
            .models
            .iter()
            .map(|(name, go_ref)| {
                let section = ModelSection {
                    model: vec![go_ref.clone()],
                };
                (name.clone(), section)
            })
            .collect(),
        omit_slice_element_pointers: config.omit_slice_element_pointers,
        omit_getters: config.omit_getters,
    };
    Ok(serde_yaml::to_string(&yml)?)
}

fn go_mod(module: &str) -> String {
    format!(
        "module {}\n\ngo {}\n\nrequire github.com/99designs/gqlgen {}\n",
        module, GO_VERSION, GQLGEN_VERSION
    )
}
