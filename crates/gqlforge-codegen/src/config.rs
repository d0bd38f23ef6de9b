//! Generator configuration built entirely in memory
//!
//! [`ConfigBuilder`] parses the schema, seeds the registry with the
//! runtime packages generated code refers to, and declares a placeholder
//! for every schema type the model plugin will generate, so the binder can
//! resolve references before the models exist.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use gqlforge_core::naming::to_go_name;
use gqlforge_core::{BasicKind, Field, PackageLoader, Type, TypeRegistry};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::CodegenError;
use crate::schema::{Schema, TypeKind};

pub const GRAPHQL_PKG: &str = "github.com/99designs/gqlgen/graphql";
pub const INTROSPECTION_PKG: &str = "github.com/99designs/gqlgen/graphql/introspection";
pub const GQLPARSER_PKG: &str = "github.com/vektah/gqlparser/v2";
pub const AST_PKG: &str = "github.com/vektah/gqlparser/v2/ast";

/// Literal Go spelling accepted in the type map
pub const MAP_TYPE: &str = "map[string]interface{}";

const DEFAULT_MODULE: &str = "generated";
const SCHEMA_FILENAME: &str = "schema.graphqls";

const COMMON_PACKAGES: &[(&str, &str)] = &[
    ("bytes", "bytes"),
    ("context", "context"),
    ("errors", "errors"),
    ("fmt", "fmt"),
    ("io", "io"),
    ("strconv", "strconv"),
    ("sync", "sync"),
    ("time", "time"),
    (GQLPARSER_PKG, "gqlparser"),
    (AST_PKG, "ast"),
    (GRAPHQL_PKG, "graphql"),
    (INTROSPECTION_PKG, "introspection"),
];

/// Output location of one generated Go package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageConfig {
    pub filename: PathBuf,
    pub package: String,
    pub import_path: String,
}

impl PackageConfig {
    pub fn new(filename: impl Into<PathBuf>, package: impl Into<String>, import_path: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            package: package.into(),
            import_path: import_path.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    pub filename: PathBuf,
    pub package: String,
    /// Name of the root resolver struct
    #[serde(rename = "type")]
    pub type_name: String,
}

/// GraphQL type name -> Go type references, tried in order
///
/// A reference is either `import/path.Name` or the literal
/// `map[string]interface{}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeMap(BTreeMap<String, Vec<String>>);

impl TypeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a reference, ignoring exact duplicates
    pub fn add(&mut self, graphql_name: &str, go_ref: &str) {
        let refs = self.0.entry(graphql_name.to_string()).or_default();
        if !refs.iter().any(|r| r == go_ref) {
            refs.push(go_ref.to_string());
        }
    }

    pub fn get(&self, graphql_name: &str) -> Option<&[String]> {
        self.0.get(graphql_name).map(Vec::as_slice)
    }

    pub fn contains(&self, graphql_name: &str) -> bool {
        self.0.contains_key(graphql_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Split `import/path.Name` at the last dot
pub fn split_type_ref(go_ref: &str) -> Option<(&str, &str)> {
    let idx = go_ref.rfind('.')?;
    let (path, name) = (&go_ref[..idx], &go_ref[idx + 1..]);
    if path.is_empty() || name.is_empty() || path.contains('[') {
        return None;
    }
    Some((path, name))
}

/// Everything one generation run needs
pub struct Config {
    pub schema: Schema,
    pub schema_filename: String,
    pub exec: PackageConfig,
    pub model: PackageConfig,
    pub resolver: ResolverConfig,
    pub models: TypeMap,
    pub autobind: Vec<String>,
    pub omit_slice_element_pointers: bool,
    pub omit_getters: bool,
    pub struct_fields_always_pointers: bool,
    /// Go module the generated packages live in
    pub module: String,
    pub packages: Arc<dyn PackageLoader>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("schema_filename", &self.schema_filename)
            .field("exec", &self.exec)
            .field("model", &self.model)
            .field("resolver", &self.resolver)
            .field("models", &self.models)
            .field("autobind", &self.autobind)
            .field("module", &self.module)
            .finish_non_exhaustive()
    }
}

/// Caller-facing knobs; empty strings and `None` keep the defaults
#[derive(Debug, Clone, Default)]
pub struct ConfigOptions {
    pub schema: String,
    pub module_name: String,

    pub exec_package: String,
    pub model_package: String,
    pub resolver_package: String,

    pub exec_filename: Option<PathBuf>,
    pub model_filename: Option<PathBuf>,
    pub resolver_filename: Option<PathBuf>,

    pub omit_slice_element_pointers: bool,
    pub omit_getters: bool,
    pub struct_fields_always_pointers: Option<bool>,

    pub github_ref: Option<String>,
    pub autobind: Vec<String>,
    /// GraphQL type name -> `import/path.Name`
    pub models: BTreeMap<String, String>,
}

pub struct ConfigBuilder {
    registry: Arc<TypeRegistry>,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::with_registry(Arc::new(TypeRegistry::new()))
    }

    /// Build on a registry that may already hold remote packages
    pub fn with_registry(registry: Arc<TypeRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    #[instrument(skip(self, schema), level = "debug")]
    pub fn build_config(&self, schema: &str, module_name: &str) -> Result<Config, CodegenError> {
        let schema = Schema::parse(schema)?;
        let module = if module_name.is_empty() {
            DEFAULT_MODULE.to_string()
        } else {
            module_name.to_string()
        };
        let generated = format!("{}/generated", module);
        let resolver_file = std::env::current_dir()
            .map(|wd| wd.join("resolver.go"))
            .unwrap_or_else(|_| PathBuf::from("resolver.go"));

        let mut config = Config {
            schema,
            schema_filename: SCHEMA_FILENAME.to_string(),
            exec: PackageConfig::new("generated/generated.go", "generated", generated.clone()),
            model: PackageConfig::new("generated/models_gen.go", "generated", generated),
            resolver: ResolverConfig {
                filename: resolver_file,
                package: "main".to_string(),
                type_name: "Resolver".to_string(),
            },
            models: TypeMap::new(),
            autobind: Vec::new(),
            omit_slice_element_pointers: false,
            omit_getters: false,
            struct_fields_always_pointers: true,
            module: module.clone(),
            packages: self.registry.clone(),
        };

        for (path, name) in COMMON_PACKAGES {
            self.registry.add_name(path, name);
        }
        self.registry.add_name(&module, &module);

        self.registry.register_common_types();
        self.register_runtime_types()?;

        self.registry
            .register_package(&config.exec.import_path, &config.exec.package);
        self.registry
            .register_package(&config.model.import_path, &config.model.package);
        self.registry
            .add_name(&config.model.import_path, &config.model.package);

        add_builtin_models(&mut config.models);
        self.declare_placeholders(&config);

        debug!(
            types = config.schema.types.len(),
            module = %config.module,
            "built generator config"
        );
        Ok(config)
    }

    pub fn build_config_with_options(&self, opts: &ConfigOptions) -> Result<Config, CodegenError> {
        let mut config = self.build_config(&opts.schema, &opts.module_name)?;

        if !opts.exec_package.is_empty() {
            config.exec.package = opts.exec_package.clone();
        }
        if !opts.model_package.is_empty() {
            config.model.package = opts.model_package.clone();
            self.registry
                .add_name(&config.model.import_path, &config.model.package);
        }
        if !opts.resolver_package.is_empty() {
            config.resolver.package = opts.resolver_package.clone();
        }

        if let Some(filename) = &opts.exec_filename {
            config.exec.filename = filename.clone();
        }
        if let Some(filename) = &opts.model_filename {
            config.model.filename = filename.clone();
        }
        if let Some(filename) = &opts.resolver_filename {
            config.resolver.filename = filename.clone();
        }

        config.omit_slice_element_pointers |= opts.omit_slice_element_pointers;
        config.omit_getters |= opts.omit_getters;
        if let Some(always) = opts.struct_fields_always_pointers {
            config.struct_fields_always_pointers = always;
        }

        if !opts.autobind.is_empty() {
            config.autobind = opts.autobind.clone();
        }
        for (type_name, go_ref) in &opts.models {
            config.models.add(type_name, go_ref);
        }
        self.autobind(&mut config);

        Ok(config)
    }

    /// Map schema types to same-named types found in autobind packages
    fn autobind(&self, config: &mut Config) {
        if config.autobind.is_empty() {
            return;
        }
        let candidates: Vec<String> = config
            .schema
            .user_types()
            .filter(|t| !config.schema.is_root(&t.name) && !config.models.contains(&t.name))
            .map(|t| t.name.clone())
            .collect();

        for name in candidates {
            let go_name = to_go_name(&name);
            let found = config.autobind.iter().find_map(|pkg| {
                [go_name.as_str(), name.as_str()]
                    .into_iter()
                    .find(|n| self.registry.lookup_object(pkg, n).is_some())
                    .map(|n| format!("{}.{}", pkg, n))
            });
            if let Some(go_ref) = found {
                debug!("autobound {} to {}", name, go_ref);
                config.models.add(&name, &go_ref);
            }
        }
    }

    /// Scalars and introspection structs of the gqlgen runtime
    fn register_runtime_types(&self) -> Result<(), CodegenError> {
        let registry = &self.registry;
        registry.register_package(GRAPHQL_PKG, "graphql");

        let scalars = [
            ("String", BasicKind::String),
            ("ID", BasicKind::String),
            ("Int", BasicKind::Int),
            ("IntID", BasicKind::Int),
            ("Int32", BasicKind::Int32),
            ("Int64", BasicKind::Int64),
            ("Float", BasicKind::Float64),
            ("Boolean", BasicKind::Bool),
        ];
        for (name, kind) in scalars {
            registry.register_type(GRAPHQL_PKG, name, Type::basic(kind))?;
        }
        let time = registry.lookup_type("time", "Time")?;
        registry.register_type(GRAPHQL_PKG, "Time", time)?;
        registry.register_type(GRAPHQL_PKG, "Map", Type::map(Type::string(), Type::any()))?;
        registry.register_type(GRAPHQL_PKG, "Any", Type::any())?;
        registry.register_type(
            GRAPHQL_PKG,
            "Upload",
            Type::structure(vec![
                Field::new("Filename", Type::string()),
                Field::new("Size", Type::basic(BasicKind::Int64)),
                Field::new("ContentType", Type::string()),
            ]),
        )?;

        registry.register_package(INTROSPECTION_PKG, "introspection");
        let string = Type::string;
        let introspection = [
            ("Type", vec![Field::new("Name", string())]),
            (
                "InputValue",
                vec![
                    Field::new("Name", string()),
                    Field::new("DefaultValue", Type::pointer(string())),
                ],
            ),
            ("Field", vec![Field::new("Name", string())]),
            ("EnumValue", vec![Field::new("Name", string())]),
            (
                "Directive",
                vec![
                    Field::new("Name", string()),
                    Field::new("IsRepeatable", Type::basic(BasicKind::Bool)),
                ],
            ),
            ("Schema", Vec::new()),
        ];
        for (name, fields) in introspection {
            registry.register_type(INTROSPECTION_PKG, name, Type::structure(fields))?;
        }
        Ok(())
    }

    /// Named placeholders in the model package for generated types
    ///
    /// They are deliberately kept out of the type map; the model plugin
    /// completes them and adds the mapping once it has generated them.
    fn declare_placeholders(&self, config: &Config) {
        for def in config.schema.user_types() {
            if config.models.contains(&def.name) || config.schema.is_root(&def.name) {
                continue;
            }
            let underlying = match def.kind {
                TypeKind::Object | TypeKind::InputObject | TypeKind::Enum => {
                    Type::structure(Vec::new())
                }
                TypeKind::Interface | TypeKind::Union => Type::any(),
                TypeKind::Scalar => continue,
            };
            self.registry.create_named_type(
                &config.model.import_path,
                &to_go_name(&def.name),
                underlying,
            );
        }
    }
}

fn add_builtin_models(models: &mut TypeMap) {
    let graphql = |name: &str| format!("{}.{}", GRAPHQL_PKG, name);
    for name in ["String", "Int", "Int32", "Int64", "Float", "Boolean", "ID", "Time", "Upload"] {
        models.add(name, &graphql(name));
    }
    models.add("Any", MAP_TYPE);
    models.add("Map", MAP_TYPE);

    let introspection = |name: &str| format!("{}.{}", INTROSPECTION_PKG, name);
    for (schema_name, go_name) in [
        ("__Directive", "Directive"),
        ("__EnumValue", "EnumValue"),
        ("__Field", "Field"),
        ("__InputValue", "InputValue"),
        ("__Schema", "Schema"),
        ("__Type", "Type"),
    ] {
        models.add(schema_name, &introspection(go_name));
    }
    models.add("__DirectiveLocation", &graphql("String"));
    models.add("__TypeKind", &graphql("String"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SDL: &str = r#"
type Query { user(id: ID!): User }
type User { id: ID! name: String }
enum Role { ADMIN USER }
interface Node { id: ID! }
"#;

    #[test]
    fn test_defaults() {
        let config = ConfigBuilder::new().build_config(SDL, "").unwrap();
        assert_eq!(config.module, "generated");
        assert_eq!(config.exec.filename, PathBuf::from("generated/generated.go"));
        assert_eq!(config.exec.import_path, "generated/generated");
        assert_eq!(config.model.filename, PathBuf::from("generated/models_gen.go"));
        assert_eq!(config.resolver.package, "main");
        assert_eq!(config.resolver.type_name, "Resolver");
        assert!(config.resolver.filename.ends_with("resolver.go"));
        assert!(config.struct_fields_always_pointers);
    }

    #[test]
    fn test_runtime_scalars_are_unwrapped_basics() {
        let builder = ConfigBuilder::new();
        builder.build_config(SDL, "example.com/app").unwrap();
        let registry = builder.registry();
        assert_eq!(
            registry.lookup_type(GRAPHQL_PKG, "String").unwrap(),
            Type::basic(BasicKind::String)
        );
        assert_eq!(
            registry.lookup_type(GRAPHQL_PKG, "Float").unwrap(),
            Type::basic(BasicKind::Float64)
        );
        assert!(registry.lookup_type(INTROSPECTION_PKG, "Directive").is_ok());
    }

    #[test]
    fn test_placeholders_stay_out_of_type_map() {
        let builder = ConfigBuilder::new();
        let config = builder.build_config(SDL, "example.com/app").unwrap();
        let model_path = "example.com/app/generated";

        assert!(builder.registry().lookup_type(model_path, "User").is_ok());
        assert!(builder.registry().lookup_type(model_path, "Role").is_ok());
        assert!(builder.registry().lookup_type(model_path, "Node").is_ok());
        assert!(builder.registry().lookup_type(model_path, "Query").is_err());
        assert!(!config.models.contains("User"));
        assert_eq!(config.models.get("ID").unwrap(), [format!("{}.ID", GRAPHQL_PKG)]);
        assert_eq!(config.models.get("Map").unwrap(), [MAP_TYPE.to_string()]);
    }

    #[test]
    fn test_options_override_defaults() {
        let mut models = BTreeMap::new();
        models.insert("User".to_string(), "github.com/acme/api/models.User".to_string());
        let opts = ConfigOptions {
            schema: SDL.to_string(),
            module_name: "example.com/app".to_string(),
            exec_package: "exec".to_string(),
            resolver_package: "resolvers".to_string(),
            resolver_filename: Some(PathBuf::from("resolvers/resolver.go")),
            omit_getters: true,
            struct_fields_always_pointers: Some(false),
            models,
            ..ConfigOptions::default()
        };
        let config = ConfigBuilder::new().build_config_with_options(&opts).unwrap();
        assert_eq!(config.exec.package, "exec");
        assert_eq!(config.model.package, "generated");
        assert_eq!(config.resolver.package, "resolvers");
        assert_eq!(config.resolver.filename, PathBuf::from("resolvers/resolver.go"));
        assert!(config.omit_getters);
        assert!(!config.struct_fields_always_pointers);
        assert_eq!(
            config.models.get("User").unwrap(),
            ["github.com/acme/api/models.User".to_string()]
        );
    }

    #[test]
    fn test_autobind_finds_registered_types() {
        let registry = Arc::new(TypeRegistry::new());
        registry.register_package("github.com/acme/api/models", "models");
        registry
            .register_type(
                "github.com/acme/api/models",
                "User",
                Type::structure(vec![Field::new("ID", Type::string())]),
            )
            .unwrap();

        let opts = ConfigOptions {
            schema: SDL.to_string(),
            autobind: vec!["github.com/acme/api/models".to_string()],
            ..ConfigOptions::default()
        };
        let config = ConfigBuilder::with_registry(registry)
            .build_config_with_options(&opts)
            .unwrap();
        assert_eq!(
            config.models.get("User").unwrap(),
            ["github.com/acme/api/models.User".to_string()]
        );
        assert!(!config.models.contains("Role"));
    }

    #[test]
    fn test_split_type_ref() {
        assert_eq!(
            split_type_ref("github.com/acme/api/models.User"),
            Some(("github.com/acme/api/models", "User"))
        );
        assert_eq!(split_type_ref(MAP_TYPE), None);
        assert_eq!(split_type_ref("User"), None);
    }

    #[test]
    fn test_invalid_schema_is_reported() {
        let err = ConfigBuilder::new().build_config("type Query {", "").unwrap_err();
        assert!(matches!(err, CodegenError::SchemaParse(_)));
    }
}
