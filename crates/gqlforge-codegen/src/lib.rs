//! In-memory gqlgen-style Go server generation
//!
//! A GraphQL schema is turned into a configuration ([`config`]), bound to
//! Go types held in the virtual registry ([`data`]), and rendered by the
//! model and resolver plugins ([`plugin`]) and the core exec emitter
//! ([`exec`]). Every render goes through one process-wide entry point
//! ([`templates::render`]); the [`interceptor`] swaps it out so a run
//! driven by the [`orchestrator`] produces a file map instead of touching
//! disk.

pub mod config;
pub mod data;
pub mod error;
pub mod exec;
pub mod interceptor;
pub mod orchestrator;
pub mod plugin;
pub mod schema;
pub mod service;
pub mod templates;
pub mod testgen;

pub use config::{Config, ConfigBuilder, ConfigOptions, PackageConfig, ResolverConfig, TypeMap};
pub use data::{build_data, Data, FieldBinding, Object, ObjectField};
pub use error::CodegenError;
pub use interceptor::OutputInterceptor;
pub use orchestrator::GenerationOrchestrator;
pub use plugin::{CodeGenerator, ConfigMutator, Plugin};
pub use schema::Schema;
pub use service::{GenerateConfig, GenerateRequest, GenerateResult, GeneratorService};

/// Generated file path -> contents
pub type FileMap = std::collections::BTreeMap<String, Vec<u8>>;
