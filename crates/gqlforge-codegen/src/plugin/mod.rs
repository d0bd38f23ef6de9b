//! Generator plugins
//!
//! A plugin takes part in a run through capabilities: a [`ConfigMutator`]
//! adjusts the configuration before binding, a [`CodeGenerator`] renders
//! files from the bound data.

pub mod modelgen;
pub mod resolvergen;

use crate::config::Config;
use crate::data::Data;
use crate::error::CodegenError;

pub use modelgen::ModelGen;
pub use resolvergen::ResolverGen;

pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn as_config_mutator(&self) -> Option<&dyn ConfigMutator> {
        None
    }

    fn as_code_generator(&self) -> Option<&dyn CodeGenerator> {
        None
    }
}

pub trait ConfigMutator {
    fn mutate_config(&self, config: &mut Config) -> Result<(), CodegenError>;
}

pub trait CodeGenerator {
    fn generate_code(&self, data: &Data<'_>) -> Result<(), CodegenError>;
}

/// The plugins every run uses unless told otherwise
pub fn default_plugins() -> Vec<Box<dyn Plugin>> {
    vec![Box::new(ModelGen::new()), Box::new(ResolverGen::new())]
}
