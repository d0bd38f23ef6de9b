//! One generation run with captured output
//!
//! The render hook is process-wide, so runs are serialized behind a global
//! lock held from the moment capture starts until it stops.

use parking_lot::Mutex;
use tracing::{debug, info, instrument};

use crate::config::Config;
use crate::data::build_data;
use crate::error::CodegenError;
use crate::exec;
use crate::interceptor::OutputInterceptor;
use crate::plugin::{default_plugins, Plugin};
use crate::FileMap;

static RUN_LOCK: Mutex<()> = parking_lot::const_mutex(());

pub struct GenerationOrchestrator {
    config: Config,
    plugins: Vec<Box<dyn Plugin>>,
}

impl GenerationOrchestrator {
    /// Orchestrator with the model and resolver plugins
    pub fn new(config: Config) -> Self {
        Self::with_plugins(config, default_plugins())
    }

    pub fn with_plugins(config: Config, plugins: Vec<Box<dyn Plugin>>) -> Self {
        Self { config, plugins }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Mutate config, bind, run plugin generators, then emit the core files
    #[instrument(skip(self), level = "debug")]
    pub fn run(&mut self) -> Result<FileMap, CodegenError> {
        let _guard = RUN_LOCK.lock();
        let interceptor = OutputInterceptor::new();
        interceptor.start();

        match self.stages() {
            Ok(()) => {
                interceptor.stop();
                let files = interceptor.files();
                info!(files = files.len(), "generation complete");
                Ok(files)
            }
            Err(e) => {
                interceptor.clear();
                Err(e)
            }
        }
    }

    fn stages(&mut self) -> Result<(), CodegenError> {
        for plugin in &self.plugins {
            if let Some(mutator) = plugin.as_config_mutator() {
                debug!("mutating config with {}", plugin.name());
                mutator
                    .mutate_config(&mut self.config)
                    .map_err(|e| e.in_stage(plugin.name()))?;
            }
        }

        let data = build_data(&self.config).map_err(|e| e.in_stage("build data"))?;

        for plugin in &self.plugins {
            if let Some(generator) = plugin.as_code_generator() {
                debug!("generating code with {}", plugin.name());
                generator
                    .generate_code(&data)
                    .map_err(|e| e.in_stage(format!("{} generate code", plugin.name())))?;
            }
        }

        exec::generate_code(&data).map_err(|e| e.in_stage("codegen generate"))
    }
}
