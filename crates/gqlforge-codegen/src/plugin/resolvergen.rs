//! Resolver stub generation

use std::fmt::Write;

use gqlforge_core::naming::to_go_private_name;
use gqlforge_core::ImportAliasManager;
use tracing::info;

use crate::data::Data;
use crate::error::CodegenError;
use crate::exec::resolver_signature;
use crate::plugin::{CodeGenerator, Plugin};
use crate::templates::{self, RenderOptions};

#[derive(Debug, Default)]
pub struct ResolverGen;

impl ResolverGen {
    pub fn new() -> Self {
        Self
    }
}

impl Plugin for ResolverGen {
    fn name(&self) -> &str {
        "resolvergen"
    }

    fn as_code_generator(&self) -> Option<&dyn CodeGenerator> {
        Some(self)
    }
}

impl CodeGenerator for ResolverGen {
    fn generate_code(&self, data: &Data<'_>) -> Result<(), CodegenError> {
        let config = data.config;
        let imports = ImportAliasManager::new();
        let exec = imports.reserve(&config.exec.import_path, Some(&config.exec.package));
        let root = &config.resolver.type_name;
        let objects = data.resolver_objects();

        let mut out = String::new();
        writeln!(out, "// This file will be automatically regenerated based on the schema, any resolver implementations")?;
        writeln!(out, "// will be copied through when generating and any unknown code will be moved to the end.")?;
        writeln!(out)?;
        writeln!(out, "type {} struct{{}}", root)?;
        writeln!(out)?;

        for object in &objects {
            let receiver = format!("{}Resolver", to_go_private_name(&object.go_name));
            for field in object.resolver_fields() {
                writeln!(out, "// {} is the resolver for the {} field.", field.go_name, field.name)?;
                writeln!(
                    out,
                    "func (r *{}) {} {{",
                    receiver,
                    resolver_signature(object, field, &imports)
                )?;
                writeln!(out, "\tpanic(\"not implemented\")")?;
                writeln!(out, "}}")?;
                writeln!(out)?;
            }
        }

        for object in &objects {
            let receiver = format!("{}Resolver", to_go_private_name(&object.go_name));
            writeln!(
                out,
                "// {} returns {}.{}Resolver implementation.",
                object.go_name, exec, object.go_name
            )?;
            writeln!(
                out,
                "func (r *{}) {}() {}.{}Resolver {{ return &{}{{r}} }}",
                root, object.go_name, exec, object.go_name, receiver
            )?;
            writeln!(out)?;
        }
        for object in &objects {
            writeln!(
                out,
                "type {}Resolver struct{{ *{} }}",
                to_go_private_name(&object.go_name),
                root
            )?;
        }

        info!(
            stubs = objects.iter().map(|o| o.resolver_fields().count()).sum::<usize>(),
            "generating resolvers"
        );
        templates::render(&RenderOptions {
            filename: config.resolver.filename.clone(),
            package_name: config.resolver.package.clone(),
            imports,
            body: out,
            generated_header: false,
        })
    }
}
