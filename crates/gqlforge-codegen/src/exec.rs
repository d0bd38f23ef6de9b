//! Core exec emission
//!
//! Renders the executable schema file: the resolver root and per-object
//! resolver interfaces, directive and complexity roots, the constructor,
//! and the schema source embedded for runtime parsing.

use std::fmt::Write;

use gqlforge_core::naming::to_go_name;
use gqlforge_core::{ImportAliasManager, Type};
use tracing::{debug, instrument};

use crate::config::{AST_PKG, GQLPARSER_PKG, GRAPHQL_PKG};
use crate::data::{Data, Object, ObjectField};
use crate::error::CodegenError;
use crate::templates::{self, raw_string, RenderOptions};

#[instrument(skip(data), level = "debug")]
pub fn generate_code(data: &Data<'_>) -> Result<(), CodegenError> {
    let config = data.config;
    let imports = ImportAliasManager::for_package(&config.exec.import_path);
    for pkg in ["context", GRAPHQL_PKG, AST_PKG] {
        imports.reserve(pkg, None);
    }
    imports.reserve(GQLPARSER_PKG, Some("gqlparser"));

    let resolver_objects = data.resolver_objects();
    let complexity_objects: Vec<&Object> = data.objects.iter().filter(|o| !o.fields.is_empty()).collect();
    let mut out = String::new();

    writeln!(out, "// NewExecutableSchema creates an ExecutableSchema from the ResolverRoot interface.")?;
    writeln!(out, "func NewExecutableSchema(cfg Config) graphql.ExecutableSchema {{")?;
    writeln!(out, "\treturn &executableSchema{{")?;
    writeln!(out, "\t\tschema:     cfg.Schema,")?;
    writeln!(out, "\t\tresolvers:  cfg.Resolvers,")?;
    writeln!(out, "\t\tdirectives: cfg.Directives,")?;
    writeln!(out, "\t\tcomplexity: cfg.Complexity,")?;
    writeln!(out, "\t}}")?;
    writeln!(out, "}}")?;
    writeln!(out)?;

    writeln!(out, "type Config struct {{")?;
    writeln!(out, "\tSchema     *ast.Schema")?;
    writeln!(out, "\tResolvers  ResolverRoot")?;
    writeln!(out, "\tDirectives DirectiveRoot")?;
    writeln!(out, "\tComplexity ComplexityRoot")?;
    writeln!(out, "}}")?;
    writeln!(out)?;

    writeln!(out, "type ResolverRoot interface {{")?;
    for object in &resolver_objects {
        writeln!(out, "\t{}() {}Resolver", object.go_name, object.go_name)?;
    }
    writeln!(out, "}}")?;
    writeln!(out)?;

    writeln!(out, "type DirectiveRoot struct {{")?;
    for directive in &config.schema.directives {
        writeln!(
            out,
            "\t{} func(ctx context.Context, obj interface{{}}, next graphql.Resolver) (res interface{{}}, err error)",
            to_go_name(directive)
        )?;
    }
    writeln!(out, "}}")?;
    writeln!(out)?;

    writeln!(out, "type ComplexityRoot struct {{")?;
    for (i, object) in complexity_objects.iter().enumerate() {
        if i > 0 {
            writeln!(out)?;
        }
        writeln!(out, "\t{} struct {{", object.go_name)?;
        for field in &object.fields {
            writeln!(out, "\t\t{} {}", field.go_name, complexity_func(field, &imports))?;
        }
        writeln!(out, "\t}}")?;
    }
    writeln!(out, "}}")?;
    writeln!(out)?;

    for object in &resolver_objects {
        writeln!(out, "type {}Resolver interface {{", object.go_name)?;
        for field in object.resolver_fields() {
            writeln!(out, "\t{}", resolver_signature(object, field, &imports))?;
        }
        writeln!(out, "}}")?;
        writeln!(out)?;
    }

    writeln!(out, "type executableSchema struct {{")?;
    writeln!(out, "\tschema     *ast.Schema")?;
    writeln!(out, "\tresolvers  ResolverRoot")?;
    writeln!(out, "\tdirectives DirectiveRoot")?;
    writeln!(out, "\tcomplexity ComplexityRoot")?;
    writeln!(out, "}}")?;
    writeln!(out)?;

    writeln!(out, "func (e *executableSchema) Schema() *ast.Schema {{")?;
    writeln!(out, "\tif e.schema != nil {{")?;
    writeln!(out, "\t\treturn e.schema")?;
    writeln!(out, "\t}}")?;
    writeln!(out, "\treturn parsedSchema")?;
    writeln!(out, "}}")?;
    writeln!(out)?;

    write_complexity_method(&mut out, &complexity_objects, &imports)?;

    writeln!(out, "var sources = []*ast.Source{{")?;
    writeln!(
        out,
        "\t{{Name: \"{}\", Input: {}, BuiltIn: false}},",
        config.schema_filename,
        raw_string(&config.schema.source)
    )?;
    writeln!(out, "}}")?;
    writeln!(out, "var parsedSchema = gqlparser.MustLoadSchema(sources...)")?;

    debug!(resolvers = resolver_objects.len(), "rendering exec");
    templates::render(&RenderOptions {
        filename: config.exec.filename.clone(),
        package_name: config.exec.package.clone(),
        imports,
        body: out,
        generated_header: true,
    })
}

/// `Name(ctx context.Context, [obj *T,] args...) (Result, error)`
pub(crate) fn resolver_signature(object: &Object, field: &ObjectField, imports: &ImportAliasManager) -> String {
    let mut params = vec![format!("ctx {}.Context", imports.reserve("context", None))];
    if let (false, Some(go_type)) = (object.root, &object.go_type) {
        params.push(format!("obj {}", imports.format_type(&Type::pointer(go_type.clone()))));
    }
    params.extend(
        field
            .args
            .iter()
            .map(|arg| format!("{} {}", arg.var_name, imports.format_type(&arg.go_type))),
    );
    format!(
        "{}({}) ({}, error)",
        field.go_name,
        params.join(", "),
        imports.format_type(&field.go_type)
    )
}

fn complexity_func(field: &ObjectField, imports: &ImportAliasManager) -> String {
    let mut params = vec!["childComplexity int".to_string()];
    params.extend(
        field
            .args
            .iter()
            .map(|arg| format!("{} {}", arg.var_name, imports.format_type(&arg.go_type))),
    );
    format!("func({}) int", params.join(", "))
}

fn write_complexity_method(
    out: &mut String,
    objects: &[&Object],
    imports: &ImportAliasManager,
) -> Result<(), CodegenError> {
    writeln!(
        out,
        "func (e *executableSchema) Complexity(typeName, field string, childComplexity int, rawArgs map[string]interface{{}}) (int, bool) {{"
    )?;
    writeln!(out, "\tswitch typeName + \".\" + field {{")?;
    for object in objects {
        for field in &object.fields {
            let target = format!("e.complexity.{}.{}", object.go_name, field.go_name);
            writeln!(out)?;
            writeln!(out, "\tcase \"{}.{}\":", object.name, field.name)?;
            writeln!(out, "\t\tif {} == nil {{", target)?;
            writeln!(out, "\t\t\tbreak")?;
            writeln!(out, "\t\t}}")?;
            let mut args = vec!["childComplexity".to_string()];
            for arg in &field.args {
                writeln!(
                    out,
                    "\t\t{}, _ := rawArgs[\"{}\"].({})",
                    arg.var_name,
                    arg.name,
                    imports.format_type(&arg.go_type)
                )?;
                args.push(arg.var_name.clone());
            }
            writeln!(out)?;
            writeln!(out, "\t\treturn {}({}), true", target, args.join(", "))?;
        }
    }
    writeln!(out, "\t}}")?;
    writeln!(out, "\treturn 0, false")?;
    writeln!(out, "}}")?;
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use crate::data::build_data;
    use crate::interceptor::OutputInterceptor;
    use crate::plugin::{ConfigMutator, ModelGen};
    use serial_test::serial;

    const SDL: &str = r#"
directive @auth on FIELD_DEFINITION
type Query {
  user(id: ID!): User
  hello: String!
}
type User {
  id: ID!
  friends(first: Int): [User!]!
}
"#;

    fn exec_source(sdl: &str) -> String {
        let mut config = ConfigBuilder::new().build_config(sdl, "example.com/app").unwrap();
        let interceptor = OutputInterceptor::new();
        interceptor.start();
        ModelGen::new().mutate_config(&mut config).unwrap();
        let data = build_data(&config).unwrap();
        generate_code(&data).unwrap();
        let files = interceptor.files();
        String::from_utf8(files["generated/generated.go"].clone()).unwrap()
    }

    #[test]
    #[serial]
    fn test_exec_declares_resolver_surface() {
        let src = exec_source(SDL);
        assert!(src.starts_with(templates::GENERATED_HEADER));
        assert!(src.contains("\tgqlparser \"github.com/vektah/gqlparser/v2\"\n"));
        assert!(src.contains("type ResolverRoot interface {\n\tQuery() QueryResolver\n\tUser() UserResolver\n}"));
        assert!(src.contains("\tUser(ctx context.Context, id string) (*User, error)"));
        assert!(src.contains("\tHello(ctx context.Context) (string, error)"));
        assert!(src.contains("\tFriends(ctx context.Context, obj *User, first *int) ([]*User, error)"));
        assert!(src.contains("\tAuth func(ctx context.Context, obj interface{}, next graphql.Resolver)"));
        assert!(src.contains("\t\tUser func(childComplexity int, id string) int"));
        assert!(src.contains("\t\tid, _ := rawArgs[\"id\"].(string)"));
        assert!(src.contains("Input: `\ndirective @auth"));
        assert!(src.contains("var parsedSchema = gqlparser.MustLoadSchema(sources...)"));
    }
}
