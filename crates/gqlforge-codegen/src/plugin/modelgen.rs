//! Model generation
//!
//! Renders Go types for every schema type that has no binding yet and
//! completes the placeholders declared by the config builder, so later
//! binding sees the real struct fields.

use std::collections::{BTreeMap, HashSet};
use std::fmt::Write;

use gqlforge_core::naming::to_go_name;
use gqlforge_core::{Field, Func, ImportAliasManager, InterfaceType, NamedRef, Signature, Type, Var};
use tracing::{debug, info};

use crate::config::Config;
use crate::data::{Binder, Position};
use crate::error::CodegenError;
use crate::plugin::{ConfigMutator, Plugin};
use crate::schema::{TypeDef, TypeKind, TypeRef};
use crate::templates::{self, go_comment, RenderOptions};

#[derive(Debug, Default)]
pub struct ModelGen;

impl ModelGen {
    pub fn new() -> Self {
        Self
    }
}

impl Plugin for ModelGen {
    fn name(&self) -> &str {
        "modelgen"
    }

    fn as_config_mutator(&self) -> Option<&dyn ConfigMutator> {
        Some(self)
    }
}

impl ConfigMutator for ModelGen {
    fn mutate_config(&self, config: &mut Config) -> Result<(), CodegenError> {
        let build = ModelBuild::collect(config)?;
        for (name, go_name) in &build.generated {
            let go_ref = format!("{}.{}", config.model.import_path, go_name);
            config.models.add(name, &go_ref);
        }

        if build.generated.is_empty() {
            debug!("no models to generate");
            return Ok(());
        }
        info!(models = build.generated.len(), "generating models");
        templates::render(&RenderOptions {
            filename: config.model.filename.clone(),
            package_name: config.model.package.clone(),
            imports: build.imports,
            body: build.body,
            generated_header: true,
        })
    }
}

struct ModelBuild {
    imports: ImportAliasManager,
    body: String,
    /// GraphQL name -> Go name
    generated: Vec<(String, String)>,
}

struct Row {
    name: String,
    ty: String,
    tag: String,
    description: Option<String>,
}

impl ModelBuild {
    fn collect(config: &Config) -> Result<Self, CodegenError> {
        let schema = &config.schema;
        let pending: Vec<&TypeDef> = schema
            .user_types()
            .filter(|t| {
                t.kind != TypeKind::Scalar
                    && !schema.is_root(&t.name)
                    && !config.models.contains(&t.name)
            })
            .collect();
        let pending_names: HashSet<&str> = pending.iter().map(|t| t.name.as_str()).collect();

        // object -> generated unions it belongs to
        let mut unions: BTreeMap<&str, Vec<&TypeDef>> = BTreeMap::new();
        for def in pending.iter().filter(|t| t.kind == TypeKind::Union) {
            for member in &def.possible_types {
                unions.entry(member.as_str()).or_default().push(*def);
            }
        }

        let mut build = ModelBuild {
            imports: ImportAliasManager::for_package(&config.model.import_path),
            body: String::new(),
            generated: Vec::new(),
        };
        let binder = Binder::new(config);

        for def in pending.iter().filter(|t| t.kind.is_abstract()) {
            build.write_interface(config, &binder, def)?;
        }
        for def in pending
            .iter()
            .filter(|t| matches!(t.kind, TypeKind::Object | TypeKind::InputObject))
        {
            let mut markers: Vec<&TypeDef> = def
                .interfaces
                .iter()
                .filter(|i| pending_names.contains(i.as_str()))
                .filter_map(|i| schema.get(i))
                .collect();
            markers.extend(unions.get(def.name.as_str()).into_iter().flatten().copied());
            build.write_struct(config, &binder, def, &markers)?;
        }
        for def in pending.iter().filter(|t| t.kind == TypeKind::Enum) {
            build.write_enum(config, def)?;
        }
        Ok(build)
    }

    fn placeholder(config: &Config, go_name: &str) -> Result<NamedRef, CodegenError> {
        match config
            .packages
            .lookup_type(&config.model.import_path, go_name)?
        {
            Type::Named(named) => Ok(named),
            other => Err(CodegenError::binding(
                go_name,
                format!("model placeholder is {}, not a named type", other),
            )),
        }
    }

    fn write_interface(&mut self, config: &Config, binder: &Binder<'_>, def: &TypeDef) -> Result<(), CodegenError> {
        let go_name = to_go_name(&def.name);
        let mut methods = vec![Func::new(format!("Is{}", go_name), Signature::default())];
        let mut getters = Vec::new();
        if def.kind == TypeKind::Interface && !config.omit_getters {
            for field in def.fields.iter().filter(|f| f.arguments.is_empty()) {
                let ty = binder.go_type(&field.ty, Position::Field)?;
                let getter = format!("Get{}", to_go_name(&field.name));
                getters.push((getter.clone(), self.imports.format_type(&ty), field.description.clone()));
                methods.push(Func::new(
                    getter,
                    Signature::new(Vec::new(), vec![Var::new("", ty)]),
                ));
            }
        }

        let named = Self::placeholder(config, &go_name)?;
        config.packages.complete_named(
            named.id,
            Type::Interface(InterfaceType {
                methods,
                complete: true,
            }),
        )?;

        let out = &mut self.body;
        if let Some(description) = &def.description {
            out.push_str(&go_comment(description, ""));
        }
        writeln!(out, "type {} interface {{", go_name)?;
        writeln!(out, "\tIs{}()", go_name)?;
        for (getter, ty, description) in getters {
            if let Some(description) = description {
                out.push_str(&go_comment(&description, "\t"));
            }
            writeln!(out, "\t{}() {}", getter, ty)?;
        }
        writeln!(out, "}}")?;
        writeln!(out)?;

        self.generated.push((def.name.clone(), go_name));
        Ok(())
    }

    fn write_struct(
        &mut self,
        config: &Config,
        binder: &Binder<'_>,
        def: &TypeDef,
        markers: &[&TypeDef],
    ) -> Result<(), CodegenError> {
        let go_name = to_go_name(&def.name);
        let members: Vec<(&str, &TypeRef, &Option<String>)> = if def.kind == TypeKind::InputObject {
            def.input_fields
                .iter()
                .map(|f| (f.name.as_str(), &f.ty, &f.description))
                .collect()
        } else {
            // fields with arguments are left to resolvers
            def.fields
                .iter()
                .filter(|f| f.arguments.is_empty())
                .map(|f| (f.name.as_str(), &f.ty, &f.description))
                .collect()
        };

        let mut fields = Vec::with_capacity(members.len());
        let mut rows = Vec::with_capacity(members.len());
        for (name, type_ref, description) in members {
            let ty = binder.go_type(type_ref, Position::Field)?;
            let tag = if type_ref.is_non_null() {
                format!("json:\"{}\"", name)
            } else {
                format!("json:\"{},omitempty\"", name)
            };
            rows.push(Row {
                name: to_go_name(name),
                ty: self.imports.format_type(&ty),
                tag: tag.clone(),
                description: description.clone(),
            });
            fields.push(Field::new(to_go_name(name), ty).with_tag(tag));
        }

        let named = Self::placeholder(config, &go_name)?;
        config
            .packages
            .complete_named(named.id, Type::structure(fields))?;

        let out = &mut self.body;
        if let Some(description) = &def.description {
            out.push_str(&go_comment(description, ""));
        }
        writeln!(out, "type {} struct {{", go_name)?;
        write_rows(out, &rows)?;
        writeln!(out, "}}")?;
        writeln!(out)?;

        for marker in markers {
            let marker_name = to_go_name(&marker.name);
            writeln!(out, "func ({}) Is{}() {{}}", go_name, marker_name)?;
            config.packages.add_method(
                named.id,
                Func::new(
                    format!("Is{}", marker_name),
                    Signature::default().with_receiver(Var::new("", Type::Named(named.clone()))),
                ),
            )?;

            if marker.kind != TypeKind::Interface || config.omit_getters {
                continue;
            }
            for field in marker.fields.iter().filter(|f| f.arguments.is_empty()) {
                let field_name = to_go_name(&field.name);
                let ty = binder.go_type(&field.ty, Position::Field)?;
                writeln!(
                    out,
                    "func (this {}) Get{}() {} {{ return this.{} }}",
                    go_name,
                    field_name,
                    self.imports.format_type(&ty),
                    field_name
                )?;
            }
        }
        if !markers.is_empty() {
            writeln!(out)?;
        }

        self.generated.push((def.name.clone(), go_name));
        Ok(())
    }

    fn write_enum(&mut self, config: &Config, def: &TypeDef) -> Result<(), CodegenError> {
        let go_name = to_go_name(&def.name);
        let named = Self::placeholder(config, &go_name)?;
        config.packages.complete_named(named.id, Type::string())?;

        for pkg in ["fmt", "io", "strconv"] {
            self.imports.reserve(pkg, None);
        }

        let consts: Vec<(String, &str)> = def
            .enum_values
            .iter()
            .map(|v| (format!("{}{}", go_name, to_go_name(&v.name)), v.name.as_str()))
            .collect();
        let width = consts.iter().map(|(c, _)| c.len()).max().unwrap_or(0);

        let out = &mut self.body;
        if let Some(description) = &def.description {
            out.push_str(&go_comment(description, ""));
        }
        writeln!(out, "type {} string", go_name)?;
        writeln!(out)?;
        writeln!(out, "const (")?;
        for ((constant, value), enum_value) in consts.iter().zip(&def.enum_values) {
            if let Some(description) = &enum_value.description {
                out.push_str(&go_comment(description, "\t"));
            }
            writeln!(out, "\t{:<width$} {} = \"{}\"", constant, go_name, value, width = width)?;
        }
        writeln!(out, ")")?;
        writeln!(out)?;

        writeln!(out, "var All{} = []{}{{", go_name, go_name)?;
        for (constant, _) in &consts {
            writeln!(out, "\t{},", constant)?;
        }
        writeln!(out, "}}")?;
        writeln!(out)?;

        let names: Vec<&str> = consts.iter().map(|(c, _)| c.as_str()).collect();
        writeln!(out, "func (e {}) IsValid() bool {{", go_name)?;
        writeln!(out, "\tswitch e {{")?;
        if !names.is_empty() {
            writeln!(out, "\tcase {}:", names.join(", "))?;
            writeln!(out, "\t\treturn true")?;
        }
        writeln!(out, "\t}}")?;
        writeln!(out, "\treturn false")?;
        writeln!(out, "}}")?;
        writeln!(out)?;

        writeln!(out, "func (e {}) String() string {{", go_name)?;
        writeln!(out, "\treturn string(e)")?;
        writeln!(out, "}}")?;
        writeln!(out)?;

        writeln!(out, "func (e *{}) UnmarshalGQL(v interface{{}}) error {{", go_name)?;
        writeln!(out, "\tstr, ok := v.(string)")?;
        writeln!(out, "\tif !ok {{")?;
        writeln!(out, "\t\treturn fmt.Errorf(\"enums must be strings\")")?;
        writeln!(out, "\t}}")?;
        writeln!(out)?;
        writeln!(out, "\t*e = {}(str)", go_name)?;
        writeln!(out, "\tif !e.IsValid() {{")?;
        writeln!(out, "\t\treturn fmt.Errorf(\"%s is not a valid {}\", str)", go_name)?;
        writeln!(out, "\t}}")?;
        writeln!(out, "\treturn nil")?;
        writeln!(out, "}}")?;
        writeln!(out)?;

        writeln!(out, "func (e {}) MarshalGQL(w io.Writer) {{", go_name)?;
        writeln!(out, "\tfmt.Fprint(w, strconv.Quote(e.String()))")?;
        writeln!(out, "}}")?;
        writeln!(out)?;

        self.generated.push((def.name.clone(), go_name));
        Ok(())
    }
}

fn write_rows(out: &mut String, rows: &[Row]) -> Result<(), CodegenError> {
    let name_width = rows.iter().map(|r| r.name.len()).max().unwrap_or(0);
    let type_width = rows.iter().map(|r| r.ty.len()).max().unwrap_or(0);
    for row in rows {
        if let Some(description) = &row.description {
            out.push_str(&go_comment(description, "\t"));
        }
        writeln!(
            out,
            "\t{:<nw$} {:<tw$} `{}`",
            row.name,
            row.ty,
            row.tag,
            nw = name_width,
            tw = type_width
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use crate::interceptor::OutputInterceptor;
    use gqlforge_core::PackageLoader;
    use serial_test::serial;

    const SDL: &str = r#"
interface Node { id: ID! }
union SearchResult = User
"A registered user"
type User implements Node {
  id: ID!
  name: String
  role: Role!
  friends(first: Int): [User!]!
}
input NewUser { name: String! role: Role }
enum Role { ADMIN GUEST }
type Query { me: User }
"#;

    fn generate(sdl: &str) -> (Config, String) {
        let mut config = ConfigBuilder::new()
            .build_config(sdl, "example.com/app")
            .unwrap();
        let interceptor = OutputInterceptor::new();
        interceptor.start();
        ModelGen::new().mutate_config(&mut config).unwrap();
        interceptor.stop();
        let files = interceptor.files();
        let models = files
            .get("generated/models_gen.go")
            .map(|b| String::from_utf8(b.clone()).unwrap())
            .unwrap_or_default();
        (config, models)
    }

    #[test]
    #[serial]
    fn test_generates_models_and_maps_them() {
        let (config, models) = generate(SDL);

        assert!(models.starts_with(templates::GENERATED_HEADER));
        assert!(models.contains("package generated"));
        assert!(models.contains("// A registered user\ntype User struct {"));
        assert!(models.contains("\tID   string  `json:\"id\"`"));
        assert!(models.contains("\tName *string `json:\"name,omitempty\"`"));
        assert!(!models.contains("Friends"));
        assert!(models.contains("type Node interface {\n\tIsNode()\n\tGetID() string\n}"));
        assert!(models.contains("func (User) IsNode() {}"));
        assert!(models.contains("func (this User) GetID() string { return this.ID }"));
        assert!(models.contains("func (User) IsSearchResult() {}"));
        assert!(models.contains("\tRoleAdmin Role = \"ADMIN\""));
        assert!(models.contains("func (e *Role) UnmarshalGQL(v interface{}) error {"));
        assert!(models.contains("\t\"strconv\""));
        assert!(!models.contains("type Query struct"));

        assert_eq!(
            config.models.get("User").unwrap(),
            ["example.com/app/generated.User".to_string()]
        );
        let user = config
            .packages
            .lookup_type("example.com/app/generated", "User")
            .unwrap();
        let name = config.packages.field(&user, "Name").unwrap();
        assert_eq!(name.tag_value("json"), Some("name,omitempty"));
        assert!(config.packages.method(&user, "IsNode").is_some());
    }

    #[test]
    #[serial]
    fn test_omit_getters() {
        let mut config = ConfigBuilder::new().build_config(SDL, "").unwrap();
        config.omit_getters = true;
        let interceptor = OutputInterceptor::new();
        interceptor.start();
        ModelGen::new().mutate_config(&mut config).unwrap();
        let models = String::from_utf8(interceptor.files()["generated/models_gen.go"].clone()).unwrap();
        assert!(!models.contains("GetID"));
        assert!(models.contains("func (User) IsNode() {}"));
    }

    #[test]
    #[serial]
    fn test_nothing_to_generate_renders_nothing() {
        let (config, models) = generate("type Query { ok: Boolean! }");
        assert!(models.is_empty());
        assert!(!config.models.contains("Query"));
    }
}
