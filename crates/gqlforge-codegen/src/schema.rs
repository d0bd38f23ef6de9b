//! GraphQL schema model
//!
//! SDL is parsed with `graphql-parser` and flattened into an owned model:
//! one [`TypeDef`] per named type with extensions merged in, builtin
//! scalars and introspection types present, and root operation types
//! resolved.

use std::collections::BTreeMap;
use std::fmt;

use graphql_parser::schema::{self as ast, Definition, TypeDefinition, TypeExtension};
use serde::Serialize;
use tracing::debug;

use crate::error::CodegenError;

pub const BUILTIN_SCALARS: &[&str] = &["String", "Int", "Float", "Boolean", "ID"];

const INTROSPECTION_OBJECTS: &[&str] = &[
    "__Schema",
    "__Type",
    "__Field",
    "__InputValue",
    "__EnumValue",
    "__Directive",
];

const INTROSPECTION_ENUMS: &[(&str, &[&str])] = &[
    (
        "__TypeKind",
        &["SCALAR", "OBJECT", "INTERFACE", "UNION", "ENUM", "INPUT_OBJECT", "LIST", "NON_NULL"],
    ),
    (
        "__DirectiveLocation",
        &[
            "QUERY",
            "MUTATION",
            "SUBSCRIPTION",
            "FIELD",
            "FRAGMENT_DEFINITION",
            "FRAGMENT_SPREAD",
            "INLINE_FRAGMENT",
            "VARIABLE_DEFINITION",
            "SCHEMA",
            "SCALAR",
            "OBJECT",
            "FIELD_DEFINITION",
            "ARGUMENT_DEFINITION",
            "INTERFACE",
            "UNION",
            "ENUM",
            "ENUM_VALUE",
            "INPUT_OBJECT",
            "INPUT_FIELD_DEFINITION",
        ],
    ),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TypeKind {
    Scalar,
    Object,
    Interface,
    Union,
    Enum,
    InputObject,
}

impl TypeKind {
    /// Valid as an argument or input field type
    pub fn is_input(self) -> bool {
        matches!(self, TypeKind::Scalar | TypeKind::Enum | TypeKind::InputObject)
    }

    /// Valid as an object or interface field type
    pub fn is_output(self) -> bool {
        !matches!(self, TypeKind::InputObject)
    }

    /// Represented in Go by an interface type
    pub fn is_abstract(self) -> bool {
        matches!(self, TypeKind::Interface | TypeKind::Union)
    }
}

/// A type reference such as `[User!]!`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TypeRef {
    Named(String),
    List(Box<TypeRef>),
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef::Named(name.into())
    }

    pub fn non_null(inner: TypeRef) -> Self {
        TypeRef::NonNull(Box::new(inner))
    }

    pub fn list(inner: TypeRef) -> Self {
        TypeRef::List(Box::new(inner))
    }

    /// Innermost named type
    pub fn name(&self) -> &str {
        match self {
            TypeRef::Named(name) => name,
            TypeRef::List(inner) | TypeRef::NonNull(inner) => inner.name(),
        }
    }

    pub fn is_non_null(&self) -> bool {
        matches!(self, TypeRef::NonNull(_))
    }

    pub fn is_list(&self) -> bool {
        match self {
            TypeRef::List(_) => true,
            TypeRef::NonNull(inner) => inner.is_list(),
            TypeRef::Named(_) => false,
        }
    }

    fn from_ast(ty: &ast::Type<'_, String>) -> Self {
        match ty {
            ast::Type::NamedType(name) => TypeRef::Named(name.clone()),
            ast::Type::ListType(inner) => TypeRef::list(TypeRef::from_ast(inner)),
            ast::Type::NonNullType(inner) => TypeRef::non_null(TypeRef::from_ast(inner)),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Named(name) => write!(f, "{}", name),
            TypeRef::List(inner) => write!(f, "[{}]", inner),
            TypeRef::NonNull(inner) => write!(f, "{}!", inner),
        }
    }
}

/// An argument or input object field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputValueDef {
    pub name: String,
    pub description: Option<String>,
    pub ty: TypeRef,
    /// Default value in GraphQL syntax
    pub default_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDef {
    pub name: String,
    pub description: Option<String>,
    pub arguments: Vec<InputValueDef>,
    pub ty: TypeRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnumValueDef {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeDef {
    pub name: String,
    pub kind: TypeKind,
    pub description: Option<String>,
    /// Object and interface fields
    pub fields: Vec<FieldDef>,
    /// Input object fields
    pub input_fields: Vec<InputValueDef>,
    /// Interfaces an object implements
    pub interfaces: Vec<String>,
    /// Union members, or implementors of an interface
    pub possible_types: Vec<String>,
    pub enum_values: Vec<EnumValueDef>,
    /// Predeclared by GraphQL rather than the schema source
    pub builtin: bool,
}

impl TypeDef {
    fn new(name: impl Into<String>, kind: TypeKind, description: Option<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description,
            fields: Vec::new(),
            input_fields: Vec::new(),
            interfaces: Vec::new(),
            possible_types: Vec::new(),
            enum_values: Vec::new(),
            builtin: false,
        }
    }

    fn builtin(name: &str, kind: TypeKind) -> Self {
        let mut def = Self::new(name, kind, None);
        def.builtin = true;
        def
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn is_introspection(&self) -> bool {
        self.name.starts_with("__")
    }
}

/// A parsed and validated schema
#[derive(Debug, Clone, Serialize)]
pub struct Schema {
    pub types: BTreeMap<String, TypeDef>,
    pub query: Option<String>,
    pub mutation: Option<String>,
    pub subscription: Option<String>,
    /// Directive names declared by the schema
    pub directives: Vec<String>,
    /// The SDL the schema was parsed from
    pub source: String,
}

impl Schema {
    pub fn parse(source: &str) -> Result<Self, CodegenError> {
        let document = ast::parse_schema::<String>(source)
            .map_err(|e| CodegenError::SchemaParse(e.to_string()))?;

        let mut schema = Schema {
            types: BTreeMap::new(),
            query: None,
            mutation: None,
            subscription: None,
            directives: Vec::new(),
            source: source.to_string(),
        };
        schema.add_builtins();

        let mut roots = None;
        let mut extensions = Vec::new();
        for definition in document.definitions {
            match definition {
                Definition::SchemaDefinition(def) => {
                    if roots.is_some() {
                        return Err(CodegenError::SchemaParse(format!(
                            "line {}: schema defined more than once",
                            def.position.line
                        )));
                    }
                    roots = Some((def.query, def.mutation, def.subscription));
                }
                Definition::TypeDefinition(def) => schema.add_definition(def)?,
                Definition::TypeExtension(ext) => extensions.push(ext),
                Definition::DirectiveDefinition(def) => schema.directives.push(def.name),
            }
        }
        for ext in extensions {
            schema.apply_extension(ext)?;
        }

        let (query, mutation, subscription) = roots.unwrap_or_else(|| {
            let present = |name: &str| {
                schema
                    .types
                    .get(name)
                    .filter(|t| t.kind == TypeKind::Object)
                    .map(|t| t.name.clone())
            };
            (present("Query"), present("Mutation"), present("Subscription"))
        });
        schema.query = query;
        schema.mutation = mutation;
        schema.subscription = subscription;

        schema.link_possible_types();
        schema.validate()?;
        debug!(types = schema.types.len(), "parsed schema");
        Ok(schema)
    }

    fn add_builtins(&mut self) {
        for name in BUILTIN_SCALARS {
            self.insert_builtin(TypeDef::builtin(name, TypeKind::Scalar));
        }
        for name in INTROSPECTION_OBJECTS {
            self.insert_builtin(TypeDef::builtin(name, TypeKind::Object));
        }
        for (name, values) in INTROSPECTION_ENUMS {
            let mut def = TypeDef::builtin(name, TypeKind::Enum);
            def.enum_values = values
                .iter()
                .map(|v| EnumValueDef {
                    name: v.to_string(),
                    description: None,
                })
                .collect();
            self.insert_builtin(def);
        }
    }

    fn insert_builtin(&mut self, def: TypeDef) {
        self.types.insert(def.name.clone(), def);
    }

    fn insert(&mut self, def: TypeDef, line: usize) -> Result<(), CodegenError> {
        if let Some(existing) = self.types.get(&def.name) {
            if !existing.builtin {
                return Err(CodegenError::SchemaParse(format!(
                    "line {}: type {} defined more than once",
                    line, def.name
                )));
            }
        }
        self.types.insert(def.name.clone(), def);
        Ok(())
    }

    fn add_definition(&mut self, def: TypeDefinition<'_, String>) -> Result<(), CodegenError> {
        match def {
            TypeDefinition::Scalar(t) => {
                self.insert(TypeDef::new(t.name, TypeKind::Scalar, t.description), t.position.line)
            }
            TypeDefinition::Object(t) => {
                let mut def = TypeDef::new(t.name, TypeKind::Object, t.description);
                def.interfaces = t.implements_interfaces;
                def.fields = t.fields.iter().map(field_def).collect();
                self.insert(def, t.position.line)
            }
            TypeDefinition::Interface(t) => {
                let mut def = TypeDef::new(t.name, TypeKind::Interface, t.description);
                def.fields = t.fields.iter().map(field_def).collect();
                self.insert(def, t.position.line)
            }
            TypeDefinition::Union(t) => {
                let mut def = TypeDef::new(t.name, TypeKind::Union, t.description);
                def.possible_types = t.types;
                self.insert(def, t.position.line)
            }
            TypeDefinition::Enum(t) => {
                let mut def = TypeDef::new(t.name, TypeKind::Enum, t.description);
                def.enum_values = t
                    .values
                    .into_iter()
                    .map(|v| EnumValueDef {
                        name: v.name,
                        description: v.description,
                    })
                    .collect();
                self.insert(def, t.position.line)
            }
            TypeDefinition::InputObject(t) => {
                let mut def = TypeDef::new(t.name, TypeKind::InputObject, t.description);
                def.input_fields = t.fields.iter().map(input_value_def).collect();
                self.insert(def, t.position.line)
            }
        }
    }

    fn extension_target(
        &mut self,
        name: &str,
        kind: TypeKind,
        line: usize,
    ) -> Result<&mut TypeDef, CodegenError> {
        match self.types.get_mut(name) {
            Some(def) if def.kind == kind && !def.builtin => Ok(def),
            Some(_) => Err(CodegenError::SchemaParse(format!(
                "line {}: cannot extend {} as {:?}",
                line, name, kind
            ))),
            None => Err(CodegenError::SchemaParse(format!(
                "line {}: cannot extend undefined type {}",
                line, name
            ))),
        }
    }

    fn apply_extension(&mut self, ext: TypeExtension<'_, String>) -> Result<(), CodegenError> {
        match ext {
            TypeExtension::Scalar(e) => {
                self.extension_target(&e.name, TypeKind::Scalar, e.position.line)?;
            }
            TypeExtension::Object(e) => {
                let def = self.extension_target(&e.name, TypeKind::Object, e.position.line)?;
                def.interfaces.extend(e.implements_interfaces);
                def.fields.extend(e.fields.iter().map(field_def));
            }
            TypeExtension::Interface(e) => {
                let def = self.extension_target(&e.name, TypeKind::Interface, e.position.line)?;
                def.fields.extend(e.fields.iter().map(field_def));
            }
            TypeExtension::Union(e) => {
                let def = self.extension_target(&e.name, TypeKind::Union, e.position.line)?;
                def.possible_types.extend(e.types);
            }
            TypeExtension::Enum(e) => {
                let def = self.extension_target(&e.name, TypeKind::Enum, e.position.line)?;
                def.enum_values.extend(e.values.into_iter().map(|v| EnumValueDef {
                    name: v.name,
                    description: v.description,
                }));
            }
            TypeExtension::InputObject(e) => {
                let def = self.extension_target(&e.name, TypeKind::InputObject, e.position.line)?;
                def.input_fields.extend(e.fields.iter().map(input_value_def));
            }
        }
        Ok(())
    }

    fn link_possible_types(&mut self) {
        let implementors: Vec<(String, String)> = self
            .types
            .values()
            .filter(|t| t.kind == TypeKind::Object)
            .flat_map(|t| t.interfaces.iter().map(move |i| (i.clone(), t.name.clone())))
            .collect();
        for (interface, object) in implementors {
            if let Some(def) = self.types.get_mut(&interface) {
                if def.kind == TypeKind::Interface && !def.possible_types.contains(&object) {
                    def.possible_types.push(object);
                }
            }
        }
    }

    fn validate(&self) -> Result<(), CodegenError> {
        let kind_of = |name: &str, context: &str| {
            self.types.get(name).map(|t| t.kind).ok_or_else(|| {
                CodegenError::SchemaParse(format!("undefined type {} referenced by {}", name, context))
            })
        };

        for def in self.types.values() {
            for field in &def.fields {
                let context = format!("{}.{}", def.name, field.name);
                if !kind_of(field.ty.name(), &context)?.is_output() {
                    return Err(CodegenError::SchemaParse(format!(
                        "{} must be an output type, found input {}",
                        context,
                        field.ty.name()
                    )));
                }
                for arg in &field.arguments {
                    self.check_input(arg, &format!("{}({}:)", context, arg.name))?;
                }
            }
            for field in &def.input_fields {
                self.check_input(field, &format!("{}.{}", def.name, field.name))?;
            }
            for interface in &def.interfaces {
                if kind_of(interface, &def.name)? != TypeKind::Interface {
                    return Err(CodegenError::SchemaParse(format!(
                        "{} implements {}, which is not an interface",
                        def.name, interface
                    )));
                }
            }
            if def.kind == TypeKind::Union {
                for member in &def.possible_types {
                    if kind_of(member, &def.name)? != TypeKind::Object {
                        return Err(CodegenError::SchemaParse(format!(
                            "union {} member {} is not an object type",
                            def.name, member
                        )));
                    }
                }
            }
        }

        for root in [&self.query, &self.mutation, &self.subscription].into_iter().flatten() {
            if self.types.get(root).map(|t| t.kind) != Some(TypeKind::Object) {
                return Err(CodegenError::SchemaParse(format!(
                    "root operation type {} is not a defined object type",
                    root
                )));
            }
        }
        Ok(())
    }

    fn check_input(&self, value: &InputValueDef, context: &str) -> Result<(), CodegenError> {
        match self.types.get(value.ty.name()) {
            Some(t) if t.kind.is_input() => Ok(()),
            Some(_) => Err(CodegenError::SchemaParse(format!(
                "{} must be an input type, found {}",
                context,
                value.ty.name()
            ))),
            None => Err(CodegenError::SchemaParse(format!(
                "undefined type {} referenced by {}",
                value.ty.name(),
                context
            ))),
        }
    }

    pub fn get(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    pub fn kind_of(&self, name: &str) -> Option<TypeKind> {
        self.types.get(name).map(|t| t.kind)
    }

    pub fn is_root(&self, name: &str) -> bool {
        [&self.query, &self.mutation, &self.subscription]
            .into_iter()
            .any(|root| root.as_deref() == Some(name))
    }

    /// Types declared by the schema source, in name order
    pub fn user_types(&self) -> impl Iterator<Item = &TypeDef> {
        self.types.values().filter(|t| !t.builtin)
    }

    pub fn query_type(&self) -> Option<&TypeDef> {
        self.query.as_deref().and_then(|name| self.types.get(name))
    }

    pub fn mutation_type(&self) -> Option<&TypeDef> {
        self.mutation.as_deref().and_then(|name| self.types.get(name))
    }
}

fn field_def(field: &ast::Field<'_, String>) -> FieldDef {
    FieldDef {
        name: field.name.clone(),
        description: field.description.clone(),
        arguments: field.arguments.iter().map(input_value_def).collect(),
        ty: TypeRef::from_ast(&field.field_type),
    }
}

fn input_value_def(value: &ast::InputValue<'_, String>) -> InputValueDef {
    InputValueDef {
        name: value.name.clone(),
        description: value.description.clone(),
        ty: TypeRef::from_ast(&value.value_type),
        default_value: value.default_value.as_ref().map(|v| v.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SDL: &str = r#"
"A user"
type User implements Node {
  id: ID!
  name: String
  friends(first: Int = 10): [User!]!
}

interface Node {
  id: ID!
}

union SearchResult = User

enum Role {
  ADMIN
  USER
}

input NewUser {
  name: String!
  role: Role = USER
}

type Query {
  user(id: ID!): User
  search(term: String!): [SearchResult!]!
}

extend type Query {
  me: User
}

extend enum Role {
  GUEST
}
"#;

    #[test]
    fn test_parse_schema() {
        let schema = Schema::parse(SDL).unwrap();
        assert_eq!(schema.query.as_deref(), Some("Query"));
        assert_eq!(schema.mutation, None);

        let user = schema.get("User").unwrap();
        assert_eq!(user.kind, TypeKind::Object);
        assert_eq!(user.description.as_deref(), Some("A user"));
        assert_eq!(user.interfaces, vec!["Node".to_string()]);
        let friends = user.field("friends").unwrap();
        assert_eq!(friends.ty.to_string(), "[User!]!");
        assert_eq!(friends.arguments[0].default_value.as_deref(), Some("10"));

        assert_eq!(schema.get("Node").unwrap().possible_types, vec!["User".to_string()]);
        assert_eq!(schema.get("NewUser").unwrap().input_fields[1].default_value.as_deref(), Some("USER"));
    }

    #[test]
    fn test_extensions_are_merged() {
        let schema = Schema::parse(SDL).unwrap();
        assert!(schema.get("Query").unwrap().field("me").is_some());
        let roles: Vec<&str> = schema
            .get("Role")
            .unwrap()
            .enum_values
            .iter()
            .map(|v| v.name.as_str())
            .collect();
        assert_eq!(roles, vec!["ADMIN", "USER", "GUEST"]);
    }

    #[test]
    fn test_builtins_present_but_not_user_types() {
        let schema = Schema::parse("type Query { ok: Boolean }").unwrap();
        assert_eq!(schema.kind_of("String"), Some(TypeKind::Scalar));
        assert_eq!(schema.kind_of("__TypeKind"), Some(TypeKind::Enum));
        let user: Vec<&str> = schema.user_types().map(|t| t.name.as_str()).collect();
        assert_eq!(user, vec!["Query"]);
    }

    #[test]
    fn test_explicit_schema_roots() {
        let schema = Schema::parse(
            "schema { query: RootQuery mutation: RootMutation }\ntype RootQuery { a: Int }\ntype RootMutation { b: Int }",
        )
        .unwrap();
        assert!(schema.is_root("RootQuery"));
        assert!(schema.is_root("RootMutation"));
        assert_eq!(schema.mutation_type().unwrap().name, "RootMutation");
    }

    #[test]
    fn test_invalid_schemas() {
        let cases = [
            "type Query { user: Missing }",
            "type Query { a: Int }\ntype Query { b: Int }",
            "input In { a: Int }\ntype Query { bad: In }",
            "type Out { a: Int }\ntype Query { bad(arg: Out): Int }",
            "extend type Nope { a: Int }",
            "type Query {",
            "schema { query: Missing }",
        ];
        for sdl in cases {
            assert!(
                matches!(Schema::parse(sdl), Err(CodegenError::SchemaParse(_))),
                "expected failure for {:?}",
                sdl
            );
        }
    }
}
