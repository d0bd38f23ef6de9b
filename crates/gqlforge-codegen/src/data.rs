//! Binding of schema types to Go types
//!
//! [`build_data`] walks the schema and resolves every type through the
//! type map, autobind packages and the model package, then decides for
//! each object field whether it is served by a struct field, a method, or a
//! resolver the user has to write.

use gqlforge_core::naming::{to_go_name, to_go_private_name};
use gqlforge_core::{BasicKind, Func, PackageLoader, Type};
use tracing::{debug, instrument, warn};

use crate::config::{split_type_ref, Config, GRAPHQL_PKG, MAP_TYPE};
use crate::error::CodegenError;
use crate::schema::{FieldDef, InputValueDef, TypeDef, TypeKind, TypeRef};

/// How an object field gets its value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldBinding {
    StructField { name: String },
    Method {
        name: String,
        has_context: bool,
        returns_error: bool,
    },
    Resolver,
}

/// Where a type reference appears; pointer rules differ per position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// Generated struct field
    Field,
    /// Resolver or method result
    Result,
    /// Resolver argument
    Argument,
    /// Slice element
    Element,
}

#[derive(Debug, Clone)]
pub struct FieldArgument {
    pub name: String,
    /// Go parameter name
    pub var_name: String,
    pub type_ref: TypeRef,
    pub go_type: Type,
    pub default_value: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ObjectField {
    pub name: String,
    pub go_name: String,
    pub description: Option<String>,
    pub type_ref: TypeRef,
    pub go_type: Type,
    pub args: Vec<FieldArgument>,
    pub binding: FieldBinding,
}

impl ObjectField {
    pub fn is_resolver(&self) -> bool {
        self.binding == FieldBinding::Resolver
    }
}

#[derive(Debug, Clone)]
pub struct Object {
    pub name: String,
    pub go_name: String,
    pub kind: TypeKind,
    pub description: Option<String>,
    /// `None` for root operation types
    pub go_type: Option<Type>,
    pub root: bool,
    pub implements: Vec<String>,
    pub fields: Vec<ObjectField>,
}

impl Object {
    pub fn resolver_fields(&self) -> impl Iterator<Item = &ObjectField> {
        self.fields.iter().filter(|f| f.is_resolver())
    }

    pub fn has_resolvers(&self) -> bool {
        self.fields.iter().any(ObjectField::is_resolver)
    }
}

/// An interface or union
#[derive(Debug, Clone)]
pub struct Interface {
    pub name: String,
    pub go_name: String,
    pub kind: TypeKind,
    pub go_type: Type,
    pub implementors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Enum {
    pub name: String,
    pub go_type: Type,
    pub values: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Scalar {
    pub name: String,
    pub go_type: Type,
}

/// The bound schema handed to code generators
#[derive(Debug)]
pub struct Data<'a> {
    pub config: &'a Config,
    pub objects: Vec<Object>,
    pub inputs: Vec<Object>,
    pub interfaces: Vec<Interface>,
    pub enums: Vec<Enum>,
    pub scalars: Vec<Scalar>,
}

impl<'a> Data<'a> {
    /// Root operation objects in query, mutation, subscription order
    pub fn roots(&self) -> impl Iterator<Item = &Object> {
        let schema = &self.config.schema;
        [&schema.query, &schema.mutation, &schema.subscription]
            .into_iter()
            .flatten()
            .filter_map(move |name| self.objects.iter().find(|o| &o.name == name))
    }

    pub fn object(&self, name: &str) -> Option<&Object> {
        self.objects.iter().find(|o| o.name == name)
    }

    /// Objects with at least one resolver field, roots first
    pub fn resolver_objects(&self) -> Vec<&Object> {
        let mut objects: Vec<&Object> = self.roots().filter(|o| o.has_resolvers()).collect();
        objects.extend(
            self.objects
                .iter()
                .filter(|o| !o.root && o.has_resolvers()),
        );
        objects
    }
}

#[instrument(skip(config), level = "debug")]
pub fn build_data(config: &Config) -> Result<Data<'_>, CodegenError> {
    let binder = Binder::new(config);
    let schema = &config.schema;
    let mut data = Data {
        config,
        objects: Vec::new(),
        inputs: Vec::new(),
        interfaces: Vec::new(),
        enums: Vec::new(),
        scalars: Vec::new(),
    };

    for def in schema.user_types() {
        match def.kind {
            TypeKind::Object => data.objects.push(binder.bind_object(def)?),
            TypeKind::InputObject => data.inputs.push(binder.bind_input(def)?),
            TypeKind::Interface | TypeKind::Union => data.interfaces.push(Interface {
                name: def.name.clone(),
                go_name: to_go_name(&def.name),
                kind: def.kind,
                go_type: binder.bound_type(&def.name)?,
                implementors: def.possible_types.clone(),
            }),
            TypeKind::Enum => data.enums.push(Enum {
                name: def.name.clone(),
                go_type: binder.bound_type(&def.name)?,
                values: def.enum_values.iter().map(|v| v.name.clone()).collect(),
            }),
            TypeKind::Scalar => data.scalars.push(Scalar {
                name: def.name.clone(),
                go_type: binder.bound_type(&def.name)?,
            }),
        }
    }

    debug!(
        objects = data.objects.len(),
        inputs = data.inputs.len(),
        resolvers = data.resolver_objects().len(),
        "bound schema"
    );
    Ok(data)
}

/// Resolves schema type references to Go types
pub struct Binder<'a> {
    config: &'a Config,
}

impl<'a> Binder<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    fn packages(&self) -> &dyn PackageLoader {
        self.config.packages.as_ref()
    }

    /// The Go type a schema type name is bound to
    pub fn bound_type(&self, name: &str) -> Result<Type, CodegenError> {
        if let Some(refs) = self.config.models.get(name) {
            return refs
                .iter()
                .find_map(|go_ref| self.resolve_ref(go_ref))
                .ok_or_else(|| {
                    CodegenError::binding(name, format!("none of {} could be loaded", refs.join(", ")))
                });
        }

        let go_name = to_go_name(name);
        for pkg in &self.config.autobind {
            if let Ok(ty) = self.packages().lookup_type(pkg, &go_name) {
                return Ok(ty);
            }
        }
        if let Ok(ty) = self
            .packages()
            .lookup_type(&self.config.model.import_path, &go_name)
        {
            return Ok(ty);
        }

        match self.config.schema.kind_of(name) {
            Some(TypeKind::Scalar) => {
                warn!("scalar {} has no Go binding, using string", name);
                Ok(self
                    .packages()
                    .lookup_type(GRAPHQL_PKG, "String")
                    .unwrap_or_else(|_| Type::string()))
            }
            Some(_) => Err(CodegenError::binding(
                name,
                "no Go type in the type map, autobind packages or model package",
            )),
            None => Err(CodegenError::binding(name, "not defined in the schema")),
        }
    }

    fn resolve_ref(&self, go_ref: &str) -> Option<Type> {
        if go_ref == MAP_TYPE {
            return Some(Type::map(Type::string(), Type::any()));
        }
        if let Some(kind) = BasicKind::from_name(go_ref) {
            return Some(Type::basic(kind));
        }
        let (path, name) = split_type_ref(go_ref)?;
        self.packages().lookup_type(path, name).ok()
    }

    /// Go type of a reference at a position
    pub fn go_type(&self, ty: &TypeRef, position: Position) -> Result<Type, CodegenError> {
        self.go_type_inner(ty, true, position)
    }

    fn go_type_inner(&self, ty: &TypeRef, nullable: bool, position: Position) -> Result<Type, CodegenError> {
        match ty {
            TypeRef::NonNull(inner) => self.go_type_inner(inner, false, position),
            TypeRef::List(inner) => Ok(Type::slice(self.go_type_inner(
                inner,
                true,
                Position::Element,
            )?)),
            TypeRef::Named(name) => {
                let base = self.bound_type(name)?;
                let kind = self.config.schema.kind_of(name);
                if kind.map(TypeKind::is_abstract).unwrap_or(false) || !self.pointable(&base) {
                    return Ok(base);
                }
                let is_object = matches!(kind, Some(TypeKind::Object));
                let pointer = match position {
                    Position::Element => {
                        (nullable || is_object) && !self.config.omit_slice_element_pointers
                    }
                    Position::Field => {
                        nullable
                            || (self.config.struct_fields_always_pointers
                                && matches!(kind, Some(TypeKind::Object | TypeKind::InputObject)))
                    }
                    Position::Result => nullable || is_object,
                    Position::Argument => nullable,
                };
                Ok(if pointer { Type::pointer(base) } else { base })
            }
        }
    }

    /// Maps, slices and interfaces are never wrapped in a pointer
    fn pointable(&self, ty: &Type) -> bool {
        !matches!(
            self.packages().underlying(ty),
            Type::Map(..) | Type::Slice(_) | Type::Interface(_)
        )
    }

    fn bind_object(&self, def: &TypeDef) -> Result<Object, CodegenError> {
        let root = self.config.schema.is_root(&def.name);
        let go_type = if root {
            None
        } else {
            Some(self.bound_type(&def.name)?)
        };

        let fields = def
            .fields
            .iter()
            .map(|field| {
                let binding = match &go_type {
                    Some(ty) => self.bind_field(ty, field),
                    None => FieldBinding::Resolver,
                };
                self.object_field(field, binding)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Object {
            name: def.name.clone(),
            go_name: to_go_name(&def.name),
            kind: def.kind,
            description: def.description.clone(),
            go_type,
            root,
            implements: def.interfaces.clone(),
            fields,
        })
    }

    fn bind_input(&self, def: &TypeDef) -> Result<Object, CodegenError> {
        let go_type = self.bound_type(&def.name)?;
        let fields = def
            .input_fields
            .iter()
            .map(|field| {
                let binding = self.bind_struct_field(&go_type, &field.name).ok_or_else(|| {
                    CodegenError::binding(
                        &def.name,
                        format!("input field {} has no matching struct field", field.name),
                    )
                })?;
                Ok(ObjectField {
                    name: field.name.clone(),
                    go_name: to_go_name(&field.name),
                    description: field.description.clone(),
                    type_ref: field.ty.clone(),
                    go_type: self.go_type(&field.ty, Position::Field)?,
                    args: Vec::new(),
                    binding,
                })
            })
            .collect::<Result<Vec<_>, CodegenError>>()?;

        Ok(Object {
            name: def.name.clone(),
            go_name: to_go_name(&def.name),
            kind: def.kind,
            description: def.description.clone(),
            go_type: Some(go_type),
            root: false,
            implements: Vec::new(),
            fields,
        })
    }

    fn object_field(&self, field: &FieldDef, binding: FieldBinding) -> Result<ObjectField, CodegenError> {
        let position = if binding == FieldBinding::Resolver {
            Position::Result
        } else {
            Position::Field
        };
        Ok(ObjectField {
            name: field.name.clone(),
            go_name: to_go_name(&field.name),
            description: field.description.clone(),
            type_ref: field.ty.clone(),
            go_type: self.go_type(&field.ty, position)?,
            args: field
                .arguments
                .iter()
                .map(|arg| self.argument(arg))
                .collect::<Result<Vec<_>, _>>()?,
            binding,
        })
    }

    fn argument(&self, arg: &InputValueDef) -> Result<FieldArgument, CodegenError> {
        Ok(FieldArgument {
            name: arg.name.clone(),
            var_name: to_go_private_name(&arg.name),
            type_ref: arg.ty.clone(),
            go_type: self.go_type(&arg.ty, Position::Argument)?,
            default_value: arg.default_value.clone(),
        })
    }

    /// Method on the pointer type, then struct field; fields with
    /// arguments only bind to methods
    pub fn bind_field(&self, go_type: &Type, field: &FieldDef) -> FieldBinding {
        let go_name = to_go_name(&field.name);
        if let Some(method) = self.packages().method(&Type::pointer(go_type.clone()), &go_name) {
            return method_binding(&method);
        }
        if !field.arguments.is_empty() {
            return FieldBinding::Resolver;
        }
        self.bind_struct_field(go_type, &field.name)
            .unwrap_or(FieldBinding::Resolver)
    }

    fn bind_struct_field(&self, go_type: &Type, graphql_name: &str) -> Option<FieldBinding> {
        let go_name = to_go_name(graphql_name);
        if let Some(field) = self.packages().field(go_type, &go_name) {
            return Some(FieldBinding::StructField { name: field.name });
        }
        match self.packages().underlying(go_type.deref()) {
            Type::Struct(s) => s
                .fields
                .into_iter()
                .find(|f| {
                    f.tag_value("json")
                        .and_then(|v| v.split(',').next())
                        .map(|v| v == graphql_name)
                        .unwrap_or(false)
                })
                .map(|f| FieldBinding::StructField { name: f.name }),
            _ => None,
        }
    }
}

fn method_binding(method: &Func) -> FieldBinding {
    FieldBinding::Method {
        name: method.name.clone(),
        has_context: method.has_context,
        returns_error: method.returns_error(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use gqlforge_core::{Field, Signature, TypeRegistry, Var};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::{ConfigBuilder, ConfigOptions};

    const MODELS: &str = "github.com/acme/api/models";

    fn remote_registry() -> Arc<TypeRegistry> {
        let registry = Arc::new(TypeRegistry::new());
        registry.register_common_types();
        registry.register_package(MODELS, "models");
        let user = registry.declare_named(MODELS, "User").unwrap();
        registry
            .complete_named(
                user.id,
                Type::structure(vec![
                    Field::new("ID", Type::string()),
                    Field::new("DisplayName", Type::string()).with_tag(r#"json:"name""#),
                ]),
            )
            .unwrap();
        let context = registry.lookup_type("context", "Context").unwrap();
        let error = registry.lookup_type("", "error").unwrap_or(Type::Invalid);
        let signature = Signature::new(
            vec![Var::new("ctx", context)],
            vec![Var::new("", Type::string()), Var::new("", error)],
        )
        .with_receiver(Var::new("u", Type::pointer(Type::Named(user.clone()))));
        registry
            .add_method(user.id, Func::new("Email", signature))
            .unwrap();
        registry
    }

    fn config(sdl: &str, registry: Arc<TypeRegistry>, opts: ConfigOptions) -> Config {
        let opts = ConfigOptions {
            schema: sdl.to_string(),
            ..opts
        };
        ConfigBuilder::with_registry(registry)
            .build_config_with_options(&opts)
            .unwrap()
    }

    const SDL: &str = r#"
type Query {
  user(id: ID!): User
  users: [User!]!
}
type User {
  id: ID!
  name: String!
  email: String!
  avatar(size: Int): String
  posts: [String]
}
"#;

    #[test]
    fn test_bound_object_fields() {
        let mut models = std::collections::BTreeMap::new();
        models.insert("User".to_string(), format!("{}.User", MODELS));
        let config = config(
            SDL,
            remote_registry(),
            ConfigOptions {
                models,
                ..ConfigOptions::default()
            },
        );
        let data = build_data(&config).unwrap();

        let user = data.object("User").unwrap();
        let binding = |name: &str| {
            user.fields
                .iter()
                .find(|f| f.name == name)
                .map(|f| f.binding.clone())
                .unwrap()
        };
        assert_eq!(binding("id"), FieldBinding::StructField { name: "ID".to_string() });
        assert_eq!(
            binding("name"),
            FieldBinding::StructField { name: "DisplayName".to_string() }
        );
        match binding("email") {
            FieldBinding::Method { name, has_context, .. } => {
                assert_eq!(name, "Email");
                assert!(has_context);
            }
            other => panic!("expected method binding, got {:?}", other),
        }
        assert_eq!(binding("avatar"), FieldBinding::Resolver);
        assert_eq!(binding("posts"), FieldBinding::Resolver);
    }

    #[test]
    fn test_root_fields_always_resolve() {
        let registry = Arc::new(TypeRegistry::new());
        let config = config(SDL, registry.clone(), ConfigOptions::default());
        let data = build_data(&config).unwrap();

        let query = data.roots().next().unwrap();
        assert!(query.root);
        assert!(query.go_type.is_none());
        assert!(query.fields.iter().all(ObjectField::is_resolver));

        let user_arg = &query.fields[0].args[0];
        assert_eq!(user_arg.var_name, "id");
        assert_eq!(user_arg.go_type, Type::string());
    }

    #[test]
    fn test_pointer_rules() {
        let registry = Arc::new(TypeRegistry::new());
        let config = config(SDL, registry, ConfigOptions::default());
        let binder = Binder::new(&config);
        let user = binder.bound_type("User").unwrap();

        let users = TypeRef::non_null(TypeRef::list(TypeRef::non_null(TypeRef::named("User"))));
        assert_eq!(
            binder.go_type(&users, Position::Result).unwrap(),
            Type::slice(Type::pointer(user.clone()))
        );
        assert_eq!(
            binder.go_type(&TypeRef::named("User"), Position::Result).unwrap(),
            Type::pointer(user.clone())
        );
        assert_eq!(
            binder
                .go_type(&TypeRef::non_null(TypeRef::named("String")), Position::Field)
                .unwrap(),
            Type::string()
        );
        assert_eq!(
            binder.go_type(&TypeRef::named("Int"), Position::Argument).unwrap(),
            Type::pointer(Type::basic(BasicKind::Int))
        );
        assert_eq!(
            binder.go_type(&TypeRef::named("Map"), Position::Field).unwrap(),
            Type::map(Type::string(), Type::any())
        );
    }

    #[test]
    fn test_omit_slice_element_pointers() {
        let registry = Arc::new(TypeRegistry::new());
        let config = config(
            SDL,
            registry,
            ConfigOptions {
                omit_slice_element_pointers: true,
                ..ConfigOptions::default()
            },
        );
        let binder = Binder::new(&config);
        let user = binder.bound_type("User").unwrap();
        let users = TypeRef::list(TypeRef::non_null(TypeRef::named("User")));
        assert_eq!(binder.go_type(&users, Position::Result).unwrap(), Type::slice(user));
    }

    #[test]
    fn test_unbound_custom_scalar_falls_back_to_string() {
        let sdl = "scalar DateTime\ntype Query { now: DateTime! }";
        let config = config(sdl, Arc::new(TypeRegistry::new()), ConfigOptions::default());
        let data = build_data(&config).unwrap();
        assert_eq!(data.scalars[0].go_type, Type::string());
    }

    #[test]
    fn test_unresolvable_model_is_a_binding_error() {
        let mut models = std::collections::BTreeMap::new();
        models.insert("Query".to_string(), "github.com/acme/missing.Query".to_string());
        models.insert("User".to_string(), "github.com/acme/missing.User".to_string());
        let config = config(
            "type Query { me: User }\ntype User { id: ID! }",
            Arc::new(TypeRegistry::new()),
            ConfigOptions {
                models,
                ..ConfigOptions::default()
            },
        );
        let err = build_data(&config).unwrap_err();
        match err {
            CodegenError::Binding { type_name, .. } => assert_eq!(type_name, "User"),
            other => panic!("expected binding error, got {:?}", other),
        }
    }
}
