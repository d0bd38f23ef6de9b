//! Virtual package registry
//!
//! [`TypeRegistry`] stands in for a loaded on-disk package graph. Packages
//! are keyed by import path, named types by `(import path, name)`. Named
//! type bodies live in an arena so a type can be referenced before its body
//! exists: synthesis first declares every node of a package, then fills the
//! bodies in a second pass.

use std::collections::HashMap;
use std::sync::Arc;

use la_arena::Arena;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use crate::error::CoreError;
use crate::types::{BasicKind, Field, Func, NamedRef, Signature, Type, TypeId, Var};

/// A package known to the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Package {
    path: String,
    name: String,
}

impl Package {
    pub fn new(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Arena node for a named type
#[derive(Debug, Clone, PartialEq)]
pub struct NamedType {
    pub package: String,
    pub name: String,
    /// `None` while the node is a forward-reference placeholder
    pub underlying: Option<Type>,
    pub methods: Vec<Func>,
}

impl NamedType {
    pub fn is_placeholder(&self) -> bool {
        self.underlying.is_none()
    }

    pub fn method(&self, name: &str) -> Option<&Func> {
        self.methods.iter().find(|m| m.name == name)
    }
}

#[derive(Debug, Default)]
struct TypeArena {
    nodes: Arena<NamedType>,
}

impl TypeArena {
    fn alloc(&mut self, package: &str, name: &str, underlying: Option<Type>) -> NamedRef {
        let id = self.nodes.alloc(NamedType {
            package: package.to_string(),
            name: name.to_string(),
            underlying,
            methods: Vec::new(),
        });
        NamedRef {
            id,
            package: package.to_string(),
            name: name.to_string(),
        }
    }

    /// Ids outlive a `clear`, so indexing is range checked
    fn contains(&self, id: TypeId) -> bool {
        (u32::from(id.into_raw()) as usize) < self.nodes.len()
    }

    fn get(&self, id: TypeId) -> Option<&NamedType> {
        self.contains(id).then(|| &self.nodes[id])
    }

    fn get_mut(&mut self, id: TypeId) -> Option<&mut NamedType> {
        if self.contains(id) {
            Some(&mut self.nodes[id])
        } else {
            None
        }
    }
}

type ObjectKey = (String, String);

#[derive(Debug, Default)]
struct RegistryState {
    packages: HashMap<String, Arc<Package>>,
    objects: HashMap<ObjectKey, Type>,
    names: HashMap<String, String>,
    arena: TypeArena,
}

impl RegistryState {
    fn seeded() -> Self {
        let mut state = Self::default();
        state
            .packages
            .insert(String::new(), Arc::new(Package::new("", "")));

        for kind in BasicKind::ALL {
            state
                .objects
                .insert((String::new(), kind.name().to_string()), Type::Basic(kind));
        }
        state
            .objects
            .insert((String::new(), "any".to_string()), Type::any());
        state
            .objects
            .insert((String::new(), "interface{}".to_string()), Type::any());

        let error_method = Func::new(
            "Error",
            Signature::new(Vec::new(), vec![Var::new("", Type::string())]),
        );
        let error = state.arena.alloc(
            "",
            "error",
            Some(Type::interface(vec![error_method])),
        );
        state
            .objects
            .insert((String::new(), "error".to_string()), Type::Named(error));
        state
    }

    /// Store a named node under `(path, name)`
    ///
    /// A key already bound to its own node keeps that node and its id; the
    /// body is replaced and methods are dropped.
    fn bind_named(&mut self, path: &str, name: &str, underlying: Option<Type>) -> NamedRef {
        let key = (path.to_string(), name.to_string());
        if let Some(Type::Named(existing)) = self.objects.get(&key) {
            let existing = existing.clone();
            if existing.is(path, name) {
                if let Some(node) = self.arena.get_mut(existing.id) {
                    node.underlying = underlying;
                    node.methods.clear();
                    return existing;
                }
            }
        }

        let named = self.arena.alloc(path, name, underlying);
        self.objects.insert(key, Type::Named(named.clone()));
        named
    }

    fn ensure_package(&mut self, path: &str, name: &str) -> Arc<Package> {
        self.packages
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(Package::new(path, name)))
            .clone()
    }
}

/// In-memory replacement for an on-disk package graph
///
/// All methods take `&self`; reads share a lock, mutations take it
/// exclusively, so an `Arc<TypeRegistry>` may be shared across threads.
/// The recommended discipline is still one registry per generation request.
#[derive(Debug)]
pub struct TypeRegistry {
    state: RwLock<RegistryState>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// Create a registry seeded with the builtin types
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::seeded()),
        }
    }

    /// Register a package, returning the existing one for a known path
    pub fn register_package(&self, import_path: &str, name: &str) -> Arc<Package> {
        self.state.write().ensure_package(import_path, name)
    }

    pub fn package(&self, import_path: &str) -> Option<Arc<Package>> {
        self.state.read().packages.get(import_path).cloned()
    }

    /// Register a type under an already registered package
    ///
    /// Basic kinds are stored as-is; wrapping them in a named envelope makes
    /// consumers that recurse through named types loop forever. Named types
    /// are stored as-is. Everything else becomes the body of the key's named
    /// node, allocated on first registration.
    pub fn register_type(&self, import_path: &str, name: &str, ty: Type) -> Result<(), CoreError> {
        let mut state = self.state.write();
        if !state.packages.contains_key(import_path) {
            return Err(CoreError::UnknownPackage(import_path.to_string()));
        }

        if matches!(ty, Type::Basic(_) | Type::Named(_)) {
            state
                .objects
                .insert((import_path.to_string(), name.to_string()), ty);
        } else {
            state.bind_named(import_path, name, Some(ty));
        }
        Ok(())
    }

    /// Look up a type; builtins live under the empty import path
    pub fn lookup_type(&self, import_path: &str, name: &str) -> Result<Type, CoreError> {
        self.lookup_object(import_path, name)
            .ok_or_else(|| CoreError::TypeNotFound {
                path: import_path.to_string(),
                name: name.to_string(),
            })
    }

    pub fn lookup_object(&self, import_path: &str, name: &str) -> Option<Type> {
        self.state
            .read()
            .objects
            .get(&(import_path.to_string(), name.to_string()))
            .cloned()
    }

    /// Create a named type, registering its package on first use
    pub fn create_named_type(&self, import_path: &str, name: &str, underlying: Type) -> Type {
        let mut state = self.state.write();
        if !state.packages.contains_key(import_path) {
            let pkg_name = package_name_from_path(import_path);
            debug!("auto-registering package {} as {}", import_path, pkg_name);
            state.ensure_package(import_path, &pkg_name);
        }

        Type::Named(state.bind_named(import_path, name, Some(underlying)))
    }

    /// Declare a named type whose body is filled in later
    ///
    /// The returned reference is usable immediately; until
    /// [`complete_named`](Self::complete_named) runs, the node is a
    /// placeholder with no underlying type.
    pub fn declare_named(&self, import_path: &str, name: &str) -> Result<NamedRef, CoreError> {
        let mut state = self.state.write();
        if !state.packages.contains_key(import_path) {
            return Err(CoreError::UnknownPackage(import_path.to_string()));
        }

        Ok(state.bind_named(import_path, name, None))
    }

    pub fn complete_named(&self, id: TypeId, underlying: Type) -> Result<(), CoreError> {
        let mut state = self.state.write();
        let node = state
            .arena
            .get_mut(id)
            .ok_or(CoreError::UnknownNamedType(id))?;
        node.underlying = Some(underlying);
        Ok(())
    }

    pub fn add_method(&self, id: TypeId, method: Func) -> Result<(), CoreError> {
        let mut state = self.state.write();
        let node = state
            .arena
            .get_mut(id)
            .ok_or(CoreError::UnknownNamedType(id))?;
        node.methods.retain(|m| m.name != method.name);
        node.methods.push(method);
        Ok(())
    }

    pub fn named(&self, id: TypeId) -> Option<NamedType> {
        self.state.read().arena.get(id).cloned()
    }

    pub fn add_name(&self, import_path: &str, name: &str) {
        self.state
            .write()
            .names
            .insert(import_path.to_string(), name.to_string());
    }

    /// Package name for an import path, falling back to its last segment
    pub fn name_of(&self, import_path: &str) -> String {
        let state = self.state.read();
        if let Some(name) = state.names.get(import_path) {
            return name.clone();
        }
        if let Some(pkg) = state.packages.get(import_path) {
            return pkg.name().to_string();
        }
        package_name_from_path(import_path)
    }

    /// Registered import paths, sorted, excluding the builtin package
    pub fn list_packages(&self) -> Vec<String> {
        let state = self.state.read();
        let mut paths: Vec<String> = state
            .packages
            .keys()
            .filter(|path| !path.is_empty())
            .cloned()
            .collect();
        paths.sort();
        paths
    }

    /// Type names registered under a package, sorted
    pub fn types_in(&self, import_path: &str) -> Vec<String> {
        let state = self.state.read();
        let mut names: Vec<String> = state
            .objects
            .keys()
            .filter(|(path, _)| path == import_path)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Register the standard library types generated code always touches
    pub fn register_common_types(&self) {
        self.register_package("context", "context");
        let context = Type::interface(Vec::new());
        if let Err(e) = self.register_type("context", "Context", context) {
            debug!("context.Context not registered: {}", e);
        }

        self.register_package("time", "time");
        if let Err(e) = self.register_type("time", "Time", Type::structure(Vec::new())) {
            debug!("time.Time not registered: {}", e);
        }
    }

    /// Drop every package, type and name mapping, then re-seed builtins
    pub fn clear(&self) {
        *self.state.write() = RegistryState::seeded();
    }
}

/// The package-loading capability the generation engine consumes
///
/// [`TypeRegistry`] is the in-memory implementation; the inspection helpers
/// are provided in terms of `lookup_type` and `named`.
pub trait PackageLoader: Send + Sync {
    fn register_package(&self, import_path: &str, name: &str) -> Arc<Package>;

    fn register_type(&self, import_path: &str, name: &str, ty: Type) -> Result<(), CoreError>;

    fn add_name(&self, import_path: &str, name: &str);

    fn lookup_type(&self, import_path: &str, name: &str) -> Result<Type, CoreError>;

    fn declare_named(&self, import_path: &str, name: &str) -> Result<NamedRef, CoreError>;

    fn complete_named(&self, id: TypeId, underlying: Type) -> Result<(), CoreError>;

    fn add_method(&self, id: TypeId, method: Func) -> Result<(), CoreError>;

    fn named(&self, id: TypeId) -> Option<NamedType>;

    /// Underlying type, following one named indirection
    fn underlying(&self, ty: &Type) -> Type {
        match ty {
            Type::Named(named) => self
                .named(named.id)
                .and_then(|node| node.underlying)
                .unwrap_or(Type::Invalid),
            other => other.clone(),
        }
    }

    /// Struct field lookup through an optional pointer
    fn field(&self, ty: &Type, name: &str) -> Option<Field> {
        match self.underlying(ty.deref()) {
            Type::Struct(s) => s.fields.into_iter().find(|f| f.name == name),
            _ => None,
        }
    }

    /// Method lookup on a named type or interface, through an optional pointer
    fn method(&self, ty: &Type, name: &str) -> Option<Func> {
        let base = ty.deref();
        if let Type::Named(named) = base {
            if let Some(found) = self.named(named.id).and_then(|n| n.method(name).cloned()) {
                return Some(found);
            }
        }
        match self.underlying(base) {
            Type::Interface(iface) => iface.methods.into_iter().find(|m| m.name == name),
            _ => None,
        }
    }
}

impl PackageLoader for TypeRegistry {
    fn register_package(&self, import_path: &str, name: &str) -> Arc<Package> {
        TypeRegistry::register_package(self, import_path, name)
    }

    fn register_type(&self, import_path: &str, name: &str, ty: Type) -> Result<(), CoreError> {
        TypeRegistry::register_type(self, import_path, name, ty)
    }

    fn add_name(&self, import_path: &str, name: &str) {
        TypeRegistry::add_name(self, import_path, name)
    }

    fn lookup_type(&self, import_path: &str, name: &str) -> Result<Type, CoreError> {
        TypeRegistry::lookup_type(self, import_path, name)
    }

    fn declare_named(&self, import_path: &str, name: &str) -> Result<NamedRef, CoreError> {
        TypeRegistry::declare_named(self, import_path, name)
    }

    fn complete_named(&self, id: TypeId, underlying: Type) -> Result<(), CoreError> {
        TypeRegistry::complete_named(self, id, underlying)
    }

    fn add_method(&self, id: TypeId, method: Func) -> Result<(), CoreError> {
        TypeRegistry::add_method(self, id, method)
    }

    fn named(&self, id: TypeId) -> Option<NamedType> {
        TypeRegistry::named(self, id)
    }
}

/// Last segment of an import path
pub fn package_name_from_path(import_path: &str) -> String {
    import_path
        .rsplit('/')
        .next()
        .unwrap_or(import_path)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_register_package_is_idempotent() {
        let registry = TypeRegistry::new();
        let first = registry.register_package("github.com/acme/models", "models");
        let second = registry.register_package("github.com/acme/models", "other");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.name(), "models");
    }

    #[test]
    fn test_register_type_requires_package() {
        let registry = TypeRegistry::new();
        let err = registry
            .register_type("github.com/acme/missing", "User", Type::structure(Vec::new()))
            .unwrap_err();
        assert_eq!(err, CoreError::UnknownPackage("github.com/acme/missing".to_string()));
    }

    #[test]
    fn test_basic_types_are_not_wrapped() {
        let registry = TypeRegistry::new();
        registry.register_package("github.com/acme/scalars", "scalars");
        registry
            .register_type("github.com/acme/scalars", "ID", Type::string())
            .unwrap();

        let found = registry.lookup_type("github.com/acme/scalars", "ID").unwrap();
        assert_eq!(found, Type::string());
    }

    #[test]
    fn test_struct_types_are_wrapped_in_named() {
        let registry = TypeRegistry::new();
        registry.register_package("github.com/acme/models", "models");
        let body = Type::structure(vec![Field::new("Name", Type::string())]);
        registry
            .register_type("github.com/acme/models", "User", body.clone())
            .unwrap();

        let found = registry.lookup_type("github.com/acme/models", "User").unwrap();
        let named = found.as_named().expect("struct should be named");
        assert_eq!(named.name, "User");
        assert_eq!(named.package, "github.com/acme/models");
        assert_eq!(registry.underlying(&found), body);
    }

    #[test]
    fn test_builtins_under_empty_path() {
        let registry = TypeRegistry::new();
        assert_eq!(registry.lookup_type("", "int64").unwrap(), Type::Basic(BasicKind::Int64));
        assert_eq!(registry.lookup_type("", "any").unwrap(), Type::any());
        assert!(registry.lookup_type("", "error").unwrap().is_error());
        assert!(matches!(
            registry.lookup_type("", "Missing"),
            Err(CoreError::TypeNotFound { .. })
        ));
    }

    #[test]
    fn test_create_named_type_auto_registers_package() {
        let registry = TypeRegistry::new();
        let ty = registry.create_named_type("example.com/app/graph/model", "Todo", Type::structure(Vec::new()));

        assert!(ty.as_named().is_some());
        let pkg = registry.package("example.com/app/graph/model").unwrap();
        assert_eq!(pkg.name(), "model");
        assert_eq!(registry.lookup_type("example.com/app/graph/model", "Todo").unwrap(), ty);
    }

    #[test]
    fn test_declare_then_complete() {
        let registry = TypeRegistry::new();
        registry.register_package("github.com/acme/tree", "tree");
        let node = registry.declare_named("github.com/acme/tree", "Node").unwrap();
        assert!(registry.named(node.id).unwrap().is_placeholder());

        let body = Type::structure(vec![Field::new("Next", Type::pointer(Type::Named(node.clone())))]);
        registry.complete_named(node.id, body.clone()).unwrap();

        let completed = registry.named(node.id).unwrap();
        assert!(!completed.is_placeholder());
        assert_eq!(completed.underlying, Some(body));
    }

    #[test]
    fn test_clear_reseeds_builtins() {
        let registry = TypeRegistry::new();
        registry.register_package("github.com/acme/models", "models");
        registry.add_name("github.com/acme/models", "models");
        registry.clear();

        assert!(registry.list_packages().is_empty());
        assert!(registry.lookup_type("", "string").is_ok());
        assert_eq!(registry.name_of("github.com/acme/models"), "models");
    }

    #[test]
    fn test_method_lookup_through_pointer() {
        let registry = TypeRegistry::new();
        registry.register_package("github.com/acme/models", "models");
        let user = registry.declare_named("github.com/acme/models", "User").unwrap();
        registry.complete_named(user.id, Type::structure(Vec::new())).unwrap();
        let method = Func::new(
            "FullName",
            Signature::new(Vec::new(), vec![Var::new("", Type::string())]),
        );
        registry.add_method(user.id, method.clone()).unwrap();

        let ptr = Type::pointer(Type::Named(user));
        assert_eq!(registry.method(&ptr, "FullName"), Some(method));
        assert_eq!(registry.method(&ptr, "Missing"), None);
    }

    #[test]
    fn test_reregistering_reuses_the_node() {
        let registry = TypeRegistry::new();
        registry.register_package("github.com/acme/models", "models");
        let nodes = || registry.state.read().arena.nodes.len();
        let before = nodes();

        registry
            .register_type("github.com/acme/models", "User", Type::structure(Vec::new()))
            .unwrap();
        let first = registry.lookup_type("github.com/acme/models", "User").unwrap();
        let body = Type::structure(vec![Field::new("ID", Type::string())]);
        for _ in 0..3 {
            registry
                .register_type("github.com/acme/models", "User", body.clone())
                .unwrap();
        }
        let again = registry.create_named_type("github.com/acme/models", "User", body.clone());
        let declared = registry.declare_named("github.com/acme/models", "User").unwrap();

        assert_eq!(nodes(), before + 1);
        assert_eq!(again, first);
        assert_eq!(Type::Named(declared.clone()), first);
        assert!(registry.named(declared.id).unwrap().is_placeholder());
    }

    #[test]
    fn test_ids_from_before_clear_are_rejected() {
        let registry = TypeRegistry::new();
        registry.register_package("github.com/acme/models", "models");
        let mut stale = Vec::new();
        for name in ["A", "B", "C"] {
            stale.push(registry.declare_named("github.com/acme/models", name).unwrap());
        }
        registry.clear();

        let last = stale.pop().unwrap();
        assert_eq!(registry.named(last.id), None);
        assert_eq!(
            registry.complete_named(last.id, Type::string()),
            Err(CoreError::UnknownNamedType(last.id))
        );
        assert!(registry.add_method(last.id, Func::new("M", Signature::default())).is_err());
    }
}
