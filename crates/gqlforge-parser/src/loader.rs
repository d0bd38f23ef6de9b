//! Synthesis of registry types from remotely fetched Go packages

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use gqlforge_core::{
    BasicKind, ChanDir, Field, Func, InterfaceType, NamedRef, PackageLoader, Signature, Type, Var,
};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::error::ParserError;
use crate::fetch::SourceFetcher;
use crate::go::{GoSourceExtractor, MethodInfo, PackageTypes, ParamInfo, TypeInfo, TypeKind};

/// A type expression that could not be resolved and was replaced by `string`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DegradedType {
    pub package: String,
    /// Declaration the expression appeared in
    pub declaration: String,
    pub expression: String,
}

/// Loads Go packages through a [`SourceFetcher`] and registers their
/// exported types with a [`PackageLoader`]
pub struct RemotePackageLoader<F: SourceFetcher> {
    fetcher: F,
    extractor: GoSourceExtractor,
    registry: Arc<dyn PackageLoader>,
    git_ref: Option<String>,
    cache: RwLock<HashMap<String, Arc<PackageTypes>>>,
    degraded: Mutex<Vec<DegradedType>>,
}

/// Names declared by the package being registered
struct Scope<'a> {
    pkg: &'a PackageTypes,
    declared: HashMap<String, NamedRef>,
}

impl<F: SourceFetcher> RemotePackageLoader<F> {
    pub fn new(fetcher: F, registry: Arc<dyn PackageLoader>) -> Self {
        Self {
            fetcher,
            extractor: GoSourceExtractor::new(),
            registry,
            git_ref: None,
            cache: RwLock::new(HashMap::new()),
            degraded: Mutex::new(Vec::new()),
        }
    }

    /// Branch, tag or commit to fetch; the default branch otherwise
    pub fn with_ref(mut self, git_ref: impl Into<String>) -> Self {
        let git_ref = git_ref.into();
        self.git_ref = if git_ref.is_empty() { None } else { Some(git_ref) };
        self
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Fetch, parse and register one package, serving repeats from the cache
    #[instrument(skip(self), level = "debug")]
    pub async fn load_package(&self, import_path: &str) -> Result<Arc<PackageTypes>, ParserError> {
        if let Some(pkg) = self.cached(import_path) {
            debug!("package served from cache");
            return Ok(pkg);
        }

        let files = self
            .fetcher
            .fetch_package(import_path, self.git_ref.as_deref())
            .await
            .map_err(|e| e.in_package(import_path))?;
        if files.is_empty() {
            return Err(ParserError::NoSourceFiles(import_path.to_string()));
        }

        let pkg = self
            .extractor
            .extract_package(import_path, &files)
            .map_err(|e| e.in_package(import_path))?;
        self.register_types(&pkg)
            .map_err(|e| e.in_package(import_path))?;

        let pkg = Arc::new(pkg);
        self.cache
            .write()
            .insert(import_path.to_string(), Arc::clone(&pkg));
        info!(types = pkg.len(), "loaded package {}", import_path);
        Ok(pkg)
    }

    /// Load packages in order, stopping at the first failure
    pub async fn load_packages<I, S>(&self, import_paths: I) -> Result<(), ParserError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for path in import_paths {
            self.load_package(path.as_ref()).await?;
        }
        Ok(())
    }

    pub fn cached(&self, import_path: &str) -> Option<Arc<PackageTypes>> {
        self.cache.read().get(import_path).cloned()
    }

    /// Whether a loaded package declares `name`
    pub fn has_type(&self, import_path: &str, name: &str) -> bool {
        self.cache
            .read()
            .get(import_path)
            .map(|pkg| pkg.types.contains_key(name))
            .unwrap_or(false)
    }

    /// Expressions replaced by `string` so far
    pub fn degraded(&self) -> Vec<DegradedType> {
        self.degraded.lock().clone()
    }

    /// Register extracted declarations with the registry
    ///
    /// Every declaration is declared before any body is built, so fields
    /// may refer to types declared later in the package or to their own
    /// type.
    pub fn register_types(&self, pkg: &PackageTypes) -> Result<(), ParserError> {
        let path = pkg.import_path.as_str();
        self.registry.register_package(path, &pkg.name);

        let mut declared = HashMap::with_capacity(pkg.types.len());
        for name in pkg.types.keys() {
            declared.insert(name.clone(), self.registry.declare_named(path, name)?);
        }
        let scope = Scope { pkg, declared };

        for (name, info) in &pkg.types {
            let named = &scope.declared[name];
            match info.kind {
                TypeKind::Struct => {
                    let fields = info
                        .fields
                        .iter()
                        .map(|f| {
                            let field = Field::new(&f.name, self.resolve_or_degrade(&f.ty, name, &scope))
                                .with_tag(&f.tag);
                            if f.embedded {
                                field.embedded()
                            } else {
                                field
                            }
                        })
                        .collect();
                    self.registry.complete_named(named.id, Type::structure(fields))?;
                    self.add_methods(named, info, &scope)?;
                }
                TypeKind::Interface => {
                    let methods = info
                        .methods
                        .iter()
                        .map(|m| self.func(m, name, None, &scope))
                        .collect();
                    let iface = InterfaceType {
                        methods,
                        complete: false,
                    };
                    self.registry
                        .complete_named(named.id, Type::Interface(iface.completed()))?;
                }
                TypeKind::Alias | TypeKind::Basic => {}
            }
        }

        // defined types take the body of their target, so structs and
        // interfaces must be complete first
        for (name, info) in &pkg.types {
            if matches!(info.kind, TypeKind::Alias | TypeKind::Basic) {
                let named = &scope.declared[name];
                let underlying = self.alias_underlying(info, &scope);
                self.registry.complete_named(named.id, underlying)?;
                self.add_methods(named, info, &scope)?;
            }
        }

        self.registry.add_name(path, &pkg.name);
        Ok(())
    }

    fn add_methods(&self, named: &NamedRef, info: &TypeInfo, scope: &Scope<'_>) -> Result<(), ParserError> {
        let receiver = Var::new("", Type::pointer(Type::Named(named.clone())));
        for method in &info.methods {
            let func = self.func(method, &info.name, Some(receiver.clone()), scope);
            self.registry.add_method(named.id, func)?;
        }
        Ok(())
    }

    fn func(&self, method: &MethodInfo, decl: &str, recv: Option<Var>, scope: &Scope<'_>) -> Func {
        let vars = |params: &[ParamInfo]| -> Vec<Var> {
            params
                .iter()
                .map(|p| Var::new(&p.name, self.resolve_or_degrade(&p.ty, decl, scope)))
                .collect()
        };
        let mut signature = Signature::new(vars(&method.params), vars(&method.results));
        signature.variadic = method
            .params
            .last()
            .map(|p| p.ty.starts_with("..."))
            .unwrap_or(false);
        if let Some(recv) = recv {
            signature = signature.with_receiver(recv);
        }
        Func::new(&method.name, signature).with_context(method.has_context)
    }

    /// Underlying type of a defined or aliased type
    ///
    /// Chains of same-package definitions are followed to their final
    /// expression; a named type never becomes its own underlying. A
    /// definition over a same-package struct or interface shares its body,
    /// not its methods.
    fn alias_underlying(&self, info: &TypeInfo, scope: &Scope<'_>) -> Type {
        let mut visited = HashSet::new();
        let mut current = info;
        loop {
            if !visited.insert(current.name.as_str()) {
                return self.degrade(&info.name, &info.underlying, scope);
            }
            match scope.pkg.get(&current.underlying) {
                Some(target) if matches!(target.kind, TypeKind::Alias | TypeKind::Basic) => {
                    current = target;
                }
                Some(_) => {
                    let target = self.resolve_or_degrade(&current.underlying, &info.name, scope);
                    return self.registry.underlying(&target);
                }
                None => return self.resolve_or_degrade(&current.underlying, &info.name, scope),
            }
        }
    }

    fn resolve_or_degrade(&self, expr: &str, decl: &str, scope: &Scope<'_>) -> Type {
        match self.resolve(expr, scope) {
            Some(ty) => ty,
            None => self.degrade(decl, expr, scope),
        }
    }

    fn degrade(&self, decl: &str, expr: &str, scope: &Scope<'_>) -> Type {
        warn!(
            package = %scope.pkg.import_path,
            declaration = decl,
            expression = expr,
            "unresolved type, falling back to string"
        );
        self.degraded.lock().push(DegradedType {
            package: scope.pkg.import_path.clone(),
            declaration: decl.to_string(),
            expression: expr.to_string(),
        });
        Type::string()
    }

    fn resolve(&self, expr: &str, scope: &Scope<'_>) -> Option<Type> {
        if let Some(elem) = expr.strip_prefix('*') {
            return self.resolve(elem, scope).map(Type::pointer);
        }
        if let Some(elem) = expr.strip_prefix("[]") {
            return self.resolve(elem, scope).map(Type::slice);
        }
        if let Some(elem) = expr.strip_prefix("...") {
            return self.resolve(elem, scope).map(Type::slice);
        }
        if let Some((key, value)) = split_map(expr) {
            let key = self.resolve(key, scope)?;
            return self.resolve(value, scope).map(|v| Type::map(key, v));
        }
        if let Some(elem) = expr.strip_prefix("chan ") {
            return self.resolve(elem, scope).map(|e| Type::chan(ChanDir::Both, e));
        }
        if let Some((len, elem)) = split_array(expr) {
            return self.resolve(elem, scope).map(|e| Type::array(len, e));
        }

        if let Some(named) = scope.declared.get(expr) {
            return Some(Type::Named(named.clone()));
        }

        if let Some(kind) = BasicKind::from_name(expr) {
            return Some(Type::Basic(kind));
        }
        match expr {
            "error" => self.registry.lookup_type("", "error").ok(),
            "any" | "interface{}" | "context.Context" | "Context" => Some(Type::any()),
            "time.Time" | "Time" | "json.RawMessage" | "uuid.UUID" => Some(Type::string()),
            _ => None,
        }
    }
}

/// `map[K]V` into `K` and `V`, honouring nested brackets in the key
fn split_map(expr: &str) -> Option<(&str, &str)> {
    let rest = expr.strip_prefix("map[")?;
    let mut depth = 0usize;
    for (i, c) in rest.char_indices() {
        match c {
            '[' => depth += 1,
            ']' if depth == 0 => return Some((&rest[..i], &rest[i + 1..])),
            ']' => depth -= 1,
            _ => {}
        }
    }
    None
}

fn split_array(expr: &str) -> Option<(u64, &str)> {
    let rest = expr.strip_prefix('[')?;
    let end = rest.find(']')?;
    let len = rest[..end].parse().ok()?;
    Some((len, &rest[end + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FileContent;
    use async_trait::async_trait;
    use gqlforge_core::TypeRegistry;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticFetcher {
        packages: HashMap<String, Vec<FileContent>>,
        calls: AtomicUsize,
    }

    impl StaticFetcher {
        fn new(packages: &[(&str, &[(&str, &str)])]) -> Self {
            Self {
                packages: packages
                    .iter()
                    .map(|(path, files)| {
                        let files = files
                            .iter()
                            .map(|(name, content)| FileContent {
                                path: name.to_string(),
                                content: content.to_string(),
                            })
                            .collect();
                        (path.to_string(), files)
                    })
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SourceFetcher for StaticFetcher {
        async fn fetch_package(
            &self,
            import_path: &str,
            _git_ref: Option<&str>,
        ) -> Result<Vec<FileContent>, ParserError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.packages
                .get(import_path)
                .cloned()
                .ok_or_else(|| ParserError::PackageNotFound(import_path.to_string()))
        }
    }

    const MODELS: &str = "github.com/acme/api/models";

    fn loader(files: &[(&str, &str)]) -> (Arc<TypeRegistry>, RemotePackageLoader<StaticFetcher>) {
        let registry = Arc::new(TypeRegistry::new());
        let fetcher = StaticFetcher::new(&[(MODELS, files)]);
        let loader = RemotePackageLoader::new(fetcher, registry.clone() as Arc<dyn PackageLoader>);
        (registry, loader)
    }

    #[test]
    fn test_split_map_nested_key() {
        assert_eq!(split_map("map[string]int"), Some(("string", "int")));
        assert_eq!(split_map("map[[2]int][]string"), Some(("[2]int", "[]string")));
        assert_eq!(split_map("[]int"), None);
        assert_eq!(split_array("[4]byte"), Some((4, "byte")));
        assert_eq!(split_array("[N]byte"), None);
    }

    #[tokio::test]
    async fn test_self_referential_struct() {
        let (registry, loader) = loader(&[(
            "node.go",
            "package models\n\ntype Node struct {\n\tValue string\n\tNext *Node\n\tChildren []*Node\n}\n",
        )]);
        loader.load_package(MODELS).await.unwrap();

        let node = registry.lookup_type(MODELS, "Node").unwrap();
        let named = node.as_named().cloned().unwrap();
        let next = registry.field(&node, "Next").unwrap();
        assert_eq!(next.ty, Type::pointer(Type::Named(named.clone())));
        let children = registry.field(&node, "Children").unwrap();
        assert_eq!(children.ty, Type::slice(Type::pointer(Type::Named(named))));
        assert!(loader.degraded().is_empty());
    }

    #[tokio::test]
    async fn test_forward_reference_and_methods() {
        let (registry, loader) = loader(&[(
            "user.go",
            "package models\n\nimport \"context\"\n\ntype User struct {\n\tID string `json:\"id\"`\n\tProfile Profile\n}\n\nfunc (u *User) Friends(ctx context.Context, first int) ([]*User, error) { return nil, nil }\n\ntype Profile struct {\n\tBio string\n}\n",
        )]);
        loader.load_package(MODELS).await.unwrap();

        let user = registry.lookup_type(MODELS, "User").unwrap();
        let profile = registry.field(&user, "Profile").unwrap();
        assert_eq!(profile.ty, registry.lookup_type(MODELS, "Profile").unwrap());
        assert_eq!(registry.field(&user, "ID").unwrap().tag_value("json"), Some("id"));

        let friends = registry.method(&Type::pointer(user.clone()), "Friends").unwrap();
        assert!(friends.has_context);
        assert!(friends.returns_error());
        assert_eq!(friends.signature.params.len(), 2);
        assert_eq!(
            friends.signature.recv.as_ref().map(|r| r.ty.clone()),
            Some(Type::pointer(user))
        );
    }

    #[tokio::test]
    async fn test_interfaces_and_aliases() {
        let (registry, loader) = loader(&[(
            "types.go",
            "package models\n\ntype Status string\n\ntype Code = Status\n\ntype Stamp time.Time\n\ntype Store interface {\n\tGet(id string) (*Status, error)\n}\n",
        )]);
        loader.load_package(MODELS).await.unwrap();

        let status = registry.lookup_type(MODELS, "Status").unwrap();
        assert_eq!(registry.underlying(&status), Type::string());
        let code = registry.lookup_type(MODELS, "Code").unwrap();
        assert_eq!(registry.underlying(&code), Type::string());
        let stamp = registry.lookup_type(MODELS, "Stamp").unwrap();
        assert_eq!(registry.underlying(&stamp), Type::string());

        let store = registry.lookup_type(MODELS, "Store").unwrap();
        match registry.underlying(&store) {
            Type::Interface(iface) => {
                assert!(iface.complete);
                assert_eq!(iface.methods.len(), 1);
                assert!(iface.methods[0].signature.recv.is_none());
            }
            other => panic!("expected interface, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_defined_type_over_struct_keeps_fields() {
        let (registry, loader) = loader(&[
            (
                "admin.go",
                "package models\n\ntype Admin User\n\ntype Root Admin\n\nfunc (a *Admin) Promote() error { return nil }\n",
            ),
            (
                "user.go",
                "package models\n\ntype User struct {\n\tID string `json:\"id\"`\n}\n\nfunc (u *User) Name() string { return \"\" }\n",
            ),
        ]);
        loader.load_package(MODELS).await.unwrap();

        let user = registry.lookup_type(MODELS, "User").unwrap();
        let admin = registry.lookup_type(MODELS, "Admin").unwrap();
        assert_eq!(registry.underlying(&admin), registry.underlying(&user));
        assert_eq!(registry.field(&admin, "ID").unwrap().tag_value("json"), Some("id"));

        let root = registry.lookup_type(MODELS, "Root").unwrap();
        assert!(registry.field(&root, "ID").is_some());

        let admin_ptr = Type::pointer(admin);
        assert!(registry.method(&admin_ptr, "Promote").is_some());
        assert!(registry.method(&admin_ptr, "Name").is_none());
        assert!(loader.degraded().is_empty());
    }

    #[tokio::test]
    async fn test_unresolvable_types_degrade_to_string() {
        let (registry, loader) = loader(&[(
            "ext.go",
            "package models\n\ntype Wrapper struct {\n\tDecimal decimal.Decimal\n\tCount int64\n}\n",
        )]);
        loader.load_package(MODELS).await.unwrap();

        let wrapper = registry.lookup_type(MODELS, "Wrapper").unwrap();
        assert_eq!(registry.field(&wrapper, "Decimal").unwrap().ty, Type::string());
        assert_eq!(
            registry.field(&wrapper, "Count").unwrap().ty,
            Type::Basic(BasicKind::Int64)
        );
        assert_eq!(
            loader.degraded(),
            vec![DegradedType {
                package: MODELS.to_string(),
                declaration: "Wrapper".to_string(),
                expression: "decimal.Decimal".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_empty_package_is_an_error() {
        let (registry, loader) = loader(&[]);
        let err = loader.load_package(MODELS).await.unwrap_err();
        assert!(matches!(err, ParserError::NoSourceFiles(_)));
        assert!(registry.list_packages().is_empty());
    }

    #[tokio::test]
    async fn test_parse_failure_registers_nothing() {
        let (registry, loader) = loader(&[("bad.go", "package models\n\ntype Broken struct {\n")]);
        let err = loader.load_package(MODELS).await.unwrap_err();
        assert!(matches!(err.root(), ParserError::SourceParseFailed { .. }));
        assert!(registry.list_packages().is_empty());
        assert!(loader.cached(MODELS).is_none());
    }
}
