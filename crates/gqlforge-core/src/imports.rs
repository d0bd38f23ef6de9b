//! Import alias tracking for generated Go files
//!
//! One [`ImportAliasManager`] lives for the rendering of one file. It hands
//! out collision-free aliases per import path and renders qualified type
//! names, reserving an alias the first time a package is referenced.
//!
//! ```
//! use gqlforge_core::ImportAliasManager;
//!
//! let imports = ImportAliasManager::new();
//! assert_eq!(imports.reserve("github.com/acme/models", None), "models");
//! assert_eq!(imports.reserve("example.com/other/models", None), "models1");
//! ```

use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;

use crate::naming::is_go_keyword;
use crate::types::{ChanDir, Type};

#[derive(Debug, Clone, Default)]
struct ImportState {
    /// import path -> alias
    reserved: HashMap<String, String>,
    /// alias -> import path
    aliases: HashMap<String, String>,
    counter: usize,
    /// Package the file being rendered belongs to
    local: Option<String>,
}

#[derive(Debug, Default)]
pub struct ImportAliasManager {
    state: RwLock<ImportState>,
}

impl Clone for ImportAliasManager {
    fn clone(&self) -> Self {
        Self {
            state: RwLock::new(self.state.read().clone()),
        }
    }
}

impl ImportAliasManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager for a file of package `import_path`; its own types render unqualified
    pub fn for_package(import_path: &str) -> Self {
        let manager = Self::default();
        manager.state.write().local = Some(import_path.to_string());
        manager
    }

    pub fn local_package(&self) -> Option<String> {
        self.state.read().local.clone()
    }

    /// Reserve an import path, returning its alias
    ///
    /// A path that is already reserved keeps its alias. Otherwise the
    /// preferred alias, or one derived from the path, is made unique by
    /// appending a counter.
    pub fn reserve(&self, import_path: &str, preferred: Option<&str>) -> String {
        let mut state = self.state.write();
        if let Some(alias) = state.reserved.get(import_path) {
            return alias.clone();
        }

        let base = match preferred {
            Some(alias) if !alias.is_empty() => alias.to_string(),
            _ => default_alias(import_path),
        };

        let mut alias = base.clone();
        while state.aliases.contains_key(&alias) {
            state.counter += 1;
            alias = format!("{}{}", base, state.counter);
        }

        state
            .reserved
            .insert(import_path.to_string(), alias.clone());
        state
            .aliases
            .insert(alias.clone(), import_path.to_string());
        alias
    }

    pub fn lookup(&self, import_path: &str) -> Option<String> {
        self.state.read().reserved.get(import_path).cloned()
    }

    pub fn contains(&self, import_path: &str) -> bool {
        self.state.read().reserved.contains_key(import_path)
    }

    pub fn len(&self) -> usize {
        self.state.read().reserved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of import path -> alias
    pub fn imports(&self) -> HashMap<String, String> {
        self.state.read().reserved.clone()
    }

    /// Drop every reservation, keeping the local package
    pub fn clear(&self) {
        let mut state = self.state.write();
        let local = state.local.take();
        *state = ImportState {
            local,
            ..ImportState::default()
        };
    }

    /// Render a type with package qualifiers, reserving imports as needed
    pub fn format_type(&self, ty: &Type) -> String {
        match ty {
            Type::Named(named) if named.is_builtin() => named.name.clone(),
            Type::Named(named) if self.is_local(&named.package) => named.name.clone(),
            Type::Named(named) => {
                let alias = match self.lookup(&named.package) {
                    Some(alias) => alias,
                    None => self.reserve(&named.package, None),
                };
                format!("{}.{}", alias, named.name)
            }
            Type::Pointer(elem) => format!("*{}", self.format_type(elem)),
            Type::Slice(elem) => format!("[]{}", self.format_type(elem)),
            Type::Array(len, elem) => format!("[{}]{}", len, self.format_type(elem)),
            Type::Map(key, value) => format!(
                "map[{}]{}",
                self.format_type(key),
                self.format_type(value)
            ),
            Type::Chan(ChanDir::Both, elem) => format!("chan {}", self.format_type(elem)),
            Type::Chan(ChanDir::Send, elem) => format!("chan<- {}", self.format_type(elem)),
            Type::Chan(ChanDir::Recv, elem) => format!("<-chan {}", self.format_type(elem)),
            Type::Basic(kind) => kind.name().to_string(),
            Type::Interface(iface) if iface.is_empty() => "interface{}".to_string(),
            Type::Interface(_) => "interface{...}".to_string(),
            Type::Struct(_) => "struct{...}".to_string(),
            Type::Signature(_) => "func(...)".to_string(),
            Type::Invalid => "invalid type".to_string(),
        }
    }
}

impl ImportAliasManager {
    fn is_local(&self, import_path: &str) -> bool {
        self.state.read().local.as_deref() == Some(import_path)
    }
}

impl fmt::Display for ImportAliasManager {
    /// One tab-indented import line per reservation, sorted by path
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        let mut imports: Vec<(&String, &String)> = state.reserved.iter().collect();
        imports.sort();

        for (path, alias) in imports {
            let natural = path.rsplit('/').next().unwrap_or(path);
            if alias == natural {
                writeln!(f, "\t\"{}\"", path)?;
            } else {
                writeln!(f, "\t{} \"{}\"", alias, path)?;
            }
        }
        Ok(())
    }
}

/// Alias derived from the final path segment
///
/// Decorative `-go`/`.go` suffixes are dropped and a bare `vN` segment
/// defers to its parent, so `github.com/vektah/gqlparser/v2` becomes
/// `gqlparser`. A segment that is a Go keyword gets a `pkg` suffix.
fn default_alias(import_path: &str) -> String {
    let parts: Vec<&str> = import_path.split('/').collect();
    let mut alias = parts.last().copied().unwrap_or(import_path);
    alias = alias.strip_suffix("-go").unwrap_or(alias);
    alias = alias.strip_suffix(".go").unwrap_or(alias);

    if is_version_segment(alias) && parts.len() > 1 {
        alias = parts[parts.len() - 2];
    }

    let mut ident = sanitize_identifier(alias);
    if is_go_keyword(&ident) {
        ident.push_str("pkg");
    }
    ident
}

fn is_version_segment(segment: &str) -> bool {
    segment.len() > 1
        && segment.starts_with('v')
        && segment[1..].chars().all(|c| c.is_ascii_digit())
}

fn sanitize_identifier(raw: &str) -> String {
    let mut ident: String = raw
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if ident.is_empty() || ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    ident
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BasicKind, NamedRef, TypeId};
    use la_arena::RawIdx;
    use pretty_assertions::assert_eq;

    fn named(package: &str, name: &str) -> Type {
        Type::Named(NamedRef {
            id: TypeId::from_raw(RawIdx::from(0u32)),
            package: package.to_string(),
            name: name.to_string(),
        })
    }

    #[test]
    fn test_default_alias() {
        let cases = vec![
            ("context", "context"),
            ("github.com/99designs/gqlgen/graphql", "graphql"),
            ("github.com/vektah/gqlparser/v2", "gqlparser"),
            ("github.com/google/go-github", "go_github"),
            ("github.com/acme/client-go", "client"),
            ("github.com/acme/v2beta", "v2beta"),
            ("gopkg.in/yaml.v3", "yaml_v3"),
            ("github.com/acme/api/type", "typepkg"),
            ("github.com/acme/func/v2", "funcpkg"),
            ("github.com/acme/types", "types"),
        ];

        for (path, expected) in cases {
            assert_eq!(default_alias(path), expected, "alias for {}", path);
        }
    }

    #[test]
    fn test_reserve_is_idempotent() {
        let imports = ImportAliasManager::new();
        let first = imports.reserve("github.com/acme/models", None);
        let second = imports.reserve("github.com/acme/models", Some("other"));
        assert_eq!(first, second);
        assert_eq!(imports.len(), 1);
    }

    #[test]
    fn test_reserve_preferred_alias_collides() {
        let imports = ImportAliasManager::new();
        assert_eq!(imports.reserve("github.com/acme/graph/model", Some("gm")), "gm");
        assert_eq!(imports.reserve("github.com/acme/gm", None), "gm1");
    }

    #[test]
    fn test_format_type_reserves_packages() {
        let imports = ImportAliasManager::new();
        let ty = Type::map(
            Type::string(),
            Type::slice(Type::pointer(named("github.com/acme/models", "User"))),
        );
        assert_eq!(imports.format_type(&ty), "map[string][]*models.User");
        assert!(imports.contains("github.com/acme/models"));

        assert_eq!(imports.format_type(&named("", "error")), "error");
        assert_eq!(imports.format_type(&Type::Basic(BasicKind::Rune)), "rune");
        assert_eq!(imports.format_type(&Type::chan(ChanDir::Recv, Type::any())), "<-chan interface{}");
        assert_eq!(imports.len(), 1);
    }

    #[test]
    fn test_display_sorted_and_omits_natural_alias() {
        let imports = ImportAliasManager::new();
        imports.reserve("strconv", None);
        imports.reserve("github.com/vektah/gqlparser/v2/ast", None);
        imports.reserve("github.com/vektah/gqlparser/v2", None);
        imports.reserve("context", None);

        let expected = "\t\"context\"\n\
                        \tgqlparser \"github.com/vektah/gqlparser/v2\"\n\
                        \t\"github.com/vektah/gqlparser/v2/ast\"\n\
                        \t\"strconv\"\n";
        assert_eq!(imports.to_string(), expected);
    }

    #[test]
    fn test_local_package_renders_unqualified() {
        let imports = ImportAliasManager::for_package("example.com/app/generated");
        let local = named("example.com/app/generated", "User");
        let remote = named("example.com/app/models", "Role");
        assert_eq!(imports.format_type(&Type::pointer(local)), "*User");
        assert_eq!(imports.format_type(&remote), "models.Role");
        assert_eq!(imports.len(), 1);

        imports.clear();
        assert_eq!(imports.local_package().as_deref(), Some("example.com/app/generated"));
    }

    #[test]
    fn test_clone_is_independent() {
        let imports = ImportAliasManager::new();
        imports.reserve("fmt", None);
        let copy = imports.clone();
        copy.reserve("io", None);
        assert_eq!(imports.len(), 1);
        assert_eq!(copy.len(), 2);
    }
}
