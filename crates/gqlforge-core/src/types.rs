//! Go type model for the virtual package environment
//!
//! Composite types are plain values. Named types are stored in the
//! registry's arena and referenced here through [`NamedRef`], which carries
//! the node index together with the package path and type name so a
//! reference can be rendered without consulting the arena.

use std::fmt;

use la_arena::Idx;
use serde::{Deserialize, Serialize};

use crate::registry::NamedType;

/// Builtin primitive kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BasicKind {
    Bool,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Uintptr,
    Float32,
    Float64,
    Complex64,
    Complex128,
    String,
    Byte,
    Rune,
}

impl BasicKind {
    pub const ALL: [BasicKind; 19] = [
        BasicKind::Bool,
        BasicKind::Int,
        BasicKind::Int8,
        BasicKind::Int16,
        BasicKind::Int32,
        BasicKind::Int64,
        BasicKind::Uint,
        BasicKind::Uint8,
        BasicKind::Uint16,
        BasicKind::Uint32,
        BasicKind::Uint64,
        BasicKind::Uintptr,
        BasicKind::Float32,
        BasicKind::Float64,
        BasicKind::Complex64,
        BasicKind::Complex128,
        BasicKind::String,
        BasicKind::Byte,
        BasicKind::Rune,
    ];

    /// The Go spelling of this kind
    pub fn name(self) -> &'static str {
        match self {
            BasicKind::Bool => "bool",
            BasicKind::Int => "int",
            BasicKind::Int8 => "int8",
            BasicKind::Int16 => "int16",
            BasicKind::Int32 => "int32",
            BasicKind::Int64 => "int64",
            BasicKind::Uint => "uint",
            BasicKind::Uint8 => "uint8",
            BasicKind::Uint16 => "uint16",
            BasicKind::Uint32 => "uint32",
            BasicKind::Uint64 => "uint64",
            BasicKind::Uintptr => "uintptr",
            BasicKind::Float32 => "float32",
            BasicKind::Float64 => "float64",
            BasicKind::Complex64 => "complex64",
            BasicKind::Complex128 => "complex128",
            BasicKind::String => "string",
            BasicKind::Byte => "byte",
            BasicKind::Rune => "rune",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.name() == name)
    }

    pub fn is_numeric(self) -> bool {
        !matches!(self, BasicKind::Bool | BasicKind::String)
    }
}

/// Index of a named type node in a registry arena
pub type TypeId = Idx<NamedType>;

/// Reference to a named type: arena index plus its identity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamedRef {
    pub id: TypeId,
    pub package: String,
    pub name: String,
}

impl NamedRef {
    /// `true` for names declared in the builtin (empty path) package
    pub fn is_builtin(&self) -> bool {
        self.package.is_empty()
    }

    pub fn is(&self, package: &str, name: &str) -> bool {
        self.package == package && self.name == name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChanDir {
    Both,
    Send,
    Recv,
}

/// A parameter, result or receiver
#[derive(Debug, Clone, PartialEq)]
pub struct Var {
    pub name: String,
    pub ty: Type,
}

impl Var {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A struct field
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: Type,
    /// Raw tag text without the surrounding quotes
    pub tag: String,
    pub embedded: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            tag: String::new(),
            embedded: false,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn embedded(mut self) -> Self {
        self.embedded = true;
        self
    }

    /// Value of a key in a conventional `key:"value"` tag
    pub fn tag_value(&self, key: &str) -> Option<&str> {
        let needle = format!("{}:\"", key);
        let start = self.tag.find(&needle)? + needle.len();
        let rest = &self.tag[start..];
        rest.find('"').map(|end| &rest[..end])
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Signature {
    pub recv: Option<Box<Var>>,
    pub params: Vec<Var>,
    pub results: Vec<Var>,
    pub variadic: bool,
}

impl Signature {
    pub fn new(params: Vec<Var>, results: Vec<Var>) -> Self {
        Self {
            recv: None,
            params,
            results,
            variadic: false,
        }
    }

    pub fn with_receiver(mut self, recv: Var) -> Self {
        self.recv = Some(Box::new(recv));
        self
    }
}

/// A method or function
#[derive(Debug, Clone, PartialEq)]
pub struct Func {
    pub name: String,
    pub signature: Signature,
    /// First parameter carries a cancellation/deadline context
    pub has_context: bool,
}

impl Func {
    /// Build a function, deriving `has_context` from the first parameter type
    pub fn new(name: impl Into<String>, signature: Signature) -> Self {
        let has_context = signature
            .params
            .first()
            .map(|p| p.ty.is_context())
            .unwrap_or(false);
        Self {
            name: name.into(),
            signature,
            has_context,
        }
    }

    pub fn with_context(mut self, has_context: bool) -> Self {
        self.has_context = has_context;
        self
    }

    /// `true` when the last result is the builtin `error`
    pub fn returns_error(&self) -> bool {
        self.signature
            .results
            .last()
            .map(|r| r.ty.is_error())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StructType {
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct InterfaceType {
    pub methods: Vec<Func>,
    pub complete: bool,
}

impl InterfaceType {
    pub fn completed(mut self) -> Self {
        self.complete = true;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Basic(BasicKind),
    Named(NamedRef),
    Pointer(Box<Type>),
    Slice(Box<Type>),
    Array(u64, Box<Type>),
    Map(Box<Type>, Box<Type>),
    Chan(ChanDir, Box<Type>),
    Struct(StructType),
    Interface(InterfaceType),
    Signature(Box<Signature>),
    Invalid,
}

impl Type {
    pub fn basic(kind: BasicKind) -> Self {
        Type::Basic(kind)
    }

    pub fn string() -> Self {
        Type::Basic(BasicKind::String)
    }

    /// The empty interface
    pub fn any() -> Self {
        Type::Interface(InterfaceType::default().completed())
    }

    pub fn pointer(elem: Type) -> Self {
        Type::Pointer(Box::new(elem))
    }

    pub fn slice(elem: Type) -> Self {
        Type::Slice(Box::new(elem))
    }

    pub fn array(len: u64, elem: Type) -> Self {
        Type::Array(len, Box::new(elem))
    }

    pub fn map(key: Type, value: Type) -> Self {
        Type::Map(Box::new(key), Box::new(value))
    }

    pub fn chan(dir: ChanDir, elem: Type) -> Self {
        Type::Chan(dir, Box::new(elem))
    }

    pub fn structure(fields: Vec<Field>) -> Self {
        Type::Struct(StructType { fields })
    }

    /// An interface built from `methods`; not marked complete
    pub fn interface(methods: Vec<Func>) -> Self {
        Type::Interface(InterfaceType {
            methods,
            complete: false,
        })
    }

    pub fn signature(signature: Signature) -> Self {
        Type::Signature(Box::new(signature))
    }

    pub fn as_named(&self) -> Option<&NamedRef> {
        match self {
            Type::Named(named) => Some(named),
            _ => None,
        }
    }

    pub fn is_basic(&self) -> bool {
        matches!(self, Type::Basic(_))
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer(_))
    }

    pub fn is_context(&self) -> bool {
        matches!(self, Type::Named(n) if n.is("context", "Context"))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Type::Named(n) if n.is("", "error"))
    }

    /// Strip one level of pointer indirection
    pub fn deref(&self) -> &Type {
        match self {
            Type::Pointer(elem) => elem,
            other => other,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Basic(kind) => write!(f, "{}", kind.name()),
            Type::Named(named) if named.is_builtin() => write!(f, "{}", named.name),
            Type::Named(named) => write!(f, "{}.{}", named.package, named.name),
            Type::Pointer(elem) => write!(f, "*{}", elem),
            Type::Slice(elem) => write!(f, "[]{}", elem),
            Type::Array(len, elem) => write!(f, "[{}]{}", len, elem),
            Type::Map(key, value) => write!(f, "map[{}]{}", key, value),
            Type::Chan(ChanDir::Both, elem) => write!(f, "chan {}", elem),
            Type::Chan(ChanDir::Send, elem) => write!(f, "chan<- {}", elem),
            Type::Chan(ChanDir::Recv, elem) => write!(f, "<-chan {}", elem),
            Type::Struct(s) if s.fields.is_empty() => write!(f, "struct{{}}"),
            Type::Struct(_) => write!(f, "struct{{...}}"),
            Type::Interface(i) if i.is_empty() => write!(f, "interface{{}}"),
            Type::Interface(_) => write!(f, "interface{{...}}"),
            Type::Signature(_) => write!(f, "func(...)"),
            Type::Invalid => write!(f, "invalid type"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use la_arena::RawIdx;

    #[test]
    fn basic_kind_names_round_trip() {
        for kind in BasicKind::ALL {
            assert_eq!(BasicKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(BasicKind::from_name("String"), None);
    }

    #[test]
    fn tag_value_extracts_keys() {
        let field = Field::new("Name", Type::string()).with_tag(r#"json:"name,omitempty" db:"name""#);
        assert_eq!(field.tag_value("json"), Some("name,omitempty"));
        assert_eq!(field.tag_value("db"), Some("name"));
        assert_eq!(field.tag_value("yaml"), None);
    }

    #[test]
    fn display_uses_full_paths() {
        let named = Type::Named(NamedRef {
            id: TypeId::from_raw(RawIdx::from(3u32)),
            package: "github.com/acme/models".to_string(),
            name: "User".to_string(),
        });
        assert_eq!(Type::slice(Type::pointer(named)).to_string(), "[]*github.com/acme/models.User");
        assert_eq!(Type::map(Type::string(), Type::any()).to_string(), "map[string]interface{}");
    }
}
