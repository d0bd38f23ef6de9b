//! Core type environment for gqlforge
//!
//! The code generator expects an on-disk Go package graph. This crate
//! reproduces the parts it relies on entirely in memory: a registry of
//! packages and named types, a type model with arena-backed named nodes,
//! and an import alias manager for rendering qualified type names.

pub mod error;
pub mod imports;
pub mod naming;
pub mod registry;
pub mod types;

pub use error::CoreError;
pub use imports::ImportAliasManager;
pub use registry::{NamedType, Package, PackageLoader, TypeRegistry};
pub use types::{BasicKind, ChanDir, Field, Func, InterfaceType, NamedRef, Signature, StructType, Type, TypeId, Var};
