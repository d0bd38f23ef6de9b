//! Remote Go package ingestion for gqlforge
//!
//! Go sources are fetched from a hosted repository API ([`fetch`]),
//! reduced to declarations by a shallow parser ([`go`]), and synthesized
//! into the virtual type registry ([`loader`]).

pub mod error;
pub mod fetch;
pub mod go;
pub mod go_lexer;
pub mod loader;

pub use error::ParserError;
pub use fetch::{FileContent, GitHubFetcher, RateLimit, RepoInfo, SourceFetcher};
pub use go::{FieldInfo, GoSourceExtractor, MethodInfo, PackageTypes, ParamInfo, TypeInfo, TypeKind};
pub use loader::{DegradedType, RemotePackageLoader};
