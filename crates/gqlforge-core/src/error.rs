use thiserror::Error;

use crate::types::TypeId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("package {0} not registered")]
    UnknownPackage(String),

    #[error("type {path}.{name} not found")]
    TypeNotFound { path: String, name: String },

    #[error("named type #{} is not part of this registry", u32::from(.0.into_raw()))]
    UnknownNamedType(TypeId),
}

#[cfg(test)]
mod tests {
    use super::*;
    use la_arena::RawIdx;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_messages_name_the_missing_item() {
        let id = TypeId::from_raw(RawIdx::from(7u32));
        assert_eq!(
            CoreError::UnknownNamedType(id).to_string(),
            "named type #7 is not part of this registry"
        );
        assert_eq!(
            CoreError::TypeNotFound {
                path: "github.com/acme/models".to_string(),
                name: "User".to_string(),
            }
            .to_string(),
            "type github.com/acme/models.User not found"
        );
    }
}
