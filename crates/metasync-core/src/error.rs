//! Errors raised while validating or loading the declared model

/// Model-level error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("Invalid SQL identifier '{0}': only letters, digits and underscores are allowed")]
    InvalidIdentifier(String),

    #[error("Entity '{0}' is not declared in the model")]
    UnknownEntity(String),

    #[error("Field '{entity}.{field}' references unknown target entity '{target}'")]
    UnknownTargetEntity {
        entity: String,
        field: String,
        target: String,
    },

    #[error("Field '{entity}.{field}' is a relationship without a target entity")]
    MissingTargetEntity { entity: String, field: String },

    #[error("Failed to load model: {0}")]
    LoadError(String),
}
