use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassNetCacheError {
    /// The schema provider does not know the class
    #[error("Class `{class}` has no schema")]
    UnknownClass { class: String },

    /// A class is its own ancestor
    #[error("Class `{class}` inherits from itself")]
    InheritanceCycle { class: String },
}
