//! ModelClient: typed CRUD over stored documents.

mod crud;
mod mapping;
mod validation;

pub use crud::ModelClient;
pub use mapping::{from_data, to_data};
pub use validation::DataValidator;

use std::fmt;

/// What a write did to the stored object.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum OperationResult {
    #[default]
    None,
    Created,
    Updated,
    /// The stored object already matched; nothing was written.
    Unchanged,
}

impl fmt::Display for OperationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OperationResult::None => "none",
            OperationResult::Created => "created",
            OperationResult::Updated => "updated",
            OperationResult::Unchanged => "unchanged",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// Nothing was stored under the name.
    Absent,
}
