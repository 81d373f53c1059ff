//! Short, time-ordered identifiers used as default document names.

use std::sync::{LazyLock, Mutex, PoisonError};
use ulid::{Generator, Ulid};

static GENERATOR: LazyLock<Mutex<Generator>> = LazyLock::new(|| Mutex::new(Generator::new()));

/// A new lower-case ULID: 26 characters of `[0-9a-z]`, valid as a resource name.
///
/// Identifiers from one process are strictly increasing. If the monotonic generator runs
/// out of entropy within a millisecond a fresh random ULID is used instead.
pub fn generate_id() -> String {
    let next = GENERATOR
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .generate()
        .ok();
    next.unwrap_or_else(Ulid::new).to_string().to_lowercase()
}
