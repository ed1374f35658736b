//! Account configuration and validation.

mod model;
mod validation;

pub use model::{Account, AuthMethod, DEFAULT_IMAP_PORT};
pub use validation::{ValidationError, ValidationResult, validate_account};
