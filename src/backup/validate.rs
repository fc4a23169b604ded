//! Validation functions for configuration values.
//!
//! Root directories are only checked here; creating them is left to the
//! supervisor so a failure surfaces as a root error at startup.

use validator::ValidationError;

use std::path::Path;

pub fn validate_dir_path<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    if dir.as_os_str().is_empty() {
        return Err(ValidationError::new("InvalidDirectory")
            .with_message("directory path must not be empty".into()));
    }

    if dir.exists() && !dir.is_dir() {
        return Err(ValidationError::new("InvalidDirectory")
            .with_message(format!("{:?} is not a directory", dir).into()));
    }

    Ok(())
}
