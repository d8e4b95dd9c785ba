//! Upload validation rules.

use std::path::Path;

use lettre::Address;

use audiopipe_core::config::StorageConfig;
use audiopipe_core::error::AppError;
use audiopipe_core::result::AppResult;

/// Check the file extension against the allow-set, case-insensitively.
///
/// Returns the normalized extension including the leading dot.
pub fn validate_extension(file_name: &str, config: &StorageConfig) -> AppResult<String> {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default();

    let allowed = config
        .allowed_extensions
        .iter()
        .any(|a| a.eq_ignore_ascii_case(&extension));

    if allowed {
        Ok(extension)
    } else {
        Err(AppError::validation(format!(
            "Invalid file type. Allowed types: {}",
            config.allowed_extensions.join(", ")
        )))
    }
}

/// Check the upload size against the configured ceiling.
pub fn validate_size(size: u64, config: &StorageConfig) -> AppResult<()> {
    if size > config.max_upload_size_bytes {
        return Err(AppError::validation("File size exceeds maximum allowed size"));
    }
    Ok(())
}

/// Parse the owning user as a mail address.
pub fn validate_recipient(user_id: &str) -> AppResult<Address> {
    user_id
        .trim()
        .parse::<Address>()
        .map_err(|e| AppError::validation(format!("Invalid recipient address '{user_id}': {e}")))
}
