use crate::error::{Error, Result};

/// The language whose questions live in the base container.
pub const DEFAULT_LANGUAGE: &str = "English";

/// Work out which container holds the questions for `language`.
///
/// The default language uses `base` itself; every other language gets its
/// own `base_LANGUAGE` container.
pub fn container_name(base: &str, default_language: &str, language: &str) -> Result<String> {
    if language.trim().is_empty() || language.contains(['$', '\0']) {
        return Err(Error::InvalidLanguage(language.to_string()));
    }
    if language == default_language {
        Ok(base.to_string())
    } else {
        Ok(format!("{base}_{language}"))
    }
}
