//! Environment variable lookup with a typed error for missing values.

use thiserror::Error;

/// An environment variable required by the application is not set.
#[derive(Debug, Error)]
#[error("Missing environment variable: {0}")]
pub struct MissingEnvVarError(pub String);

/// Reads an environment variable, returning a structured error if it's missing.
///
/// Empty values are treated as missing so that `DATABASE_URL=` in a `.env`
/// file does not silently point at an unnamed database.
///
/// # Arguments
/// * `name` - The name of the environment variable to read.
pub fn get_env_var(name: &str) -> Result<String, MissingEnvVarError> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(MissingEnvVarError(name.to_string())),
    }
}

/// Reads an environment variable, falling back to `default` when it is unset or empty.
pub fn get_env_var_or(name: &str, default: &str) -> String {
    get_env_var(name).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn missing_var_is_reported_by_name() {
        unsafe { std::env::remove_var("SHARED_UTILS_TEST_MISSING") };
        let err = get_env_var("SHARED_UTILS_TEST_MISSING").unwrap_err();
        assert_eq!(err.0, "SHARED_UTILS_TEST_MISSING");
        assert_eq!(
            err.to_string(),
            "Missing environment variable: SHARED_UTILS_TEST_MISSING"
        );
    }

    #[test]
    #[serial]
    fn empty_var_counts_as_missing() {
        unsafe { std::env::set_var("SHARED_UTILS_TEST_EMPTY", "  ") };
        assert!(get_env_var("SHARED_UTILS_TEST_EMPTY").is_err());
        assert_eq!(get_env_var_or("SHARED_UTILS_TEST_EMPTY", "fallback"), "fallback");
        unsafe { std::env::remove_var("SHARED_UTILS_TEST_EMPTY") };
    }

    #[test]
    #[serial]
    fn present_var_wins_over_default() {
        unsafe { std::env::set_var("SHARED_UTILS_TEST_PRESENT", "sqlite:progress.db") };
        assert_eq!(
            get_env_var_or("SHARED_UTILS_TEST_PRESENT", "unused"),
            "sqlite:progress.db"
        );
        unsafe { std::env::remove_var("SHARED_UTILS_TEST_PRESENT") };
    }
}
