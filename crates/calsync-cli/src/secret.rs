//! Secret reference resolver.
//!
//! Values in `config.toml` can point at secrets stored outside the file:
//!
//! - `pass::path/in/store` runs `pass show path/in/store` and keeps the first line
//! - `env::VAR_NAME` reads `$VAR_NAME` from the environment
//! - anything else is returned as-is (plain text)

use crate::error::{CliError, CliResult};

/// Resolves a value that may contain a secret reference prefix.
pub fn resolve(value: &str) -> CliResult<String> {
    if let Some(path) = value.strip_prefix("pass::") {
        resolve_pass(path)
    } else if let Some(var) = value.strip_prefix("env::") {
        resolve_env(var)
    } else {
        Ok(value.to_string())
    }
}

/// Resolves an optional value; `None` stays `None`.
pub fn resolve_opt(value: Option<&str>) -> CliResult<Option<String>> {
    value.map(resolve).transpose()
}

/// Returns `true` for values stored as a reference rather than inline.
pub fn is_reference(value: &str) -> bool {
    value.starts_with("pass::") || value.starts_with("env::")
}

fn resolve_pass(path: &str) -> CliResult<String> {
    let output = std::process::Command::new("pass")
        .arg("show")
        .arg(path)
        .output()
        .map_err(|e| CliError::Config(format!("failed to run `pass show {}`: {}", path, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CliError::Config(format!(
            "`pass show {}` failed (exit {}): {}",
            path,
            output.status,
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .lines()
        .next()
        .map(|s| s.to_string())
        .ok_or_else(|| CliError::Config(format!("`pass show {}` produced no output", path)))
}

fn resolve_env(var: &str) -> CliResult<String> {
    std::env::var(var)
        .map_err(|_| CliError::Config(format!("environment variable `{}` is not set", var)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passthrough() {
        assert_eq!(resolve("hello").unwrap(), "hello");
        assert_eq!(resolve("").unwrap(), "");
        assert!(!is_reference("xxx.apps.googleusercontent.com"));
    }

    #[test]
    fn env_prefix_resolves() {
        unsafe {
            std::env::set_var("_CALSYNC_TEST_SECRET", "my-secret-value");
        }
        assert_eq!(resolve("env::_CALSYNC_TEST_SECRET").unwrap(), "my-secret-value");
        assert_eq!(
            resolve_opt(Some("env::_CALSYNC_TEST_SECRET")).unwrap().as_deref(),
            Some("my-secret-value")
        );
        unsafe {
            std::env::remove_var("_CALSYNC_TEST_SECRET");
        }
    }

    #[test]
    fn env_prefix_missing_var_errors() {
        let err = resolve("env::_CALSYNC_NONEXISTENT_VAR_12345").unwrap_err();
        assert!(err.to_string().contains("not set"));
        assert_eq!(resolve_opt(None).unwrap(), None);
    }

    #[test]
    fn pass_prefix_missing_entry_errors() {
        assert!(is_reference("pass::calendar/nextcloud"));
        assert!(resolve("pass::nonexistent/entry/that/should/not/exist/12345").is_err());
    }
}
