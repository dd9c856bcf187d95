//! `${VAR}` and `${VAR:-default}` expansion for configuration strings.

use std::borrow::Cow;
use std::env::VarError;

use crate::ConfigError;

/// Expand environment variable references in `value`.
///
/// Bare `$VAR` is left alone; only the braced form is recognised. A
/// variable that is unset (or not unicode) and has no default is an error
/// naming `field`.
pub(crate) fn expand_env(value: &str, field: &str) -> Result<String, ConfigError> {
    if !value.contains("${") {
        return Ok(value.to_owned());
    }

    shellexpand::env_with_context(value, |name| std::env::var(name).map(Some))
        .map(Cow::into_owned)
        .map_err(|e| {
            let reason = match e.cause {
                VarError::NotPresent => "not set",
                VarError::NotUnicode(_) => "is not valid unicode",
            };
            ConfigError::EnvVar {
                field: field.to_owned(),
                message: format!("${{{}}} {reason}", e.var_name),
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_literal() {
        assert_eq!(expand_env("utf-8", "output.encoding").unwrap(), "utf-8");
        assert_eq!(expand_env("$HOME", "output.encoding").unwrap(), "$HOME");
    }

    #[test]
    fn test_expand_set_var() {
        // SAFETY: the variable name is unique to this test
        unsafe {
            std::env::set_var("MELD_EXPAND_SET", "us-ascii");
        }
        let result = expand_env("${MELD_EXPAND_SET}", "output.encoding").unwrap();
        assert_eq!(result, "us-ascii");
        unsafe {
            std::env::remove_var("MELD_EXPAND_SET");
        }
    }

    #[test]
    fn test_expand_default() {
        // SAFETY: the variable name is unique to this test
        unsafe {
            std::env::remove_var("MELD_EXPAND_DEFAULT");
        }
        let result = expand_env("${MELD_EXPAND_DEFAULT:-xml}", "output.method").unwrap();
        assert_eq!(result, "xml");
    }

    #[test]
    fn test_expand_embedded() {
        // SAFETY: the variable name is unique to this test
        unsafe {
            std::env::set_var("MELD_EXPAND_HOST", "example.org");
        }
        let result = expand_env("http://${MELD_EXPAND_HOST}/ns", "renderer.namespaces.x").unwrap();
        assert_eq!(result, "http://example.org/ns");
        unsafe {
            std::env::remove_var("MELD_EXPAND_HOST");
        }
    }

    #[test]
    fn test_expand_unset_is_error() {
        // SAFETY: the variable name is unique to this test
        unsafe {
            std::env::remove_var("MELD_EXPAND_UNSET");
        }
        let err = expand_env("${MELD_EXPAND_UNSET}", "parse.encoding").unwrap_err();
        assert!(matches!(err, ConfigError::EnvVar { .. }));
        assert_eq!(
            err.to_string(),
            "Environment variable error in parse.encoding: ${MELD_EXPAND_UNSET} not set"
        );
    }
}
