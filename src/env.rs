//! `${VAR}` expansion for configuration values.
//!
//! Lookups consult the configuration's own `env` map before the host
//! environment. `${VAR:-fallback}` substitutes `fallback` when the variable
//! is unset anywhere, and `$$` yields a literal `$`.

use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpandError {
    #[error("unclosed variable reference starting at byte {offset}")]
    Unclosed { offset: usize },

    #[error("empty variable name at byte {offset}")]
    EmptyName { offset: usize },

    #[error("environment variable '{name}' is not set")]
    Unset { name: String },
}

/// Expands variable references against an override map and the host environment.
#[derive(Debug, Clone, Copy)]
pub struct Expander<'a> {
    overrides: Option<&'a HashMap<String, String>>,
}

impl<'a> Expander<'a> {
    /// Host environment only.
    pub fn system() -> Self {
        Self { overrides: None }
    }

    /// `overrides` win over the host environment.
    pub fn with_overrides(overrides: &'a HashMap<String, String>) -> Self {
        Self {
            overrides: Some(overrides),
        }
    }

    fn lookup(&self, name: &str) -> Option<String> {
        self.overrides
            .and_then(|map| map.get(name).cloned())
            .or_else(|| std::env::var(name).ok())
    }

    /// ```
    /// use std::collections::HashMap;
    /// use bmtest::env::Expander;
    ///
    /// let mut env = HashMap::new();
    /// env.insert("BM_HOME".to_string(), "/opt/bm".to_string());
    /// let expander = Expander::with_overrides(&env);
    /// assert_eq!(
    ///     expander.expand("${BM_HOME}/bin/build_master").unwrap(),
    ///     "/opt/bm/bin/build_master"
    /// );
    /// assert_eq!(expander.expand("${BMTEST_NOT_SET_1:-meson}").unwrap(), "meson");
    /// ```
    pub fn expand(&self, input: &str) -> Result<String, ExpandError> {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;

        while let Some(pos) = rest.find('$') {
            out.push_str(&rest[..pos]);
            let offset = input.len() - rest.len() + pos;
            let after = &rest[pos + 1..];

            if let Some(tail) = after.strip_prefix('$') {
                out.push('$');
                rest = tail;
            } else if let Some(body) = after.strip_prefix('{') {
                let end = body.find('}').ok_or(ExpandError::Unclosed { offset })?;
                out.push_str(&self.resolve(&body[..end], offset)?);
                rest = &body[end + 1..];
            } else {
                out.push('$');
                rest = after;
            }
        }

        out.push_str(rest);
        Ok(out)
    }

    fn resolve(&self, reference: &str, offset: usize) -> Result<String, ExpandError> {
        let (name, fallback) = match reference.split_once(":-") {
            Some((name, fallback)) => (name, Some(fallback)),
            None => (reference, None),
        };
        if name.is_empty() {
            return Err(ExpandError::EmptyName { offset });
        }
        self.lookup(name)
            .or_else(|| fallback.map(str::to_string))
            .ok_or_else(|| ExpandError::Unset {
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overrides(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn expands_host_variables() {
        // SAFETY: only this test touches BMTEST_TOOL_DIR
        unsafe {
            std::env::set_var("BMTEST_TOOL_DIR", "/usr/local/bin");
        }
        let expander = Expander::system();
        assert_eq!(
            expander.expand("${BMTEST_TOOL_DIR}/build_master").unwrap(),
            "/usr/local/bin/build_master"
        );
        assert_eq!(expander.expand("build_master").unwrap(), "build_master");
        assert_eq!(expander.expand("").unwrap(), "");
    }

    #[test]
    fn overrides_take_precedence() {
        let env = overrides(&[("PATH", "/sandboxed")]);
        let expander = Expander::with_overrides(&env);
        assert_eq!(expander.expand("${PATH}:x").unwrap(), "/sandboxed:x");
    }

    #[test]
    fn fallback_only_when_unset() {
        let env = overrides(&[("VALIDATOR", "muon")]);
        let expander = Expander::with_overrides(&env);
        assert_eq!(expander.expand("${VALIDATOR:-meson}").unwrap(), "muon");
        assert_eq!(
            expander.expand("${BMTEST_UNSET_4242:-meson}").unwrap(),
            "meson"
        );
        assert_eq!(expander.expand("${BMTEST_UNSET_4242:-}").unwrap(), "");
    }

    #[test]
    fn unset_variable_is_named() {
        let err = Expander::system()
            .expand("${NONEXISTENT_VAR_12345}")
            .unwrap_err();
        assert_eq!(
            err,
            ExpandError::Unset {
                name: "NONEXISTENT_VAR_12345".to_string()
            }
        );
    }

    #[test]
    fn unclosed_and_empty_references() {
        let expander = Expander::system();
        assert_eq!(
            expander.expand("tool-${UNCLOSED"),
            Err(ExpandError::Unclosed { offset: 5 })
        );
        assert_eq!(
            expander.expand("${}"),
            Err(ExpandError::EmptyName { offset: 0 })
        );
    }

    #[test]
    fn dollar_handling() {
        let expander = Expander::system();
        assert_eq!(expander.expand("$HOME").unwrap(), "$HOME");
        assert_eq!(expander.expand("cost$$5").unwrap(), "cost$5");
        assert_eq!(expander.expand("$${HOME}").unwrap(), "${HOME}");
        assert_eq!(expander.expand("trailing$").unwrap(), "trailing$");
    }
}
