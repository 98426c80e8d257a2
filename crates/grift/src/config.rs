use serde::Deserialize;

use crate::error::ConfigError;

/// Prefix distinguishing seeded context keys from step tags.
pub const DEFAULT_RESERVED_PREFIX: &str = "$";

/// Behaviour switches for a [`Transaction`](crate::Transaction).
///
/// With `inject_context` off (the default), steps only see the results of
/// earlier steps. With it on, the transaction may be seeded with an initial
/// context whose keys are addressed through the reserved prefix, each action
/// can read the immediately preceding result through
/// [`Context::previous`](crate::Context::previous), and result accessors hide
/// every tag that starts with the reserved prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionConfig {
    inject_context: bool,
    reserved_prefix: String,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            inject_context: false,
            reserved_prefix: String::from(DEFAULT_RESERVED_PREFIX),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct ConfigValues {
    #[serde(default, rename = "inject-context")]
    inject_context: Option<bool>,
    #[serde(default, rename = "reserved-prefix")]
    reserved_prefix: Option<String>,
}

impl TransactionConfig {
    /// Configuration with context injection switched on.
    #[must_use]
    pub fn injecting() -> Self {
        Self::default().with_inject_context(true)
    }

    /// Parses a configuration table such as
    ///
    /// ```toml
    /// inject-context = true
    /// reserved-prefix = "@"
    /// ```
    ///
    /// Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or mistyped values and
    /// [`ConfigError::EmptyReservedPrefix`] if the prefix is set to `""`.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let values: ConfigValues = toml::from_str(input)?;
        Self::from_values(values)
    }

    fn from_values(values: ConfigValues) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let reserved_prefix = values
            .reserved_prefix
            .unwrap_or(defaults.reserved_prefix);
        if reserved_prefix.is_empty() {
            return Err(ConfigError::EmptyReservedPrefix);
        }

        Ok(Self {
            inject_context: values.inject_context.unwrap_or(defaults.inject_context),
            reserved_prefix,
        })
    }

    /// Whether steps see seeds and the previous result.
    #[must_use]
    pub fn inject_context(&self) -> bool {
        self.inject_context
    }

    /// Prefix marking tags hidden from result accessors.
    #[must_use]
    pub fn reserved_prefix(&self) -> &str {
        &self.reserved_prefix
    }

    /// Switches context injection on or off.
    #[must_use]
    pub fn with_inject_context(mut self, inject_context: bool) -> Self {
        self.inject_context = inject_context;
        self
    }

    /// Replaces the reserved prefix.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyReservedPrefix`] if `prefix` is empty.
    pub fn with_reserved_prefix(mut self, prefix: impl Into<String>) -> Result<Self, ConfigError> {
        let prefix = prefix.into();
        if prefix.is_empty() {
            return Err(ConfigError::EmptyReservedPrefix);
        }
        self.reserved_prefix = prefix;
        Ok(self)
    }

    /// Whether `key` is hidden from step-result accessors under this configuration.
    #[must_use]
    pub(crate) fn is_reserved(&self, key: &str) -> bool {
        self.inject_context && key.starts_with(&self.reserved_prefix)
    }
}
