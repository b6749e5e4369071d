//! Decryptor plugin contract and registry.
//!
//! A [`Config`](crate::Config) owns one [`DecryptorRegistry`]. Values are
//! decrypted lazily, by the first registered decryptor that claims them.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::DecryptError;
use crate::sops::SopsDecryptor;
use crate::{ConfigError, ConfigResult, ConfigValue};

/// Trait for configuration value decryptors.
pub trait Decryptor: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// Whether this decryptor handles the given value. Must not fail and must
    /// return false for non-string values.
    fn can_decrypt(&self, value: &ConfigValue) -> bool;

    /// Decrypt a value previously claimed by [`can_decrypt`](Self::can_decrypt).
    fn decrypt(&self, value: &ConfigValue) -> Result<String, DecryptError>;
}

/// Ordered set of decryptors; the first one that claims a value decrypts it.
#[derive(Clone, Default)]
pub struct DecryptorRegistry {
    decryptors: Vec<Arc<dyn Decryptor>>,
}

impl DecryptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, decryptor: Arc<dyn Decryptor>) {
        debug!(decryptor = decryptor.name(), "Registering config decryptor");
        self.decryptors.push(decryptor);
    }

    pub fn len(&self) -> usize {
        self.decryptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decryptors.is_empty()
    }

    pub fn clear(&mut self) {
        self.decryptors.clear();
    }

    /// Decrypt `value` with the first decryptor that claims it, or `None` if
    /// no decryptor does.
    pub fn decrypt(&self, value: &ConfigValue) -> ConfigResult<Option<String>> {
        if !value.raw_value().is_string() {
            return Ok(None);
        }

        let Some(decryptor) = self.decryptors.iter().find(|d| d.can_decrypt(value)) else {
            return Ok(None);
        };

        decryptor
            .decrypt(value)
            .map(Some)
            .map_err(|e| ConfigError::Decryption {
                path: value.path(),
                source_name: value.source().to_string(),
                message: format!("{}: {}", decryptor.name(), e),
            })
    }
}

impl fmt::Debug for DecryptorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.decryptors.iter().map(|d| d.name()))
            .finish()
    }
}

type DecryptorConstructor =
    Arc<dyn Fn(&Map<String, Value>) -> ConfigResult<Arc<dyn Decryptor>> + Send + Sync>;

/// Constructs decryptors by implementer name, as listed under
/// `config-decryptors` in a configuration document.
#[derive(Clone, Default)]
pub struct DecryptorFactory {
    constructors: HashMap<String, DecryptorConstructor>,
}

impl DecryptorFactory {
    /// An empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory knowing the built-in decryptors.
    pub fn with_builtins() -> Self {
        let mut factory = Self::new();
        factory.register(SopsDecryptor::IMPLEMENTER, |config| {
            Ok(Arc::new(SopsDecryptor::from_config(config)?) as Arc<dyn Decryptor>)
        });
        factory
    }

    pub fn register<F>(&mut self, implementer: impl Into<String>, constructor: F)
    where
        F: Fn(&Map<String, Value>) -> ConfigResult<Arc<dyn Decryptor>> + Send + Sync + 'static,
    {
        self.constructors
            .insert(implementer.into(), Arc::new(constructor));
    }

    pub fn create(
        &self,
        implementer: &str,
        config: &Map<String, Value>,
    ) -> ConfigResult<Arc<dyn Decryptor>> {
        let constructor = self
            .constructors
            .get(implementer)
            .ok_or_else(|| ConfigError::UnknownDecryptor(implementer.to_string()))?;
        constructor(config)
    }
}

impl fmt::Debug for DecryptorFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.constructors.keys().collect();
        names.sort();
        f.debug_struct("DecryptorFactory")
            .field("implementers", &names)
            .finish()
    }
}
