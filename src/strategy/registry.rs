//! Identifier → strategy resolution.
//!
//! The resolver maps a configured identifier to a factory that builds a
//! configured [`Strategy`] from its [`StrategyOptions`]. An alias table is
//! consulted first, so `resize` and `image-resize` name the same thing.
//!
//! Resolution fails in two distinct ways:
//!
//! - [`ResolveError::Unresolvable`]: nothing is registered under the
//!   (alias-substituted) identifier.
//! - [`ResolveError::WrongCapability`]: something is registered, but it could
//!   not be configured into a working strategy with the given options.
//!
//! Chains can be checked up front with [`StrategyResolver::validate_chain`],
//! so configuration errors surface at load time rather than mid-upload.

use super::{OptionsError, Strategy, StrategyOptions};
use super::{optimize, orient, resize, video, watermark};
use indexmap::IndexMap;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;

pub const IMAGE_RESIZE: &str = "image-resize";
pub const IMAGE_AUTO_ORIENT: &str = "image-auto-orient";
pub const IMAGE_WATERMARK: &str = "image-watermark";
pub const IMAGE_OPTIMIZE: &str = "image-optimize";
pub const VIDEO_SCREENSHOT: &str = "video-screenshot";

/// Short names accepted for the built-in strategies.
pub const DEFAULT_ALIASES: &[(&str, &str)] = &[
    ("resize", IMAGE_RESIZE),
    ("auto-orient", IMAGE_AUTO_ORIENT),
    ("watermark", IMAGE_WATERMARK),
    ("optimize", IMAGE_OPTIMIZE),
    ("screenshot", VIDEO_SCREENSHOT),
];

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("No strategy registered for '{0}'")]
    Unresolvable(String),
    #[error("Strategy '{identifier}' cannot be configured: {reason}")]
    WrongCapability {
        identifier: String,
        reason: OptionsError,
    },
}

type Factory =
    Arc<dyn Fn(&StrategyOptions) -> Result<Box<dyn Strategy>, OptionsError> + Send + Sync>;

/// Registry of strategy factories plus an alias table.
#[derive(Clone, Default)]
pub struct StrategyResolver {
    factories: HashMap<String, Factory>,
    aliases: HashMap<String, String>,
}

impl std::fmt::Debug for StrategyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyResolver")
            .field("identifiers", &self.identifiers())
            .field("aliases", &self.aliases)
            .finish()
    }
}

impl StrategyResolver {
    /// An empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// A resolver with the built-in strategies and their short aliases.
    pub fn with_defaults() -> Self {
        let mut resolver = Self::new();
        resolver.register(IMAGE_RESIZE, resize::ResizeStrategy::from_options);
        resolver.register(IMAGE_AUTO_ORIENT, orient::AutoOrientStrategy::from_options);
        resolver.register(IMAGE_WATERMARK, watermark::WatermarkStrategy::from_options);
        resolver.register(IMAGE_OPTIMIZE, optimize::OptimizeStrategy::from_options);
        resolver.register(VIDEO_SCREENSHOT, video::ScreenshotStrategy::from_options);
        for (alias, target) in DEFAULT_ALIASES {
            resolver.alias(*alias, *target);
        }
        resolver
    }

    /// Register a factory under `identifier`, replacing any previous one.
    pub fn register<F>(&mut self, identifier: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&StrategyOptions) -> Result<Box<dyn Strategy>, OptionsError> + Send + Sync + 'static,
    {
        self.factories.insert(identifier.into(), Arc::new(factory));
        self
    }

    /// Make `alias` resolve to `identifier`.
    pub fn alias(&mut self, alias: impl Into<String>, identifier: impl Into<String>) -> &mut Self {
        self.aliases.insert(alias.into(), identifier.into());
        self
    }

    /// Add every entry of an alias table, overriding existing aliases.
    pub fn extend_aliases<I, K, V>(&mut self, aliases: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (alias, identifier) in aliases {
            self.alias(alias, identifier);
        }
        self
    }

    /// The identifier `identifier` resolves to after alias substitution.
    ///
    /// Substitution happens once; aliases don't chain.
    pub fn canonical<'a>(&'a self, identifier: &'a str) -> &'a str {
        self.aliases
            .get(identifier)
            .map(String::as_str)
            .unwrap_or(identifier)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.factories.contains_key(self.canonical(identifier))
    }

    /// Registered identifiers, sorted.
    pub fn identifiers(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Alias table, sorted by alias.
    pub fn aliases(&self) -> BTreeMap<&str, &str> {
        self.aliases
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }

    /// Build a configured strategy instance.
    pub fn resolve(
        &self,
        identifier: &str,
        options: &StrategyOptions,
    ) -> Result<Box<dyn Strategy>, ResolveError> {
        let concrete = self.canonical(identifier);
        let factory = self
            .factories
            .get(concrete)
            .ok_or_else(|| ResolveError::Unresolvable(concrete.to_string()))?;
        factory(options).map_err(|reason| ResolveError::WrongCapability {
            identifier: concrete.to_string(),
            reason,
        })
    }

    /// Resolve every step of a chain once, discarding the instances.
    pub fn validate_chain(&self, chain: &IndexMap<String, StrategyOptions>) -> Result<(), ResolveError> {
        for (identifier, options) in chain {
            self.resolve(identifier, options)?;
        }
        Ok(())
    }
}
