//! Name → constructor table for feature functions.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::info;

use super::{log_mel, FeatureArgs, FeatureExtractor, FeatureFunction, FeatureRef, ParamSpec};
use crate::error::{ClothoError, Result};

type Factory = Arc<dyn Fn(&FeatureArgs) -> Result<Arc<dyn FeatureFunction>> + Send + Sync>;

struct Entry {
    params: Vec<ParamSpec>,
    factory: Factory,
}

/// Registered feature functions, keyed by `package::callable`.
#[derive(Default)]
pub struct FeatureRegistry {
    entries: BTreeMap<FeatureRef, Entry>,
}

impl FeatureRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the functions shipped with this crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(
            FeatureRef::new(log_mel::PACKAGE, log_mel::CALLABLE),
            log_mel::params(),
            |args| {
                let function: Arc<dyn FeatureFunction> =
                    Arc::new(log_mel::LogMelBands::from_args(args)?);
                Ok(function)
            },
        );
        registry
    }

    /// Register (or replace) a function under `reference`.
    pub fn register<F>(&mut self, reference: FeatureRef, params: Vec<ParamSpec>, factory: F)
    where
        F: Fn(&FeatureArgs) -> Result<Arc<dyn FeatureFunction>> + Send + Sync + 'static,
    {
        self.entries.insert(
            reference,
            Entry {
                params,
                factory: Arc::new(factory),
            },
        );
    }

    pub fn references(&self) -> impl Iterator<Item = &FeatureRef> {
        self.entries.keys()
    }

    /// Look up `reference`, validate `kwargs` and construct the function.
    ///
    /// # Errors
    /// `ClothoError::FeatureFunctionResolution` when the package or callable
    /// is unknown, when `kwargs` do not match the declared parameters, or
    /// when construction rejects the argument values.
    pub fn resolve(
        &self,
        reference: &FeatureRef,
        kwargs: &Map<String, Value>,
    ) -> Result<FeatureExtractor> {
        let fail = |reason: String| ClothoError::FeatureFunctionResolution {
            reference: reference.to_string(),
            reason,
        };

        let Some(entry) = self.entries.get(reference) else {
            let package_known = self
                .entries
                .keys()
                .any(|r| r.package == reference.package);
            return Err(fail(if package_known {
                format!(
                    "package `{}` has no callable `{}`",
                    reference.package, reference.callable
                )
            } else {
                format!("unknown package `{}`", reference.package)
            }));
        };

        let args = FeatureArgs::validate(kwargs, &entry.params).map_err(fail)?;
        let function = (entry.factory)(&args).map_err(|e| fail(e.to_string()))?;

        info!(function = %reference, args = ?args.as_map(), "feature function resolved");
        Ok(FeatureExtractor::new(reference.clone(), function))
    }
}

impl std::fmt::Debug for FeatureRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.entries.keys()).finish()
    }
}
