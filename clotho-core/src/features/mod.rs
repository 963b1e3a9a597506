//! Pluggable feature extraction.
//!
//! A feature function turns one-dimensional raw samples into a
//! `(time, feature-dimension)` matrix. Functions are registered in a
//! `FeatureRegistry` under a `package::callable` reference together with the
//! keyword parameters they accept. The pipeline resolves the configured
//! reference once at startup, validating the configured keyword arguments
//! against the declared parameters, and never looks it up again per record.

pub mod args;
pub mod log_mel;
pub mod registry;

pub use args::{FeatureArgs, ParamKind, ParamSpec};
pub use registry::FeatureRegistry;

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{ClothoError, Result};
use crate::record::RecordKey;

/// Contract every feature function must honor.
///
/// Implementations must be deterministic: the same samples always produce a
/// bit-identical matrix.
pub trait FeatureFunction: Send + Sync {
    /// Compute a `(time, feature-dimension)` matrix from mono samples.
    fn extract(&self, samples: &[f32]) -> Result<Array2<f32>>;
}

impl<F> FeatureFunction for F
where
    F: Fn(&[f32]) -> Result<Array2<f32>> + Send + Sync,
{
    fn extract(&self, samples: &[f32]) -> Result<Array2<f32>> {
        self(samples)
    }
}

/// `package::callable` name of a registered feature function.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FeatureRef {
    pub package: String,
    pub callable: String,
}

impl FeatureRef {
    pub fn new(package: impl Into<String>, callable: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            callable: callable.into(),
        }
    }
}

impl fmt::Display for FeatureRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.package, self.callable)
    }
}

impl FromStr for FeatureRef {
    type Err = ClothoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().rsplit_once("::") {
            Some((package, callable)) if !package.is_empty() && !callable.is_empty() => {
                Ok(Self::new(package, callable))
            }
            _ => Err(ClothoError::FeatureFunctionResolution {
                reference: s.to_string(),
                reason: "expected `package::callable`".into(),
            }),
        }
    }
}

/// A resolved feature function, shared by every worker of a run.
///
/// Checks each output: at least one feature column, finite values, and the
/// same column count as the first matrix produced in this run.
pub struct FeatureExtractor {
    reference: FeatureRef,
    function: Arc<dyn FeatureFunction>,
    columns: OnceLock<usize>,
}

impl FeatureExtractor {
    /// Wrap an already-constructed function, bypassing the registry.
    pub fn new(reference: FeatureRef, function: Arc<dyn FeatureFunction>) -> Self {
        Self {
            reference,
            function,
            columns: OnceLock::new(),
        }
    }

    pub fn reference(&self) -> &FeatureRef {
        &self.reference
    }

    /// Feature dimension observed so far, if any record has been processed.
    pub fn columns(&self) -> Option<usize> {
        self.columns.get().copied()
    }

    /// Run the function on the samples of the record identified by `key`.
    ///
    /// # Errors
    /// `ClothoError::FeatureExtraction` scoped to `key`.
    pub fn extract(&self, key: &RecordKey, samples: &[f32]) -> Result<Array2<f32>> {
        let fail = |reason: String| ClothoError::FeatureExtraction {
            key: key.clone(),
            reason,
        };

        let features = self
            .function
            .extract(samples)
            .map_err(|e| fail(e.to_string()))?;

        let cols = features.ncols();
        if cols == 0 {
            return Err(fail(format!(
                "{} returned a matrix with no feature columns",
                self.reference
            )));
        }
        if let Some(pos) = features.iter().position(|v| !v.is_finite()) {
            return Err(fail(format!(
                "{} returned a non-finite value at flat index {pos}",
                self.reference
            )));
        }

        let expected = *self.columns.get_or_init(|| cols);
        if cols != expected {
            return Err(fail(format!(
                "{} returned {cols} feature columns, earlier records had {expected}",
                self.reference
            )));
        }

        Ok(features)
    }
}

impl fmt::Debug for FeatureExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureExtractor")
            .field("reference", &self.reference)
            .field("columns", &self.columns.get())
            .finish_non_exhaustive()
    }
}
