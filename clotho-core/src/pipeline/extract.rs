//! Feature stage: raw-audio records → feature records in a second store.

use std::sync::atomic::Ordering;

use tracing::{debug, info};

use super::assemble::AssembledSplit;
use super::workers::for_each_job;
use super::PipelineDiagnostics;
use crate::error::{ClothoError, Result};
use crate::features::FeatureExtractor;
use crate::record::{Record, RecordKey, Split, SplitManifest};
use crate::store::RecordStore;

pub struct FeatureOrchestrator<'a> {
    pub extractor: &'a FeatureExtractor,
    /// Store holding the assembled raw-audio records.
    pub source: &'a dyn RecordStore,
    /// Store receiving the feature records.
    pub target: &'a dyn RecordStore,
    pub nb_workers: usize,
    pub diagnostics: &'a PipelineDiagnostics,
}

impl FeatureOrchestrator<'_> {
    /// Extract every record found in the source store for `split`.
    ///
    /// # Errors
    /// `ClothoError::SplitMismatch` when the stored records disagree with the
    /// count committed in the source manifest.
    pub fn extract_split(&self, split: Split) -> Result<usize> {
        let keys = self.source.list(split)?;
        if let Some(manifest) = self.source.manifest(split)? {
            if manifest.records != keys.len() {
                return Err(ClothoError::SplitMismatch {
                    split,
                    path: self.source.location(split),
                    listed: keys.len(),
                    committed: manifest.records,
                });
            }
        }
        self.run(split, keys)
    }

    /// Extract the records produced by an assembly run in this process.
    pub fn extract_assembled(&self, assembled: &AssembledSplit) -> Result<usize> {
        self.run(assembled.split, assembled.keys.clone())
    }

    /// Feature version of one raw-audio record. Caption fields are untouched.
    ///
    /// # Errors
    /// `ClothoError::FeatureExtraction` if the record has no raw audio or the
    /// feature function fails its output checks.
    pub fn extract_record(&self, record: &Record) -> Result<Record> {
        let key = record.key();
        let audio = record
            .raw_audio()
            .ok_or_else(|| ClothoError::FeatureExtraction {
                key: key.clone(),
                reason: "record has no raw audio".into(),
            })?;
        let features = self.extractor.extract(&key, &audio.samples)?;
        record.with_features(features)
    }

    fn run(&self, split: Split, keys: Vec<RecordKey>) -> Result<usize> {
        let count = keys.len();
        if self.source.location(split) == self.target.location(split) {
            return Err(ClothoError::Config(format!(
                "feature records of split {split} would replace the raw records in {}",
                self.target.location(split).display()
            )));
        }
        self.target.invalidate(split)?;

        info!(
            split = %split,
            records = count,
            function = %self.extractor.reference(),
            location = %self.target.location(split).display(),
            "extracting features"
        );

        for_each_job(self.nb_workers, keys, |key| {
            let raw = self.source.read(&key)?;
            let featured = self.extract_record(&raw)?;
            self.target.write(&featured)?;
            self.diagnostics
                .records_extracted
                .fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, shape = ?featured.features().map(|f| f.dim()), "features written");
            Ok(())
        })?;

        self.target.commit(&SplitManifest::extracted(
            split,
            count,
            self.extractor.reference().to_string(),
            self.extractor.columns(),
        ))?;
        info!(split = %split, records = count, "features extracted");
        Ok(count)
    }
}
