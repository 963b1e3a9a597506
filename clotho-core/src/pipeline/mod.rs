//! Split coordination: assembly, verification and feature extraction.
//!
//! ```text
//! annotations CSV ─► CaptionTable ─► SplitVocabularies
//!                                          │
//! audio dir ─► RecordAssembler ─► raw store (records + vocabularies + manifest)
//!                                          │
//!                       DatasetVerifier ◄──┤
//!                                          ▼
//!                     FeatureOrchestrator ─► feature store
//! ```
//!
//! Everything that can be checked without writing is checked before the
//! first write: the feature function is resolved, annotations are read and
//! vocabularies are built, and splits to extract from storage must be
//! assembled.

pub mod assemble;
pub mod extract;
pub mod verify;
pub mod workers;

pub use assemble::{AssembledSplit, RecordAssembler, SplitVocabularies};
pub use extract::FeatureOrchestrator;
pub use verify::DatasetVerifier;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, info_span};

use crate::audio::{AudioReader, WavReader};
use crate::captions::{CaptionOptions, CaptionTable};
use crate::config::{DatasetSettings, FeatureSettings};
use crate::error::{ClothoError, Result};
use crate::features::{FeatureExtractor, FeatureRef, FeatureRegistry};
use crate::record::{Split, SplitStage};
use crate::store::{FsRecordStore, RecordStore};

#[derive(Default)]
pub struct PipelineDiagnostics {
    pub audio_files_read: AtomicUsize,
    pub audio_files_skipped: AtomicUsize,
    pub records_assembled: AtomicUsize,
    pub records_verified: AtomicUsize,
    pub records_extracted: AtomicUsize,
}

impl PipelineDiagnostics {
    pub fn reset(&self) {
        self.audio_files_read.store(0, Ordering::Relaxed);
        self.audio_files_skipped.store(0, Ordering::Relaxed);
        self.records_assembled.store(0, Ordering::Relaxed);
        self.records_verified.store(0, Ordering::Relaxed);
        self.records_extracted.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            audio_files_read: self.audio_files_read.load(Ordering::Relaxed),
            audio_files_skipped: self.audio_files_skipped.load(Ordering::Relaxed),
            records_assembled: self.records_assembled.load(Ordering::Relaxed),
            records_verified: self.records_verified.load(Ordering::Relaxed),
            records_extracted: self.records_extracted.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub audio_files_read: usize,
    pub audio_files_skipped: usize,
    pub records_assembled: usize,
    pub records_verified: usize,
    pub records_extracted: usize,
}

/// Which stages a run performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Workflow {
    pub assemble: bool,
    pub extract: bool,
    pub verify: bool,
}

impl Default for Workflow {
    fn default() -> Self {
        Self {
            assemble: true,
            extract: true,
            verify: false,
        }
    }
}

/// Inputs of one split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitSource {
    pub split: Split,
    pub annotations: PathBuf,
    pub audio_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub workflow: Workflow,
    pub sources: Vec<SplitSource>,
    pub audio_file_column: String,
    pub captions_fields_prefix: String,
    pub caption_options: CaptionOptions,
    pub words_vocabulary_file_name: String,
    pub characters_vocabulary_file_name: String,
    pub feature: FeatureRef,
    pub feature_kwargs: Map<String, Value>,
    pub nb_workers: usize,
}

/// `<root>/<dir>` or `<root>/<dir>_<version>`.
pub fn versioned_dir(root: &Path, dir: &str, version: &str) -> PathBuf {
    if version.is_empty() {
        root.join(dir)
    } else {
        root.join(format!("{dir}_{version}"))
    }
}

/// Outcome of one split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitReport {
    pub split: Split,
    /// Furthest stage reached in this run.
    pub stage: SplitStage,
    pub assembled: Option<usize>,
    pub verified: Option<usize>,
    pub extracted: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub splits: Vec<SplitReport>,
    pub diagnostics: DiagnosticsSnapshot,
}

/// Drives the workflow over every configured split.
pub struct SplitCoordinator {
    config: CoordinatorConfig,
    reader: Arc<dyn AudioReader>,
    raw_store: Arc<dyn RecordStore>,
    feature_store: Arc<dyn RecordStore>,
    registry: FeatureRegistry,
    diagnostics: Arc<PipelineDiagnostics>,
}

impl SplitCoordinator {
    pub fn new(
        config: CoordinatorConfig,
        reader: Arc<dyn AudioReader>,
        raw_store: Arc<dyn RecordStore>,
        feature_store: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            config,
            reader,
            raw_store,
            feature_store,
            registry: FeatureRegistry::with_builtins(),
            diagnostics: Arc::new(PipelineDiagnostics::default()),
        }
    }

    /// Coordinator over WAV inputs and file-system stores laid out as the
    /// settings describe.
    pub fn from_settings(dataset: &DatasetSettings, features: &FeatureSettings) -> Self {
        let root = &dataset.directories.root_dir;
        let output = &dataset.output_files;
        let prefix = output.file_name_prefix.clone();

        let raw_store = FsRecordStore::new(
            versioned_dir(root, &output.dir_output, &output.version),
            output.dir_data_development.clone(),
            output.dir_data_evaluation.clone(),
            prefix.clone(),
        );
        let feature_store = FsRecordStore::new(
            versioned_dir(root, &features.output.dir_output, &output.version),
            features.output.dir_development.clone(),
            features.output.dir_evaluation.clone(),
            prefix,
        );

        let config = CoordinatorConfig {
            workflow: Workflow {
                assemble: dataset.workflow.create_dataset,
                extract: dataset.workflow.extract_features,
                verify: dataset.workflow.validate_dataset,
            },
            sources: Split::ALL
                .iter()
                .map(|&split| SplitSource {
                    split,
                    annotations: dataset.annotations_file(split),
                    audio_dir: dataset.audio_dir(split),
                })
                .collect(),
            audio_file_column: dataset.annotations.audio_file_column.clone(),
            captions_fields_prefix: dataset.annotations.captions_fields_prefix.clone(),
            caption_options: dataset.caption_options(),
            words_vocabulary_file_name: output.words_vocabulary_file_name.clone(),
            characters_vocabulary_file_name: output.characters_vocabulary_file_name.clone(),
            feature: features.feature_ref(),
            feature_kwargs: features.process.clone(),
            nb_workers: dataset.nb_workers,
        };

        Self::new(
            config,
            Arc::new(WavReader::new(dataset.audio.sr, dataset.audio.to_mono)),
            Arc::new(raw_store),
            Arc::new(feature_store),
        )
    }

    /// Replace the registry used to resolve the feature function.
    pub fn with_registry(mut self, registry: FeatureRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn diagnostics(&self) -> Arc<PipelineDiagnostics> {
        Arc::clone(&self.diagnostics)
    }

    pub fn raw_store(&self) -> &dyn RecordStore {
        self.raw_store.as_ref()
    }

    pub fn feature_store(&self) -> &dyn RecordStore {
        self.feature_store.as_ref()
    }

    /// Run the configured workflow over every split.
    ///
    /// # Errors
    /// The first error of any stage; later splits are not processed.
    pub fn run(&self) -> Result<RunReport> {
        let workflow = self.config.workflow;
        info!(
            assemble = workflow.assemble,
            verify = workflow.verify,
            extract = workflow.extract,
            splits = self.config.sources.len(),
            "run started"
        );

        let extractor = if workflow.extract {
            Some(
                self.registry
                    .resolve(&self.config.feature, &self.config.feature_kwargs)?,
            )
        } else {
            None
        };

        let mut tables = BTreeMap::new();
        if workflow.assemble || workflow.verify {
            for source in &self.config.sources {
                let table = CaptionTable::read_csv(
                    &source.annotations,
                    &self.config.audio_file_column,
                    &self.config.captions_fields_prefix,
                )?;
                tables.insert(source.split, table);
            }
        }

        let mut vocabularies = BTreeMap::new();
        if workflow.assemble {
            for (split, table) in &tables {
                vocabularies.insert(
                    *split,
                    SplitVocabularies::build(*split, table, &self.config.caption_options)?,
                );
            }
        } else if workflow.extract || workflow.verify {
            for source in &self.config.sources {
                if !self.raw_store.stage(source.split)?.has_raw_records() {
                    return Err(ClothoError::SplitNotFound {
                        split: source.split,
                        path: self.raw_store.location(source.split),
                    });
                }
            }
        }

        let mut splits = Vec::with_capacity(self.config.sources.len());
        for source in &self.config.sources {
            let span = info_span!("split", split = %source.split);
            let _entered = span.enter();
            splits.push(self.run_split(
                source,
                tables.get(&source.split),
                vocabularies.get(&source.split),
                extractor.as_ref(),
            )?);
        }

        let report = RunReport {
            splits,
            diagnostics: self.diagnostics.snapshot(),
        };
        info!(diagnostics = ?report.diagnostics, "run finished");
        Ok(report)
    }

    fn run_split(
        &self,
        source: &SplitSource,
        table: Option<&CaptionTable>,
        vocabularies: Option<&SplitVocabularies>,
        extractor: Option<&FeatureExtractor>,
    ) -> Result<SplitReport> {
        let split = source.split;
        let mut report = SplitReport {
            split,
            stage: self.raw_store.stage(split)?,
            assembled: None,
            verified: None,
            extracted: None,
        };

        let mut assembled = None;
        if let (Some(table), Some(vocabularies)) = (table, vocabularies) {
            let result = RecordAssembler {
                reader: self.reader.as_ref(),
                store: self.raw_store.as_ref(),
                options: self.config.caption_options,
                words_vocabulary_file_name: &self.config.words_vocabulary_file_name,
                characters_vocabulary_file_name: &self.config.characters_vocabulary_file_name,
                nb_workers: self.config.nb_workers,
                diagnostics: &self.diagnostics,
            }
            .assemble(split, &source.audio_dir, table, vocabularies)?;
            report.stage = SplitStage::Assembled;
            report.assembled = Some(result.len());
            assembled = Some(result);
        }

        if self.config.workflow.verify {
            if let Some(table) = table {
                let checked = DatasetVerifier {
                    reader: self.reader.as_ref(),
                    store: self.raw_store.as_ref(),
                    options: self.config.caption_options,
                    words_vocabulary_file_name: &self.config.words_vocabulary_file_name,
                    characters_vocabulary_file_name: &self.config.characters_vocabulary_file_name,
                    nb_workers: self.config.nb_workers,
                    diagnostics: &self.diagnostics,
                }
                .verify(split, &source.audio_dir, table)?;
                report.verified = Some(checked);
            }
        }

        if let Some(extractor) = extractor {
            let orchestrator = FeatureOrchestrator {
                extractor,
                source: self.raw_store.as_ref(),
                target: self.feature_store.as_ref(),
                nb_workers: self.config.nb_workers,
                diagnostics: &self.diagnostics,
            };
            let count = match &assembled {
                Some(assembled) => orchestrator.extract_assembled(assembled)?,
                None => orchestrator.extract_split(split)?,
            };
            self.copy_vocabularies(split)?;
            report.stage = SplitStage::FeatureExtracted;
            report.extracted = Some(count);
        }

        Ok(report)
    }

    /// Feature splits carry the vocabularies their indices refer to.
    fn copy_vocabularies(&self, split: Split) -> Result<()> {
        for name in [
            &self.config.words_vocabulary_file_name,
            &self.config.characters_vocabulary_file_name,
        ] {
            let vocabulary = self.raw_store.read_vocabulary(split, name)?;
            self.feature_store.write_vocabulary(split, name, &vocabulary)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for SplitCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SplitCoordinator")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
