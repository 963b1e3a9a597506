use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clotho_core::features::ParamSpec;
use clotho_core::pipeline::SplitSource;
use clotho_core::{
    CaptionOptions, ClothoError, CoordinatorConfig, DatasetSettings, FeatureFunction,
    FeatureRef, FeatureRegistry, FeatureSettings, FsRecordStore, RecordKey, RecordStore, Split,
    SplitCoordinator, SplitStage, Vocabulary, WavReader, Workflow,
};
use ndarray::Array2;
use serde_json::{json, Map, Value};
use tempfile::TempDir;

const SR: u32 = 16_000;
const FRAME: usize = 100;

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    /// Development: clip1 (2 captions), rain (1 caption + 1 empty cell),
    /// plus an uncaptioned `extra.wav`. Evaluation: wind (1 caption).
    fn new() -> Self {
        let fixture = Self {
            dir: tempfile::tempdir().unwrap(),
        };
        fixture.write_csv(
            Split::Development,
            "file_name,caption_1,caption_2\n\
             clip1.wav,a dog barks,a dog is barking\n\
             rain.wav,Rain falls on the roof.,\n",
        );
        fixture.write_csv(Split::Evaluation, "file_name,caption_1\nwind.wav,wind blows\n");
        fixture.write_wav(Split::Development, "clip1.wav", &tone(440.0, 3_200));
        fixture.write_wav(Split::Development, "rain.wav", &tone(1_000.0, 1_650));
        fixture.write_wav(Split::Development, "extra.wav", &tone(200.0, 800));
        fixture.write_wav(Split::Evaluation, "wind.wav", &tone(300.0, 2_000));
        fixture
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn annotations(&self, split: Split) -> PathBuf {
        self.root().join("csv").join(format!("{split}.csv"))
    }

    fn audio_dir(&self, split: Split) -> PathBuf {
        self.root().join("audio").join(split.as_str())
    }

    fn write_csv(&self, split: Split, content: &str) {
        let path = self.annotations(split);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn write_wav(&self, split: Split, name: &str, samples: &[i16]) {
        let dir = self.audio_dir(split);
        fs::create_dir_all(&dir).unwrap();
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: SR,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(dir.join(name), spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn raw_store(&self) -> FsRecordStore {
        FsRecordStore::new(self.root().join("out"), "dev", "eva", "clotho_file_")
    }

    fn feature_store(&self) -> FsRecordStore {
        FsRecordStore::new(self.root().join("features"), "dev", "eva", "clotho_file_")
    }

    fn config(&self, workflow: Workflow, feature: &str) -> CoordinatorConfig {
        CoordinatorConfig {
            workflow,
            sources: Split::ALL
                .iter()
                .map(|&split| SplitSource {
                    split,
                    annotations: self.annotations(split),
                    audio_dir: self.audio_dir(split),
                })
                .collect(),
            audio_file_column: "file_name".into(),
            captions_fields_prefix: "caption_".into(),
            caption_options: CaptionOptions::default(),
            words_vocabulary_file_name: "words_vocabulary.json".into(),
            characters_vocabulary_file_name: "characters_vocabulary.json".into(),
            feature: feature.parse().unwrap(),
            feature_kwargs: kwargs(json!({ "frame": FRAME })),
            nb_workers: 2,
        }
    }

    fn coordinator(&self, workflow: Workflow) -> SplitCoordinator {
        self.coordinator_for(workflow, "tests::frames64")
    }

    fn coordinator_for(&self, workflow: Workflow, feature: &str) -> SplitCoordinator {
        SplitCoordinator::new(
            self.config(workflow, feature),
            Arc::new(WavReader::new(SR, true)),
            Arc::new(self.raw_store()),
            Arc::new(self.feature_store()),
        )
        .with_registry(registry())
    }

    fn record_bytes(&self, store: &FsRecordStore, key: &RecordKey) -> Vec<u8> {
        fs::read(store.record_path(key)).unwrap()
    }
}

fn tone(freq: f32, len: usize) -> Vec<i16> {
    (0..len)
        .map(|i| {
            let t = i as f32 / SR as f32;
            (8_000.0 * (2.0 * std::f32::consts::PI * freq * t).sin()) as i16
        })
        .collect()
}

fn kwargs(v: Value) -> Map<String, Value> {
    v.as_object().cloned().unwrap()
}

/// 64 columns per frame of `frame` samples: frame mean plus a column ramp.
fn registry() -> FeatureRegistry {
    let mut registry = FeatureRegistry::with_builtins();
    registry.register(
        FeatureRef::new("tests", "frames64"),
        vec![ParamSpec::required("frame", clotho_core::features::ParamKind::Int)],
        |args| {
            let frame = args.usize("frame")?;
            let function: Arc<dyn FeatureFunction> =
                Arc::new(move |s: &[f32]| -> clotho_core::Result<Array2<f32>> {
                    let rows = (s.len() / frame).max(1);
                    Ok(Array2::from_shape_fn((rows, 64), |(r, c)| {
                        let chunk = &s[(r * frame).min(s.len())..((r + 1) * frame).min(s.len())];
                        let mean = chunk.iter().sum::<f32>() / chunk.len().max(1) as f32;
                        mean + c as f32 * 1e-3
                    }))
                });
            Ok(function)
        },
    );
    registry
}

fn assemble_only() -> Workflow {
    Workflow {
        assemble: true,
        extract: false,
        verify: false,
    }
}

fn extract_only() -> Workflow {
    Workflow {
        assemble: false,
        extract: true,
        verify: false,
    }
}

fn dev(audio_id: &str, ordinal: u32) -> RecordKey {
    RecordKey::new(Split::Development, audio_id, ordinal)
}

#[test]
fn clip_with_two_captions_yields_two_records() {
    let fx = Fixture::new();
    fx.coordinator(assemble_only()).run().unwrap();

    let store = fx.raw_store();
    let words = store
        .read_vocabulary(Split::Development, "words_vocabulary.json")
        .unwrap();
    let first = store.read(&dev("clip1", 1)).unwrap();
    let second = store.read(&dev("clip1", 2)).unwrap();

    assert_eq!(first.caption.tokens, vec!["a", "dog", "barks"]);
    assert_eq!(second.caption.tokens, vec!["a", "dog", "is", "barking"]);
    for record in [&first, &second] {
        assert_eq!(record.file_name, "clip1.wav");
        assert_eq!(record.word_indices.first(), Some(&words.sos()));
        assert_eq!(record.word_indices.last(), Some(&words.eos()));
    }
    assert_eq!(first.word_indices.len(), 5);
    assert_eq!(second.word_indices.len(), 6);
}

#[test]
fn record_count_matches_captions_minus_skipped_files() {
    let fx = Fixture::new();
    let report = fx.coordinator(assemble_only()).run().unwrap();

    let store = fx.raw_store();
    let dev_keys = store.list(Split::Development).unwrap();
    assert_eq!(dev_keys, vec![dev("clip1", 1), dev("clip1", 2), dev("rain", 1)]);
    assert_eq!(store.list(Split::Evaluation).unwrap().len(), 1);

    assert_eq!(report.splits[0].assembled, Some(3));
    assert_eq!(report.splits[1].assembled, Some(1));
    assert_eq!(report.diagnostics.audio_files_skipped, 1);
    assert_eq!(report.diagnostics.records_assembled, 4);
    assert_eq!(store.stage(Split::Development).unwrap(), SplitStage::Assembled);
}

#[test]
fn records_of_one_clip_carry_identical_audio() {
    let fx = Fixture::new();
    fx.coordinator(assemble_only()).run().unwrap();

    let store = fx.raw_store();
    let first = store.read(&dev("clip1", 1)).unwrap();
    let second = store.read(&dev("clip1", 2)).unwrap();
    let a = serde_json::to_vec(first.raw_audio().unwrap()).unwrap();
    let b = serde_json::to_vec(second.raw_audio().unwrap()).unwrap();
    assert_eq!(a, b);
    assert_eq!(first.raw_audio().unwrap().samples.len(), 3_200);
}

#[test]
fn vocabulary_is_reproducible() {
    let a = Fixture::new();
    let b = Fixture::new();
    a.coordinator(assemble_only()).run().unwrap();
    b.coordinator(assemble_only()).run().unwrap();

    for name in ["words_vocabulary.json", "characters_vocabulary.json"] {
        let path_a = a.raw_store().split_dir(Split::Development).join(name);
        let path_b = b.raw_store().split_dir(Split::Development).join(name);
        assert_eq!(fs::read(path_a).unwrap(), fs::read(path_b).unwrap());
    }

    let words = Vocabulary::load(
        &a.raw_store()
            .split_dir(Split::Development)
            .join("words_vocabulary.json"),
    )
    .unwrap();
    assert_eq!(&words.tokens()[..4], ["a", "dog", "barks", "is"]);
    assert_eq!(words.frequency("dog"), 2);
}

#[test]
fn feature_stage_replaces_audio_with_64_columns() {
    let fx = Fixture::new();
    let report = fx.coordinator(Workflow::default()).run().unwrap();

    let features = fx.feature_store();
    for key in [dev("clip1", 1), dev("clip1", 2)] {
        let record = features.read(&key).unwrap();
        assert!(record.raw_audio().is_none());
        assert_eq!(record.features().unwrap().dim(), (3_200 / FRAME, 64));
    }
    let raw = fx.raw_store().read(&dev("clip1", 1)).unwrap();
    let featured = features.read(&dev("clip1", 1)).unwrap();
    assert_eq!(raw.caption, featured.caption);
    assert_eq!(raw.word_indices, featured.word_indices);
    assert_eq!(raw.char_indices, featured.char_indices);

    let manifest = features.manifest(Split::Development).unwrap().unwrap();
    assert_eq!(manifest.stage, SplitStage::FeatureExtracted);
    assert_eq!(manifest.records, 3);
    assert_eq!(manifest.feature_columns, Some(64));
    assert!(features
        .read_vocabulary(Split::Evaluation, "words_vocabulary.json")
        .is_ok());
    assert!(report
        .splits
        .iter()
        .all(|s| s.stage == SplitStage::FeatureExtracted));
}

#[test]
fn repeated_extraction_is_bit_identical() {
    let fx = Fixture::new();
    fx.coordinator(Workflow::default()).run().unwrap();
    let key = dev("rain", 1);
    let first = fx.record_bytes(&fx.feature_store(), &key);

    fx.coordinator(extract_only()).run().unwrap();
    let second = fx.record_bytes(&fx.feature_store(), &key);
    assert_eq!(first, second);
}

#[test]
fn reassembling_a_smaller_split_drops_records_of_the_previous_run() {
    let fx = Fixture::new();
    fx.coordinator(Workflow::default()).run().unwrap();
    assert_eq!(fx.feature_store().list(Split::Development).unwrap().len(), 3);

    fx.write_csv(
        Split::Development,
        "file_name,caption_1,caption_2
clip1.wav,a dog barks,a dog is barking
",
    );
    fx.coordinator(assemble_only()).run().unwrap();

    let raw = fx.raw_store();
    let expected = vec![dev("clip1", 1), dev("clip1", 2)];
    assert_eq!(raw.list(Split::Development).unwrap(), expected);
    assert_eq!(raw.manifest(Split::Development).unwrap().unwrap().records, 2);

    let report = fx.coordinator(extract_only()).run().unwrap();
    assert_eq!(report.splits[0].extracted, Some(2));

    let features = fx.feature_store();
    assert_eq!(features.list(Split::Development).unwrap(), expected);
    assert_eq!(features.manifest(Split::Development).unwrap().unwrap().records, 2);

    let words = features
        .read_vocabulary(Split::Development, "words_vocabulary.json")
        .unwrap();
    for key in &expected {
        let record = features.read(key).unwrap();
        assert!(record.word_indices.iter().all(|&i| (i as usize) < words.size()));
    }
}

#[test]
fn extract_only_refuses_records_outside_the_manifest() {
    let fx = Fixture::new();
    fx.coordinator(assemble_only()).run().unwrap();
    let raw = fx.raw_store();
    let stray = raw.read(&dev("rain", 1)).unwrap();
    fs::copy(
        raw.record_path(&stray.key()),
        raw.record_path(&dev("rain", 2)),
    )
    .unwrap();

    let err = fx.coordinator(extract_only()).run().unwrap_err();
    assert!(
        matches!(
            err,
            ClothoError::SplitMismatch { split: Split::Development, listed: 4, committed: 3, .. }
        ),
        "{err}"
    );
}

#[test]
fn missing_audio_aborts_before_any_record() {
    let fx = Fixture::new();
    fs::remove_file(fx.audio_dir(Split::Development).join("rain.wav")).unwrap();

    let err = fx.coordinator(assemble_only()).run().unwrap_err();
    match err {
        ClothoError::MissingAudioFile { split, file_name } => {
            assert_eq!(split, Split::Development);
            assert_eq!(file_name, "rain.wav");
        }
        other => panic!("unexpected error: {other}"),
    }

    let store = fx.raw_store();
    assert!(store.list(Split::Development).unwrap().is_empty());
    assert_eq!(store.stage(Split::Development).unwrap(), SplitStage::NotAssembled);
}

#[test]
fn extracting_unassembled_split_is_split_not_found() {
    let fx = Fixture::new();
    let err = fx.coordinator(extract_only()).run().unwrap_err();
    assert!(
        matches!(err, ClothoError::SplitNotFound { split: Split::Development, .. }),
        "{err}"
    );
    assert!(!fx.root().join("features").exists());
}

#[test]
fn unknown_feature_function_fails_before_writing() {
    let fx = Fixture::new();
    let err = fx
        .coordinator_for(Workflow::default(), "tests::nope")
        .run()
        .unwrap_err();
    assert!(matches!(err, ClothoError::FeatureFunctionResolution { .. }), "{err}");
    assert!(!fx.root().join("out").exists());
}

#[test]
fn empty_annotations_fail_before_writing() {
    let fx = Fixture::new();
    fx.write_csv(Split::Evaluation, "file_name,caption_1\nwind.wav,...\n");
    let err = fx.coordinator(assemble_only()).run().unwrap_err();
    assert!(
        matches!(err, ClothoError::EmptyCaptionSet { split: Split::Evaluation }),
        "{err}"
    );
    assert!(!fx.root().join("out").exists());
}

#[test]
fn settings_driven_run_with_log_mel_bands_and_verification() {
    let fx = Fixture::new();
    let mut dataset = DatasetSettings::default();
    dataset.workflow.validate_dataset = true;
    dataset.directories.root_dir = fx.root().to_path_buf();
    dataset.directories.annotations_dir = "csv".into();
    dataset.directories.downloaded_audio_dir = "audio".into();
    dataset.annotations.development_file = "development.csv".into();
    dataset.annotations.evaluation_file = "evaluation.csv".into();
    dataset.audio.sr = SR;
    dataset.output_files.version = "v1".into();
    dataset.nb_workers = 3;

    let mut features = FeatureSettings::default();
    features.process = kwargs(json!({ "sr": SR, "nb_fft": 512, "hop_size": 256, "nb_mels": 40 }));

    let report = SplitCoordinator::from_settings(&dataset, &features)
        .run()
        .unwrap();
    assert_eq!(report.splits[0].verified, Some(3));
    assert_eq!(report.diagnostics.records_extracted, 4);

    let store = FsRecordStore::new(
        fx.root().join("data_splits_features_v1"),
        "development",
        "evaluation",
        "clotho_file_",
    );
    let record = store.read(&dev("clip1", 2)).unwrap();
    let matrix = record.features().unwrap();
    assert_eq!(matrix.ncols(), 40);
    assert_eq!(matrix.nrows(), 1 + 3_200 / 256);
    assert!(matrix.iter().all(|v| v.is_finite()));
}
