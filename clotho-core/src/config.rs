//! JSON settings files for dataset creation and feature extraction.
//!
//! Every section is `#[serde(default)]`, so a settings file only needs the
//! keys it changes. `normalize()` trims names and clamps numeric values
//! after loading.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::captions::CaptionOptions;
use crate::error::{ClothoError, Result};
use crate::features::FeatureRef;
use crate::record::Split;

pub const MAX_WORKERS: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowSettings {
    pub create_dataset: bool,
    pub extract_features: bool,
    pub validate_dataset: bool,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            create_dataset: true,
            extract_features: true,
            validate_dataset: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectorySettings {
    pub root_dir: PathBuf,
    pub annotations_dir: String,
    pub downloaded_audio_dir: String,
    pub downloaded_audio_development: String,
    pub downloaded_audio_evaluation: String,
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("data"),
            annotations_dir: "clotho_csv_files".into(),
            downloaded_audio_dir: "clotho_audio_files".into(),
            downloaded_audio_development: "development".into(),
            downloaded_audio_evaluation: "evaluation".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationSettings {
    pub development_file: String,
    pub evaluation_file: String,
    pub audio_file_column: String,
    pub captions_fields_prefix: String,
    pub keep_case: bool,
    pub remove_punctuation_words: bool,
    pub remove_punctuation_chars: bool,
    pub use_unique_words_per_caption: bool,
}

impl Default for AnnotationSettings {
    fn default() -> Self {
        Self {
            development_file: "clotho_captions_development.csv".into(),
            evaluation_file: "clotho_captions_evaluation.csv".into(),
            audio_file_column: "file_name".into(),
            captions_fields_prefix: "caption_".into(),
            keep_case: false,
            remove_punctuation_words: true,
            remove_punctuation_chars: true,
            use_unique_words_per_caption: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    pub sr: u32,
    pub to_mono: bool,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sr: 44_100,
            to_mono: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputFileSettings {
    pub dir_output: String,
    pub dir_data_development: String,
    pub dir_data_evaluation: String,
    pub file_name_prefix: String,
    /// Appended to output directory names as `_<version>` when not empty.
    pub version: String,
    pub words_vocabulary_file_name: String,
    pub characters_vocabulary_file_name: String,
}

impl Default for OutputFileSettings {
    fn default() -> Self {
        Self {
            dir_output: "data_splits".into(),
            dir_data_development: "development".into(),
            dir_data_evaluation: "evaluation".into(),
            file_name_prefix: "clotho_file_".into(),
            version: String::new(),
            words_vocabulary_file_name: "words_vocabulary.json".into(),
            characters_vocabulary_file_name: "characters_vocabulary.json".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetSettings {
    pub workflow: WorkflowSettings,
    pub directories: DirectorySettings,
    pub annotations: AnnotationSettings,
    pub audio: AudioSettings,
    pub output_files: OutputFileSettings,
    pub nb_workers: usize,
}

impl Default for DatasetSettings {
    fn default() -> Self {
        Self {
            workflow: WorkflowSettings::default(),
            directories: DirectorySettings::default(),
            annotations: AnnotationSettings::default(),
            audio: AudioSettings::default(),
            output_files: OutputFileSettings::default(),
            nb_workers: 1,
        }
    }
}

impl DatasetSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let mut settings: Self = load_json(path)?;
        settings.normalize();
        Ok(settings)
    }

    pub fn normalize(&mut self) {
        let defaults = Self::default();
        normalize_name(
            &mut self.annotations.audio_file_column,
            &defaults.annotations.audio_file_column,
        );
        normalize_name(
            &mut self.annotations.captions_fields_prefix,
            &defaults.annotations.captions_fields_prefix,
        );
        normalize_name(&mut self.output_files.dir_output, &defaults.output_files.dir_output);
        normalize_name(
            &mut self.output_files.dir_data_development,
            &defaults.output_files.dir_data_development,
        );
        normalize_name(
            &mut self.output_files.dir_data_evaluation,
            &defaults.output_files.dir_data_evaluation,
        );
        normalize_name(
            &mut self.output_files.words_vocabulary_file_name,
            &defaults.output_files.words_vocabulary_file_name,
        );
        normalize_name(
            &mut self.output_files.characters_vocabulary_file_name,
            &defaults.output_files.characters_vocabulary_file_name,
        );
        self.output_files.file_name_prefix = self.output_files.file_name_prefix.trim().to_string();
        self.output_files.version = self.output_files.version.trim().to_string();
        if self.audio.sr == 0 {
            self.audio.sr = defaults.audio.sr;
        }
        self.nb_workers = self.nb_workers.clamp(1, MAX_WORKERS);
    }

    pub fn caption_options(&self) -> CaptionOptions {
        CaptionOptions {
            keep_case: self.annotations.keep_case,
            remove_punctuation_words: self.annotations.remove_punctuation_words,
            remove_punctuation_chars: self.annotations.remove_punctuation_chars,
            use_unique_words_per_caption: self.annotations.use_unique_words_per_caption,
        }
    }

    pub fn annotations_file(&self, split: Split) -> PathBuf {
        let file = match split {
            Split::Development => &self.annotations.development_file,
            Split::Evaluation => &self.annotations.evaluation_file,
        };
        self.directories
            .root_dir
            .join(&self.directories.annotations_dir)
            .join(file)
    }

    pub fn audio_dir(&self, split: Split) -> PathBuf {
        let dir = match split {
            Split::Development => &self.directories.downloaded_audio_development,
            Split::Evaluation => &self.directories.downloaded_audio_evaluation,
        };
        self.directories
            .root_dir
            .join(&self.directories.downloaded_audio_dir)
            .join(dir)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureOutputSettings {
    pub dir_output: String,
    pub dir_development: String,
    pub dir_evaluation: String,
}

impl Default for FeatureOutputSettings {
    fn default() -> Self {
        Self {
            dir_output: "data_splits_features".into(),
            dir_development: "development".into(),
            dir_evaluation: "evaluation".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureSettings {
    pub package: String,
    pub callable: String,
    /// Keyword arguments passed to the feature function.
    pub process: Map<String, Value>,
    pub output: FeatureOutputSettings,
}

impl Default for FeatureSettings {
    fn default() -> Self {
        let process = json!({
            "sr": 44100,
            "nb_fft": 1024,
            "hop_size": 512,
            "nb_mels": 64,
            "window_function": "hann",
            "center": true,
            "f_min": 0.0,
            "f_max": null,
            "htk": false,
            "power": 1.0,
            "norm": true
        });
        Self {
            package: "features".into(),
            callable: "log_mel_bands".into(),
            process: process.as_object().cloned().unwrap_or_default(),
            output: FeatureOutputSettings::default(),
        }
    }
}

impl FeatureSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let mut settings: Self = load_json(path)?;
        settings.normalize();
        Ok(settings)
    }

    pub fn normalize(&mut self) {
        let defaults = Self::default();
        self.package = self.package.trim().to_string();
        self.callable = self.callable.trim().to_string();
        normalize_name(&mut self.output.dir_output, &defaults.output.dir_output);
        normalize_name(&mut self.output.dir_development, &defaults.output.dir_development);
        normalize_name(&mut self.output.dir_evaluation, &defaults.output.dir_evaluation);
    }

    pub fn feature_ref(&self) -> FeatureRef {
        FeatureRef::new(self.package.clone(), self.callable.clone())
    }
}

fn normalize_name(value: &mut String, default: &str) {
    let trimmed = value.trim();
    *value = if trimmed.is_empty() {
        default.to_string()
    } else {
        trimmed.to_string()
    };
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).map_err(|e| {
        ClothoError::Config(format!("cannot read settings file {}: {e}", path.display()))
    })?;
    serde_json::from_str(&raw)
        .map_err(|e| ClothoError::Config(format!("settings file {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.json");
        std::fs::write(
            &path,
            r#"{ "workflow": { "extract_features": false }, "audio": { "sr": 16000 } }"#,
        )
        .unwrap();

        let settings = DatasetSettings::load(&path).unwrap();
        assert!(settings.workflow.create_dataset);
        assert!(!settings.workflow.extract_features);
        assert_eq!(settings.audio.sr, 16_000);
        assert!(settings.audio.to_mono);
        assert!(!settings.caption_options().use_unique_words_per_caption);
        assert_eq!(settings.output_files.file_name_prefix, "clotho_file_");
    }

    #[test]
    fn normalize_trims_and_clamps() {
        let mut settings = DatasetSettings {
            nb_workers: 10_000,
            ..DatasetSettings::default()
        };
        settings.output_files.dir_output = "   ".into();
        settings.output_files.version = " v2 ".into();
        settings.audio.sr = 0;
        settings.normalize();

        assert_eq!(settings.nb_workers, MAX_WORKERS);
        assert_eq!(settings.output_files.dir_output, "data_splits");
        assert_eq!(settings.output_files.version, "v2");
        assert_eq!(settings.audio.sr, 44_100);
    }

    #[test]
    fn split_paths_follow_directory_settings() {
        let settings = DatasetSettings::default();
        assert_eq!(
            settings.annotations_file(Split::Evaluation),
            Path::new("data/clotho_csv_files/clotho_captions_evaluation.csv")
        );
        assert_eq!(
            settings.audio_dir(Split::Development),
            Path::new("data/clotho_audio_files/development")
        );
    }

    #[test]
    fn feature_settings_default_to_log_mel_bands() {
        let settings = FeatureSettings::default();
        assert_eq!(settings.feature_ref().to_string(), "features::log_mel_bands");
        assert_eq!(settings.process["nb_mels"], 64);
    }

    #[test]
    fn invalid_json_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("features.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = FeatureSettings::load(&path).unwrap_err();
        assert!(matches!(err, ClothoError::Config(_)), "{err}");

        let err = FeatureSettings::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(err.to_string().contains("cannot read settings file"), "{err}");
    }
}
