//! Optional YAML pipeline configuration.
//!
//! Every field has a default, so an empty file (or no file) is valid.
//! Relative paths are resolved against the directory of the file that
//! declared them. Command-line flags override what is loaded here.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};

use crate::{
    audit::{CurationPolicy, DEFAULT_SAMPLE_SIZE},
    columns::ColumnNormalizer,
    entity::Entity,
    io_utils,
    responses::{ResponseCategory, Vocabulary},
    upload::UploadOptions,
};

pub const DEFAULT_DATABASE: &str = "avaliacao.sqlite";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub database: Option<PathBuf>,
    pub inputs: Vec<PathBuf>,
    pub input_encoding: Option<String>,
    /// Extra header spellings, `variant: Canonical`.
    pub column_aliases: BTreeMap<String, String>,
    pub vocabulary: VocabularyConfig,
    pub curation: CurationConfig,
    pub audit: AuditConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VocabularyConfig {
    pub positive: Vec<String>,
    pub neutral: Vec<String>,
    pub negative: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CurationConfig {
    pub enabled: bool,
    pub entities: Vec<Entity>,
}

impl Default for CurationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            entities: CurationPolicy::default().entities,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditConfig {
    pub sample_size: usize,
    pub fail_on_orphans: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            sample_size: DEFAULT_SAMPLE_SIZE,
            fail_on_orphans: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadConfig {
    pub drop_duplicates: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            drop_duplicates: true,
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Opening configuration file {path:?}"))?;
        let mut config = Self::from_yaml_str(&raw)
            .with_context(|| format!("Parsing configuration file {path:?}"))?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        Ok(config)
    }

    /// Loads `path` when given, otherwise the defaults.
    pub fn load_optional(path: Option<&Path>) -> Result<Self> {
        path.map(Self::load).unwrap_or_else(|| Ok(Self::default()))
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).context("Deserializing pipeline configuration")
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Serializing pipeline configuration")
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        if let Some(database) = self.database.as_mut() {
            resolve(database);
        }
        self.inputs.iter_mut().for_each(resolve);
    }

    /// The flag wins over the file; the file wins over the default.
    pub fn database_path(&self, flag: Option<&Path>) -> PathBuf {
        flag.map(Path::to_path_buf)
            .or_else(|| self.database.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE))
    }

    pub fn input_paths(&self, flags: &[PathBuf]) -> Vec<PathBuf> {
        if flags.is_empty() {
            self.inputs.clone()
        } else {
            flags.to_vec()
        }
    }

    pub fn encoding(&self) -> Result<&'static Encoding> {
        Ok(io_utils::resolve_encoding(self.input_encoding.as_deref())?)
    }

    pub fn normalizer(&self) -> ColumnNormalizer {
        ColumnNormalizer::builtin().with_aliases(
            self.column_aliases
                .iter()
                .map(|(variant, canonical)| (variant.as_str(), canonical.clone())),
        )
    }

    pub fn vocabulary(&self) -> Vocabulary {
        Vocabulary::builtin()
            .with_terms(ResponseCategory::Positive, &self.vocabulary.positive)
            .with_terms(ResponseCategory::Neutral, &self.vocabulary.neutral)
            .with_terms(ResponseCategory::Negative, &self.vocabulary.negative)
    }

    /// `None` when curation is disabled.
    pub fn curation_policy(&self) -> Option<CurationPolicy> {
        self.curation.enabled.then(|| CurationPolicy {
            entities: self.curation.entities.clone(),
        })
    }

    pub fn upload_options(&self) -> UploadOptions {
        UploadOptions {
            drop_duplicates: self.upload.drop_duplicates,
        }
    }
}
