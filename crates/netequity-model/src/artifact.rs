//! Model artifact save/load via bincode.

use std::io::Write;
use std::path::Path;

use tracing::{debug, info, instrument};

use crate::error::ArtifactError;
use crate::schema::feature_names;
use crate::train::TrainedModel;

/// Current binary format version.
pub const FORMAT_VERSION: u32 = 1;

/// Versioned envelope for the serialized model.
#[derive(serde::Deserialize)]
struct ModelEnvelope {
    format_version: u32,
    feature_names: Vec<String>,
    model: TrainedModel,
}

/// Borrowing twin of [`ModelEnvelope`]; encodes to the same bytes.
#[derive(serde::Serialize)]
struct ModelEnvelopeRef<'a> {
    format_version: u32,
    feature_names: Vec<String>,
    model: &'a TrainedModel,
}

impl TrainedModel {
    /// Save the model to a binary file.
    ///
    /// The bytes go to a temporary file in the destination directory which
    /// is then renamed over `path`, so readers never see a partial artifact.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ArtifactError::Encode`] | bincode encoding failed |
    /// | [`ArtifactError::Write`] | temp file creation, write or rename failed |
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ArtifactError> {
        let path = path.as_ref();

        let envelope = ModelEnvelopeRef {
            format_version: FORMAT_VERSION,
            feature_names: feature_names(),
            model: self,
        };
        let bytes = bincode::serialize(&envelope).map_err(|e| ArtifactError::Encode { source: e })?;

        let write_err = |e: std::io::Error| ArtifactError::Write {
            path: path.to_path_buf(),
            source: e,
        };
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
        tmp.write_all(&bytes).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(path).map_err(|e| write_err(e.error))?;

        info!(
            size_bytes = bytes.len(),
            n_trees = self.forest.n_trees(),
            "model saved"
        );
        Ok(())
    }

    /// Load a model from a binary file.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ArtifactError::Read`] | file read failed |
    /// | [`ArtifactError::Decode`] | bincode decoding failed |
    /// | [`ArtifactError::IncompatibleVersion`] | format version mismatch |
    /// | [`ArtifactError::SchemaMismatch`] | feature names differ from this build's schema |
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let path = path.as_ref();

        let bytes = std::fs::read(path).map_err(|e| ArtifactError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;

        let envelope: ModelEnvelope =
            bincode::deserialize(&bytes).map_err(|e| ArtifactError::Decode {
                path: path.to_path_buf(),
                source: e,
            })?;

        if envelope.format_version != FORMAT_VERSION {
            return Err(ArtifactError::IncompatibleVersion {
                path: path.to_path_buf(),
                expected: FORMAT_VERSION,
                found: envelope.format_version,
            });
        }
        if envelope.feature_names != feature_names()
            || envelope.model.forest.feature_names() != feature_names().as_slice()
        {
            return Err(ArtifactError::SchemaMismatch {
                path: path.to_path_buf(),
                found: envelope.feature_names,
            });
        }

        debug!(
            n_trees = envelope.model.forest.n_trees(),
            r2 = envelope.model.evaluation.r2,
            "model loaded"
        );
        Ok(envelope.model)
    }
}
