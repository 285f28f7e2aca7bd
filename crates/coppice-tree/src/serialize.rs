//! Model serialization and deserialization via bincode.

use std::path::Path;

use tracing::{debug, info, instrument};

use crate::error::TreeError;
use crate::forest::Forest;
use crate::node::Decision;
use crate::table::{Table, TableSchema};
use crate::tree::DecisionTree;

/// Current binary format version.
pub const FORMAT_VERSION: u32 = 1;

/// A fitted model of either kind.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Model {
    /// A single (possibly pruned) tree.
    Tree(DecisionTree),
    /// A bagged forest.
    Forest(Forest),
}

/// Versioned envelope for the serialized model.
#[derive(serde::Serialize, serde::Deserialize)]
struct ModelEnvelope {
    /// Format version for compatibility checking.
    format_version: u32,
    /// Total node count, for logging without walking the model.
    n_nodes: usize,
    model: Model,
}

impl Model {
    /// Return the schema of the training table.
    #[must_use]
    pub fn schema(&self) -> &TableSchema {
        match self {
            Model::Tree(tree) => tree.schema(),
            Model::Forest(forest) => forest.schema(),
        }
    }

    /// Return `"tree"` or `"forest"`.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Model::Tree(_) => "tree",
            Model::Forest(_) => "forest",
        }
    }

    fn n_nodes(&self) -> usize {
        match self {
            Model::Tree(tree) => tree.n_nodes(),
            Model::Forest(forest) => forest.n_nodes(),
        }
    }

    /// Predict every row of `table`.
    ///
    /// Trees honour their committed cutoff (full depth if none); forests vote.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::SchemaMismatch`] when the covariates differ from
    /// the training table.
    pub fn predict(&self, table: &Table) -> Result<Vec<Decision>, TreeError> {
        match self {
            Model::Tree(tree) => tree.predict(table, tree.committed_cutoff().unwrap_or(f64::NEG_INFINITY)),
            Model::Forest(forest) => forest.predict(table),
        }
    }

    /// Save the model to a binary file.
    ///
    /// Uses bincode encoding wrapped in a versioned envelope for
    /// forward-compatibility checking.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`TreeError::SerializeModel`] | bincode encoding failed |
    /// | [`TreeError::WriteModel`] | file write failed |
    #[instrument(skip_all, fields(path = %path.as_ref().display(), kind = self.kind()))]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), TreeError> {
        let path = path.as_ref();

        let envelope = ModelEnvelope {
            format_version: FORMAT_VERSION,
            n_nodes: self.n_nodes(),
            model: self.clone(),
        };

        let bytes = bincode::serialize(&envelope).map_err(|e| TreeError::SerializeModel { source: e })?;

        std::fs::write(path, &bytes).map_err(|e| TreeError::WriteModel {
            path: path.to_path_buf(),
            source: e,
        })?;

        info!(size_bytes = bytes.len(), n_nodes = envelope.n_nodes, "model saved");

        Ok(())
    }

    /// Load a model from a binary file.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`TreeError::ReadModel`] | file read failed |
    /// | [`TreeError::DeserializeModel`] | bincode decoding failed |
    /// | [`TreeError::IncompatibleModel`] | format version mismatch |
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TreeError> {
        let path = path.as_ref();

        let bytes = std::fs::read(path).map_err(|e| TreeError::ReadModel {
            path: path.to_path_buf(),
            source: e,
        })?;

        // The version is the envelope's first field, so it decodes even when
        // the rest of the layout has changed.
        let version: u32 = bincode::deserialize(&bytes).map_err(|e| TreeError::DeserializeModel {
            path: path.to_path_buf(),
            source: e,
        })?;
        if version != FORMAT_VERSION {
            return Err(TreeError::IncompatibleModel {
                expected: format!("format version {FORMAT_VERSION}"),
                found: format!("format version {version}"),
                path: path.to_path_buf(),
            });
        }

        let envelope: ModelEnvelope = bincode::deserialize(&bytes).map_err(|e| TreeError::DeserializeModel {
            path: path.to_path_buf(),
            source: e,
        })?;

        debug!(kind = envelope.model.kind(), n_nodes = envelope.n_nodes, "model loaded");

        Ok(envelope.model)
    }
}

impl From<DecisionTree> for Model {
    fn from(tree: DecisionTree) -> Self {
        Model::Tree(tree)
    }
}

impl From<Forest> for Model {
    fn from(forest: Forest) -> Self {
        Model::Forest(forest)
    }
}
