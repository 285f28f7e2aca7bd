use std::path::PathBuf;

/// Errors from table validation, tree/forest configuration, and model persistence.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// Returned when min_split is zero.
    #[error("min_split must be at least 1, got {min_split}")]
    InvalidMinSplit {
        /// The invalid min_split value provided.
        min_split: usize,
    },

    /// Returned when min_bucket is zero or not smaller than min_split.
    #[error("min_bucket must be in [1, min_split), got min_bucket {min_bucket} with min_split {min_split}")]
    InvalidMinBucket {
        /// The invalid min_bucket value provided.
        min_bucket: usize,
        /// The configured min_split.
        min_split: usize,
    },

    /// Returned when max_depth is `Some(0)`.
    #[error("max_depth must be at least 1, got {max_depth}")]
    InvalidMaxDepth {
        /// The invalid max_depth value provided.
        max_depth: usize,
    },

    /// Returned when the fold count is 1 (0 disables cross-validation).
    #[error("folds must be 0 (disabled) or at least 2, got {folds}")]
    InvalidFoldCount {
        /// The invalid fold count.
        folds: usize,
    },

    /// Returned when there are fewer rows than folds.
    #[error("cannot split {n_rows} rows into {folds} folds")]
    TooFewRowsForFolds {
        /// Number of rows in the table.
        n_rows: usize,
        /// The requested number of folds.
        folds: usize,
    },

    /// Returned when n_trees is zero.
    #[error("n_trees must be at least 1, got {n_trees}")]
    InvalidTreeCount {
        /// The invalid n_trees value provided.
        n_trees: usize,
    },

    /// Returned when the covariate sample size resolves to zero.
    #[error("max_covariates resolved to 0 for {n_covariates} covariates")]
    InvalidMaxCovariates {
        /// Number of covariates in the table.
        n_covariates: usize,
    },

    /// Returned when a user-supplied prior is malformed.
    #[error("invalid prior: {reason}")]
    InvalidPrior {
        /// Human-readable description of what is wrong.
        reason: String,
    },

    /// Returned when a risk function cannot score the response type.
    #[error("risk function '{risk}' does not support {task} responses")]
    RiskTaskMismatch {
        /// Name of the risk function.
        risk: String,
        /// The task derived from the response column.
        task: crate::table::Task,
    },

    /// Returned when the pruning risk of a single tree cannot score one node.
    #[error("risk function '{risk}' cannot score single nodes and cannot be used for pruning")]
    UnscoredPruneRisk {
        /// Name of the rejected risk function.
        risk: String,
    },

    /// Returned when a table has no columns at all.
    #[error("table has no columns")]
    NoColumns,

    /// Returned when a table has zero rows.
    #[error("table has zero rows")]
    EmptyTable,

    /// Returned when a table has a response but no covariates.
    #[error("table has no covariate columns")]
    NoCovariates,

    /// Returned when columns have different row counts.
    #[error("column '{column}' has {got} rows, expected {expected}")]
    ColumnLengthMismatch {
        /// Name of the offending column.
        column: String,
        /// Row count of the first column.
        expected: usize,
        /// Row count of the offending column.
        got: usize,
    },

    /// Returned when a categorical code does not index into the column's levels.
    #[error("column '{column}' row {row}: level code {code} out of range for {n_levels} levels")]
    LevelCodeOutOfRange {
        /// Name of the offending column.
        column: String,
        /// Zero-based row index.
        row: usize,
        /// The out-of-range code.
        code: usize,
        /// Number of declared levels.
        n_levels: usize,
    },

    /// Returned when a categorical column declares no levels or repeats one.
    #[error("column '{column}' has invalid levels: {reason}")]
    InvalidLevels {
        /// Name of the offending column.
        column: String,
        /// Human-readable description of what is wrong.
        reason: String,
    },

    /// Returned when a numeric value is NaN or infinite.
    #[error("non-finite value in column '{column}' at row {row}")]
    NonFiniteValue {
        /// Name of the offending column.
        column: String,
        /// Zero-based row index.
        row: usize,
    },

    /// Returned when a categorical covariate has too many levels to enumerate subsets.
    #[error("covariate '{column}' has {n_levels} levels, at most {max} are supported")]
    TooManyLevels {
        /// Name of the offending column.
        column: String,
        /// Number of declared levels.
        n_levels: usize,
        /// The supported maximum.
        max: usize,
    },

    /// Returned when a prediction table does not match the training schema.
    #[error("prediction table does not match training schema: {reason}")]
    SchemaMismatch {
        /// Human-readable description of the mismatch.
        reason: String,
    },

    /// Returned when truth and prediction slices differ in length.
    #[error("{truth} true labels but {predicted} predictions")]
    LabelCountMismatch {
        /// Number of true labels.
        truth: usize,
        /// Number of predictions.
        predicted: usize,
    },

    /// Returned when a class code is not below the class count.
    #[error("class code {class} out of range for {n_classes} classes")]
    ClassOutOfRange {
        /// The offending class code.
        class: usize,
        /// Number of classes.
        n_classes: usize,
    },

    /// Returned when model serialization fails.
    #[error("failed to serialize model")]
    SerializeModel {
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when model deserialization fails.
    #[error("failed to deserialize model from {path}")]
    DeserializeModel {
        /// Path to the model file that could not be deserialized.
        path: PathBuf,
        /// The underlying bincode error.
        source: Box<bincode::ErrorKind>,
    },

    /// Returned when writing the model file fails.
    #[error("failed to write model to {path}")]
    WriteModel {
        /// Path to the file that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when reading the model file fails.
    #[error("failed to read model from {path}")]
    ReadModel {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when loading a model with an incompatible format version or kind.
    #[error("incompatible model in {path}: expected {expected}, found {found}")]
    IncompatibleModel {
        /// What this build expects.
        expected: String,
        /// What the file contains.
        found: String,
        /// Path to the offending model file.
        path: PathBuf,
    },
}
