//! End-to-end integration tests: CSV -> fit -> save/load -> predict -> JSON.

use std::fs;
use std::path::Path;

use coppice_io::{ArtifactWriter, Evaluation, IoError, RunName, TableReader, TrainingSummary};
use coppice_tree::{ForestConfig, Model, Task, TreeConfig};
use tempfile::TempDir;

/// Path to the test fixture directory.
fn fixture_path(name: &str) -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn tree_round_trip() {
    // 1. Read CSV
    let table = TableReader::new(&fixture_path("weather.csv"))
        .read("play")
        .expect("fixture should parse");
    assert_eq!(table.n_rows(), 14);
    assert_eq!(table.task(), Task::Classification);

    // 2. Fit with cross-validated pruning
    let fit = TreeConfig::new()
        .with_min_split(2)
        .with_min_bucket(1)
        .with_folds(3)
        .with_seed(42)
        .fit(&table)
        .unwrap();

    // 3. Write tuning table, model and summary
    let dir = TempDir::new().unwrap();
    let writer = ArtifactWriter::new(dir.path(), RunName::new("weather_tree".into()).unwrap()).unwrap();
    let tuning_path = writer.write_tuning(&fit).unwrap();

    let model = Model::from(fit.into_tree());
    model.save(writer.model_path()).unwrap();
    let summary = TrainingSummary::describe(writer.run(), &model, table.n_rows());
    writer.write_summary(&summary).unwrap();

    // 4. Verify the tuning artifact
    let tuning = read_json(&tuning_path);
    assert_eq!(tuning["run"], "weather_tree");
    let rows = tuning["tuning"].as_array().unwrap();
    let candidates = tuning["candidates"].as_array().unwrap();
    assert_eq!(rows.len(), candidates.len());
    for row in rows {
        let estimate = row["estimate"].as_f64().unwrap();
        assert!((0.0..=1.0).contains(&estimate), "estimate {estimate} out of range");
        assert!(row["error"].as_f64().unwrap() >= 0.0);
    }
    let selected = tuning["selected_cutoff"].as_f64().unwrap();
    assert!(candidates.iter().any(|c| c.as_f64() == Some(selected)));

    // 5. Load the model and predict a file without the response column
    let loaded = Model::load(writer.model_path()).unwrap();
    let input = TableReader::new(&fixture_path("weather_new.csv"))
        .read_with_schema(loaded.schema())
        .unwrap();
    assert!(!input.has_response);
    let predictions = loaded.predict(&input.table).unwrap();
    let predict_path = writer.write_predictions(&loaded, &predictions, None).unwrap();

    let content = read_json(&predict_path);
    assert_eq!(content["model"], "tree");
    assert_eq!(content["n_rows"], 3);
    assert!(content["evaluation"].is_null());
    for entry in content["predictions"].as_array().unwrap() {
        let label = entry["prediction"].as_str().unwrap();
        assert!(label == "yes" || label == "no", "unexpected label {label}");
    }

    let summary = read_json(&dir.path().join("weather_tree_summary.json"));
    assert_eq!(summary["covariates"].as_array().unwrap().len(), 4);
    assert_eq!(summary["cutoff"].as_f64(), Some(selected));
}

#[test]
fn unpruned_tree_fits_training_data() {
    let table = TableReader::new(&fixture_path("weather.csv")).read("play").unwrap();
    let model = Model::from(
        TreeConfig::new()
            .with_min_split(2)
            .with_min_bucket(1)
            .grow(&table)
            .unwrap(),
    );
    let predictions = model.predict(&table).unwrap();
    let Evaluation::Classification { accuracy, confusion, .. } = Evaluation::score(&table, &predictions).unwrap()
    else {
        panic!("weather play is categorical");
    };
    assert!((accuracy - 1.0).abs() < f64::EPSILON);
    let rows = confusion.as_rows();
    // "no" is seen first, so it is level 0.
    assert_eq!(rows[0][0], 5);
    assert_eq!(rows[1][1], 9);
}

#[test]
fn forest_round_trip_on_numeric_response() {
    let table = TableReader::new(&fixture_path("weather.csv"))
        .read("humidity")
        .unwrap();
    assert_eq!(table.task(), Task::Regression);

    let forest = ForestConfig::new(20).unwrap().with_seed(7).fit(&table).unwrap();
    let dir = TempDir::new().unwrap();
    let writer = ArtifactWriter::new(dir.path(), RunName::new("humidity".into()).unwrap()).unwrap();
    let model = Model::from(forest);
    model.save(writer.model_path()).unwrap();
    let loaded = Model::load(writer.model_path()).unwrap();

    // The training file carries the response, so predictions can be scored.
    let input = TableReader::new(&fixture_path("weather.csv"))
        .read_with_schema(loaded.schema())
        .unwrap();
    assert!(input.has_response);
    let predictions = loaded.predict(&input.table).unwrap();
    assert_eq!(predictions, model.predict(&table).unwrap());

    let evaluation = Evaluation::score(&input.table, &predictions).unwrap();
    let summary = TrainingSummary::describe(writer.run(), &loaded, table.n_rows()).with_training(evaluation);
    let content = read_json(&writer.write_summary(&summary).unwrap());
    assert_eq!(content["kind"], "forest");
    assert_eq!(content["n_trees"], 20);
    assert_eq!(content["training"]["task"], "regression");
    let mse = content["training"]["mse"].as_f64().unwrap();
    assert!(mse.is_finite() && mse >= 0.0);
}

#[test]
fn reader_fixture_files_match_expected_errors() {
    let result = TableReader::new(&fixture_path("empty.csv")).read("play");
    assert!(
        matches!(result, Err(IoError::EmptyDataset { .. })),
        "empty.csv should give EmptyDataset, got: {result:?}"
    );

    let result = TableReader::new(&fixture_path("jagged.csv")).read("play");
    assert!(
        matches!(result, Err(IoError::InconsistentRowLength { .. })),
        "jagged.csv should give InconsistentRowLength, got: {result:?}"
    );

    let result = TableReader::new(&fixture_path("missing_value.csv")).read("play");
    assert!(
        matches!(result, Err(IoError::MissingValue { .. })),
        "missing_value.csv should give MissingValue, got: {result:?}"
    );

    // An unclosed quote swallows the rest of the file into one field.
    let result = TableReader::new(&fixture_path("malformed.csv")).read("play");
    assert!(
        matches!(result, Err(IoError::InconsistentRowLength { .. })),
        "malformed.csv should give InconsistentRowLength, got: {result:?}"
    );

    let schema = TableReader::new(&fixture_path("weather.csv"))
        .read("play")
        .unwrap()
        .schema();
    let result = TableReader::new(&fixture_path("unknown_level.csv")).read_with_schema(&schema);
    assert!(
        matches!(result, Err(IoError::UnknownLevel { .. })),
        "unknown_level.csv should give UnknownLevel, got: {result:?}"
    );
}
