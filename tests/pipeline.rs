use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use assert_float_eq::assert_float_absolute_eq;

use ncaa_vaep::config::PipelineConfig;
use ncaa_vaep::features::feature_column_names;
use ncaa_vaep::frame::{Cell, Frame};
use ncaa_vaep::pipeline::{self, build_vaep_data, compute_player_rankings, load_xy};
use ncaa_vaep::store::{StoreTable, TableStore, game_key, store_path};
use ncaa_vaep::training::{BinaryClassifier, LabelColumn, ModelSet};

fn fixture(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    path
}

fn config(dir: &Path) -> PipelineConfig {
    PipelineConfig {
        data_folder: dir.join("vaep_data"),
        league_events_csv: fixture("league_events.csv"),
        team_events_csv: fixture("team_events.csv"),
        ..PipelineConfig::default()
    }
}

/// Scores are likely right after a shot and unlikely otherwise; conceding
/// is a flat rate.
struct ShotAware {
    label: LabelColumn,
}

impl BinaryClassifier for ShotAware {
    fn fit(&mut self, _x: &Frame, _y: &[bool]) -> Result<()> {
        Ok(())
    }

    fn predict_probability(&self, x: &Frame) -> Result<Vec<f64>> {
        let idx = x.column_index("actiontype_a0");
        Ok(x.rows
            .iter()
            .map(|row| {
                let is_shot = idx.and_then(|i| row[i].as_category()) == Some("shot");
                match (self.label, is_shot) {
                    (LabelColumn::Scores, true) => 0.9,
                    (LabelColumn::Scores, false) => 0.1,
                    (LabelColumn::Concedes, _) => 0.05,
                }
            })
            .collect())
    }
}

fn shot_aware_models() -> ModelSet<ShotAware> {
    let mut models = BTreeMap::new();
    for label in LabelColumn::ALL {
        models.insert(label, ShotAware { label });
    }
    ModelSet { models }
}

#[test]
fn three_event_match_credits_the_scorer() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let columns = feature_column_names(cfg.model_prev_actions);

    let report =
        compute_player_rankings(&cfg, &cfg.team_events_csv, &shot_aware_models(), &columns)
            .unwrap();

    let by_name = |name: &str| {
        report
            .rankings
            .iter()
            .find(|p| p.player_name == name)
            .cloned()
            .unwrap()
    };

    let striker = by_name("B. Striker");
    assert_eq!(striker.action_count, 1);
    assert!(striker.offensive_value > 0.0);
    // Previous action belongs to the opponent, so its concede probability
    // is the baseline: 0.9 - 0.05.
    assert_float_absolute_eq!(striker.offensive_value, 0.85, 1e-9);
    assert_float_absolute_eq!(striker.vaep_value, 0.9, 1e-9);
    assert_eq!(report.rankings[0].player_name, "B. Striker");

    // First action of the game is its own predecessor.
    let passer = by_name("A. Passer");
    assert_float_absolute_eq!(passer.vaep_value, 0.0, 1e-9);

    // Won duel in its own half: raw 0.05 plus the own-half bonus.
    let defender = by_name("O. Defender");
    assert_float_absolute_eq!(defender.defensive_value, 0.07, 1e-9);
    assert_eq!(report.audit.len(), 1);
    assert_eq!(report.audit[0].player_name, "O. Defender");
    assert_eq!(report.audit[0].type_name, "tackle");

    let csv_path = report.csv_path.unwrap();
    let text = fs::read_to_string(&csv_path).unwrap();
    assert!(text.starts_with("player_name,vaep_value,offensive_value,defensive_value,action_count"));
    assert_eq!(text.lines().count(), 4);
    assert!(report.workbook_path.unwrap().exists());
}

#[test]
fn ranking_requires_player_column() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let events = dir.path().join("no_player.csv");

    let mut reader = csv::Reader::from_path(fixture("team_events.csv")).unwrap();
    let headers = reader.headers().unwrap().clone();
    let keep: Vec<usize> = (0..headers.len()).filter(|i| &headers[*i] != "player").collect();
    let mut writer = csv::Writer::from_path(&events).unwrap();
    writer
        .write_record(keep.iter().map(|i| &headers[*i]))
        .unwrap();
    for record in reader.records() {
        let record = record.unwrap();
        writer.write_record(keep.iter().map(|i| &record[*i])).unwrap();
    }
    writer.flush().unwrap();

    let columns = feature_column_names(1);
    let err = compute_player_rankings(&cfg, &events, &shot_aware_models(), &columns).unwrap_err();
    assert!(format!("{err:#}").contains("missing column 'player'"));
}

#[test]
fn empty_team_file_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let events = dir.path().join("empty.csv");
    let header = fs::read_to_string(fixture("team_events.csv")).unwrap();
    fs::write(&events, format!("{}\n", header.lines().next().unwrap())).unwrap();

    let report =
        compute_player_rankings(&cfg, &events, &shot_aware_models(), &feature_column_names(1))
            .unwrap();
    assert!(report.rankings.is_empty());
    assert!(report.csv_path.is_none());
    assert!(!cfg.ranking_path().exists());
}

#[test]
fn build_stores_one_entry_per_game() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let store = TableStore::open(&store_path(&cfg.data_folder)).unwrap();

    let build = build_vaep_data(&cfg, &store, &cfg.league_events_csv).unwrap();
    assert_eq!(build.games, vec![601, 602]);
    assert_eq!(build.actions, 96);
    assert_eq!(store.game_ids(StoreTable::Features).unwrap(), vec![601, 602]);
    assert_eq!(store.game_ids(StoreTable::Labels).unwrap(), vec![601, 602]);

    let features = store
        .get(StoreTable::Features, &game_key(601))
        .unwrap()
        .unwrap();
    assert_eq!(features.n_rows(), 48);
    assert!(features.column_index("time_delta_2").is_some());

    let columns = feature_column_names(1);
    let (x, y) = load_xy(&store, &build.games, &columns).unwrap();
    assert_eq!(x.n_rows(), 96);
    assert_eq!(y.n_rows(), 96);
    assert_eq!(x.n_cols(), columns.len());

    // Any goal in the fixture labels at least its own row.
    let scores = y.numeric_column("scores").unwrap();
    assert!(scores.iter().any(|v| *v > 0.5));
}

#[test]
fn full_run_is_repeatable() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());

    let first = pipeline::run(&cfg).unwrap();
    assert_eq!(first.build.games.len(), 2);
    assert_eq!(first.predictions_saved, 2);
    assert_eq!(first.metrics.len(), 2);
    for metrics in first.metrics.values() {
        assert_eq!(metrics.samples, 96);
        assert!(metrics.brier >= 0.0 && metrics.brier <= 1.0);
    }
    let csv_first = fs::read(cfg.ranking_path()).unwrap();
    assert!(cfg.models_path().exists());

    let second = pipeline::run(&cfg).unwrap();
    assert!(second.cleaned.contains(&cfg.ranking_path()));
    let csv_second = fs::read(cfg.ranking_path()).unwrap();
    assert_eq!(csv_first, csv_second);

    let store = TableStore::open(&store_path(&cfg.data_folder)).unwrap();
    let preds = store
        .require(StoreTable::Predictions, &game_key(602))
        .unwrap();
    assert_eq!(preds.n_rows(), 48);
    for row in &preds.rows {
        for cell in row {
            let Cell::Num(p) = cell else {
                panic!("prediction cell {cell:?}");
            };
            assert!((0.0..=1.0).contains(p));
        }
    }
}

#[test]
fn missing_league_file_stops_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = PipelineConfig {
        league_events_csv: dir.path().join("absent.csv"),
        ..config(dir.path())
    };
    assert!(pipeline::run(&cfg).is_err());
}
