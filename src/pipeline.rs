use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::calibration::Metrics;
use crate::config::PipelineConfig;
use crate::events::{PLAYER_COLUMN, TRANSLATE_COLUMNS, read_events_csv};
use crate::export::{write_rankings_csv, write_rankings_workbook};
use crate::features::{FeatureSet, feature_column_names};
use crate::frame::Frame;
use crate::gbt::GradientBoostedTrees;
use crate::labels::compute_labels;
use crate::spadl::{NamedAction, split_games};
use crate::store::{StoreTable, TableStore, game_key, store_path};
use crate::training::{self, BinaryClassifier, LabelColumn, ModelSet, save_models};
use crate::translate::translate_all;
use crate::vaep::{AuditEntry, PlayerAggregate, aggregate_players, defensive_audit, value_actions};

pub const UNKNOWN_PLAYER: &str = "Unknown";
pub const AUDIT_SIZE: usize = 5;

/// Remove the store, models and ranking outputs of a previous run.
pub fn clean_artifacts(cfg: &PipelineConfig) -> Result<Vec<PathBuf>> {
    let store = store_path(&cfg.data_folder);
    let candidates = [
        store.with_extension("sqlite-wal"),
        store.with_extension("sqlite-shm"),
        store,
        cfg.models_path(),
        cfg.ranking_path(),
        cfg.ranking_workbook_path(),
    ];
    let mut removed = Vec::new();
    for path in candidates {
        if path.exists() {
            fs::remove_file(&path).with_context(|| format!("remove {}", path.display()))?;
            info!(path = %path.display(), "cleaned old file");
            removed.push(path);
        }
    }
    Ok(removed)
}

#[derive(Debug, Default, Clone)]
pub struct BuildReport {
    pub games: Vec<i64>,
    pub actions: usize,
}

/// Translate a league event file and store features and labels per game.
pub fn build_vaep_data(
    cfg: &PipelineConfig,
    store: &TableStore,
    events_csv: &Path,
) -> Result<BuildReport> {
    let events = read_events_csv(events_csv, &TRANSLATE_COLUMNS)?;
    if events.is_empty() {
        warn!(path = %events_csv.display(), "no events; nothing to build");
        return Ok(BuildReport::default());
    }
    let actions = translate_all(&events);
    let features = FeatureSet::standard(cfg.window_size);

    let mut report = BuildReport {
        games: Vec::new(),
        actions: actions.len(),
    };
    for game in split_games(&actions) {
        let game_id = game[0].game_id;
        let key = game_key(game_id);
        store.put(StoreTable::Features, &key, &features.compute(game))?;
        store.put(
            StoreTable::Labels,
            &key,
            &compute_labels(game, cfg.label_horizon),
        )?;
        report.games.push(game_id);
    }
    info!(
        games = report.games.len(),
        actions = report.actions,
        "stored features and labels"
    );
    Ok(report)
}

/// Stored features (restricted to `columns`) and labels for `game_ids`,
/// stacked in the given game order.
pub fn load_xy(store: &TableStore, game_ids: &[i64], columns: &[String]) -> Result<(Frame, Frame)> {
    let mut xs = Vec::with_capacity(game_ids.len());
    let mut ys = Vec::with_capacity(game_ids.len());
    for &game_id in game_ids {
        let key = game_key(game_id);
        let x = store.require(StoreTable::Features, &key)?.select(columns)?;
        let y = store.require(StoreTable::Labels, &key)?;
        xs.push(x);
        ys.push(y);
    }
    Ok((Frame::concat(xs)?, Frame::concat(ys)?))
}

pub fn train_models(
    cfg: &PipelineConfig,
    x: &Frame,
    y: &Frame,
) -> Result<ModelSet<GradientBoostedTrees>> {
    training::train_models(x, y, || GradientBoostedTrees::new(cfg.gbt))
}

/// Predict every game in the feature table into the predictions table.
pub fn save_predictions<M: BinaryClassifier>(
    store: &TableStore,
    models: &ModelSet<M>,
    columns: &[String],
) -> Result<usize> {
    let game_ids = store.game_ids(StoreTable::Features)?;
    for &game_id in &game_ids {
        let key = game_key(game_id);
        let x = store.require(StoreTable::Features, &key)?.select(columns)?;
        let preds = models.predict(&x)?;
        store.put(StoreTable::Predictions, &key, &preds)?;
    }
    info!(games = game_ids.len(), "saved predictions");
    Ok(game_ids.len())
}

#[derive(Debug, Default, Clone)]
pub struct RankingReport {
    pub rankings: Vec<PlayerAggregate>,
    pub audit: Vec<AuditEntry>,
    pub csv_path: Option<PathBuf>,
    pub workbook_path: Option<PathBuf>,
}

/// Value every action of a team event file with `models` and rank players.
pub fn compute_player_rankings<M: BinaryClassifier>(
    cfg: &PipelineConfig,
    events_csv: &Path,
    models: &ModelSet<M>,
    columns: &[String],
) -> Result<RankingReport> {
    let mut required = TRANSLATE_COLUMNS.to_vec();
    required.push(PLAYER_COLUMN);
    let events = read_events_csv(events_csv, &required)?;
    if events.is_empty() {
        warn!(path = %events_csv.display(), "no team events; no rankings written");
        return Ok(RankingReport::default());
    }

    let actions = translate_all(&events);
    let x = FeatureSet::standard(cfg.window_size)
        .compute(&actions)
        .select(columns)?;
    let preds = models.predict(&x)?;
    let values = value_actions(&actions, &preds)?;

    let named: Vec<NamedAction> = events
        .iter()
        .zip(actions)
        .map(|(e, action)| NamedAction {
            action,
            player_name: e.player_name().unwrap_or(UNKNOWN_PLAYER).to_string(),
        })
        .collect();

    let rankings = aggregate_players(&named, &values);
    let audit = defensive_audit(&named, &values, AUDIT_SIZE);

    let csv_path = cfg.ranking_path();
    write_rankings_csv(&rankings, &csv_path)?;
    let workbook_path = cfg.ranking_workbook_path();
    write_rankings_workbook(&rankings, &audit, &workbook_path)?;
    info!(players = rankings.len(), path = %csv_path.display(), "rankings saved");

    Ok(RankingReport {
        rankings,
        audit,
        csv_path: Some(csv_path),
        workbook_path: Some(workbook_path),
    })
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub cleaned: Vec<PathBuf>,
    pub build: BuildReport,
    pub metrics: BTreeMap<LabelColumn, Metrics>,
    pub predictions_saved: usize,
    pub ranking: RankingReport,
}

/// Clean, build, train on the league, evaluate, predict, rank the team.
pub fn run(cfg: &PipelineConfig) -> Result<RunReport> {
    let cleaned = clean_artifacts(cfg)?;

    info!("step 1: parsing league events and building feature stores");
    let store = TableStore::open(&store_path(&cfg.data_folder))?;
    let build = build_vaep_data(cfg, &store, &cfg.league_events_csv)?;
    if build.games.is_empty() {
        warn!("no league games stored; skipping training and rankings");
        return Ok(RunReport {
            cleaned,
            build,
            ..RunReport::default()
        });
    }

    let columns = feature_column_names(cfg.model_prev_actions);

    info!("step 2: training models on league data");
    let (x, y) = load_xy(&store, &build.games, &columns)?;
    let models = train_models(cfg, &x, &y)?;
    save_models(&models, &cfg.models_path())?;

    info!("step 3: evaluating models");
    let metrics = training::evaluate_models(&models, &x, &y)?;

    let predictions_saved = save_predictions(&store, &models, &columns)?;

    info!("step 4: ranking team players");
    let ranking = compute_player_rankings(cfg, &cfg.team_events_csv, &models, &columns)?;

    Ok(RunReport {
        cleaned,
        build,
        metrics,
        predictions_saved,
        ranking,
    })
}
