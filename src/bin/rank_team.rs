use std::path::PathBuf;

use anyhow::{Context, Result};

use ncaa_vaep::config::PipelineConfig;
use ncaa_vaep::export::{format_audit_line, format_ranking_line};
use ncaa_vaep::features::feature_column_names;
use ncaa_vaep::gbt::GradientBoostedTrees;
use ncaa_vaep::pipeline::compute_player_rankings;
use ncaa_vaep::training::load_models;

/// Re-rank a team event file with the models saved by the last full run.
fn main() -> Result<()> {
    ncaa_vaep::load_dotenv();
    ncaa_vaep::init_tracing();

    let cfg = PipelineConfig::from_env();
    let events = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| cfg.team_events_csv.clone());

    let models_path = cfg.models_path();
    let models = load_models::<GradientBoostedTrees>(&models_path)
        .with_context(|| format!("no saved models; run the pipeline first ({})", models_path.display()))?;
    let columns = feature_column_names(cfg.model_prev_actions);

    let report = compute_player_rankings(&cfg, &events, &models, &columns)?;
    for entry in &report.audit {
        println!("{}", format_audit_line(entry));
    }
    for player in &report.rankings {
        println!("{}", format_ranking_line(player));
    }
    Ok(())
}
