use anyhow::Result;

use ncaa_vaep::config::PipelineConfig;
use ncaa_vaep::export::{format_audit_line, format_ranking_line};
use ncaa_vaep::pipeline;
use ncaa_vaep::training::format_metrics;

const TOP_PLAYERS: usize = 15;

fn main() -> Result<()> {
    ncaa_vaep::load_dotenv();
    ncaa_vaep::init_tracing();

    let cfg = PipelineConfig::from_env();
    let report = pipeline::run(&cfg)?;

    if report.build.games.is_empty() {
        println!(
            "No league games found in {}; nothing to rank.",
            cfg.league_events_csv.display()
        );
        return Ok(());
    }

    println!(
        "Built {} games ({} actions), predictions saved for {}",
        report.build.games.len(),
        report.build.actions,
        report.predictions_saved
    );
    for (label, metrics) in &report.metrics {
        println!("{}", format_metrics(*label, metrics));
    }

    let ranking = &report.ranking;
    if ranking.rankings.is_empty() {
        println!(
            "No team events found in {}; no rankings written.",
            cfg.team_events_csv.display()
        );
        return Ok(());
    }

    println!();
    println!("Defensive audit (lowest successful defensive actions):");
    for entry in &ranking.audit {
        println!("  {}", format_audit_line(entry));
    }

    println!();
    println!(
        "{:<28} {:>9} {:>9} {:>9} {:>6}",
        "player", "vaep", "off", "def", "n"
    );
    for player in ranking.rankings.iter().take(TOP_PLAYERS) {
        println!("{}", format_ranking_line(player));
    }
    if let Some(path) = &ranking.csv_path {
        println!();
        println!("Rankings: {}", path.display());
    }
    if let Some(path) = &ranking.workbook_path {
        println!("Workbook: {}", path.display());
    }
    Ok(())
}
