use std::path::PathBuf;

use anyhow::Result;

use ncaa_vaep::config::DEFAULT_TEAM_LABEL;
use ncaa_vaep::events::read_events_csv;
use ncaa_vaep::passing_report::{PASSING_COLUMNS, PASSING_FILE, passes_by_match};
use ncaa_vaep::provider_fetch::{SEASON_EVENTS_FILE, TEAM_GAME_EVENTS_FILE};
use ncaa_vaep::xg_report::{
    FORMATION_XG_FILE, LEAGUE_XG_FILE, XG_COLUMNS, formation_xg, read_league_xg, team_xg_summary,
    write_csv,
};

fn main() -> Result<()> {
    ncaa_vaep::load_dotenv();
    ncaa_vaep::init_tracing();

    let base = env_value("BASE_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let team_label = env_value("VAEP_TEAM_LABEL").unwrap_or_else(|| DEFAULT_TEAM_LABEL.to_string());

    let season_path = base.join(SEASON_EVENTS_FILE);
    let league_path = base.join(LEAGUE_XG_FILE);
    let league = if !season_path.exists() && league_path.exists() {
        println!("{} missing; reusing {}", season_path.display(), league_path.display());
        read_league_xg(&league_path)?
    } else {
        let season = read_events_csv(&season_path, &XG_COLUMNS)?;
        let league = team_xg_summary(&season);
        write_csv(&league, &league_path)?;
        league
    };

    println!("League xG per game ({} teams)", league.len());
    println!("{:<28} {:>7} {:>7} {:>5}", "team", "xGF", "xGA", "gp");
    for t in &league {
        println!(
            "{:<28} {:>7.1} {:>7.1} {:>5}",
            t.team, t.xg_for_per_game, t.xg_against_per_game, t.games_played
        );
    }
    println!("Saved {}", league_path.display());

    let team_games = read_events_csv(&base.join(TEAM_GAME_EVENTS_FILE), &XG_COLUMNS)?;
    let formations = formation_xg(&team_games, &league, &team_label);
    let formation_path = base.join(FORMATION_XG_FILE);
    write_csv(&formations, &formation_path)?;

    println!();
    println!("{team_label} by formation");
    println!(
        "{:<12} {:>8} {:>8} {:>7} {:>7} {:>5}",
        "formation", "adj xGF", "adj xGA", "xGF", "xGA", "gp"
    );
    for f in &formations {
        println!(
            "{:<12} {:>8.1} {:>8.1} {:>7.1} {:>7.1} {:>5}",
            f.formation,
            f.adj_xg_for_per_game,
            f.adj_xg_against_per_game,
            f.xg_for_per_game,
            f.xg_against_per_game,
            f.games_played
        );
    }
    println!("Saved {}", formation_path.display());

    let passing_events = read_events_csv(&base.join(TEAM_GAME_EVENTS_FILE), &PASSING_COLUMNS)?;
    println!();
    println!("{team_label} pass origin by match");
    println!(
        "{:<28} {:>6} {:>6} {:>6} {:>6}",
        "opponent", "passes", "def%", "mid%", "att%"
    );
    let passing = passes_by_match(&passing_events, &team_label);
    for row in &passing {
        println!(
            "{:<28} {:>6} {:>6.1} {:>6.1} {:>6.1}",
            row.opponent, row.total_passes, row.def_pct, row.mid_pct, row.att_pct
        );
    }
    let passing_path = base.join(PASSING_FILE);
    write_csv(&passing, &passing_path)?;
    println!("Saved {}", passing_path.display());
    Ok(())
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
