use anyhow::{Result, bail};

use ncaa_vaep::config::ProviderConfig;
use ncaa_vaep::provider_fetch::{
    DownloadReport, ProviderClient, download_season, download_team_matches, download_team_only,
};

fn main() -> Result<()> {
    ncaa_vaep::load_dotenv();
    ncaa_vaep::init_tracing();

    let cfg = ProviderConfig::from_env()?;
    let client = ProviderClient::new(cfg)?;

    if has_flag("--areas") {
        println!("{}", serde_json::to_string_pretty(&client.areas()?)?);
        return Ok(());
    }
    if let Some(area) = arg_value("--competitions") {
        println!("{}", serde_json::to_string_pretty(&client.competitions(&area)?)?);
        return Ok(());
    }
    if has_flag("--seasons") {
        let body = client.seasons(client.config().competition_id)?;
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let season_id = match arg_value("--season").and_then(|v| v.parse::<i64>().ok()) {
        Some(id) => id,
        None => match client.current_season_id()? {
            Some(id) => id,
            None => bail!(
                "no active season for competition {}",
                client.config().competition_id
            ),
        },
    };

    print_report("season events", &download_season(&client, season_id)?);
    print_report("team match events", &download_team_matches(&client, season_id)?);
    print_report("team-only events", &download_team_only(&client, season_id)?);
    Ok(())
}

fn print_report(what: &str, report: &DownloadReport) {
    match &report.path {
        Some(path) => println!(
            "{what}: {} events from {}/{} matches -> {}",
            report.events_written,
            report.matches_fetched,
            report.matches_considered,
            path.display()
        ),
        None => println!("{what}: nothing saved"),
    }
    for (match_id, err) in report.skipped.iter().take(6) {
        println!("  skipped {match_id}: {err}");
    }
}

fn has_flag(flag: &str) -> bool {
    std::env::args().skip(1).any(|a| a == flag)
}

fn arg_value(flag: &str) -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let prefix = format!("{flag}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&prefix) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == flag
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.trim().to_string());
        }
    }
    None
}
