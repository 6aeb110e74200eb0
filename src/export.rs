use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::vaep::{AuditEntry, PlayerAggregate};

pub const RANKING_HEADER: [&str; 5] = [
    "player_name",
    "vaep_value",
    "offensive_value",
    "defensive_value",
    "action_count",
];

/// Ranking table as CSV, in the order given.
pub fn write_rankings_csv(rankings: &[PlayerAggregate], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create dir {}", parent.display()))?;
    }
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("create {}", path.display()))?;
    for row in rankings {
        writer.serialize(row).context("write ranking row")?;
    }
    if rankings.is_empty() {
        writer.write_record(RANKING_HEADER).context("write ranking header")?;
    }
    writer
        .flush()
        .with_context(|| format!("flush {}", path.display()))?;
    Ok(())
}

/// Rankings and the defensive audit as a two-sheet workbook.
pub fn write_rankings_workbook(
    rankings: &[PlayerAggregate],
    audit: &[AuditEntry],
    path: &Path,
) -> Result<()> {
    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Rankings")?;
        write_header(sheet, &RANKING_HEADER)?;
        for (i, p) in rankings.iter().enumerate() {
            let row = i as u32 + 1;
            sheet
                .write_string(row, 0, &p.player_name)
                .with_context(|| format!("write ranking row {row}"))?;
            write_numbers(
                sheet,
                row,
                1,
                &[
                    p.vaep_value,
                    p.offensive_value,
                    p.defensive_value,
                    p.action_count as f64,
                ],
            )?;
        }
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("DefensiveAudit")?;
        write_header(
            sheet,
            &["player_name", "type_name", "start_x", "start_y", "defensive_value"],
        )?;
        for (i, a) in audit.iter().enumerate() {
            let row = i as u32 + 1;
            sheet
                .write_string(row, 0, &a.player_name)
                .with_context(|| format!("write audit row {row}"))?;
            sheet
                .write_string(row, 1, a.type_name)
                .with_context(|| format!("write audit row {row}"))?;
            write_numbers(sheet, row, 2, &[a.start_x, a.start_y, a.defensive_value])?;
        }
    }

    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;
    Ok(())
}

fn write_header(sheet: &mut Worksheet, names: &[&str]) -> Result<()> {
    for (col, name) in names.iter().enumerate() {
        sheet
            .write_string(0, col as u16, *name)
            .with_context(|| format!("write header cell {col}"))?;
    }
    Ok(())
}

fn write_numbers(sheet: &mut Worksheet, row: u32, first_col: u16, values: &[f64]) -> Result<()> {
    for (offset, value) in values.iter().enumerate() {
        let col = first_col + offset as u16;
        sheet
            .write_number(row, col, *value)
            .with_context(|| format!("write cell ({row},{col})"))?;
    }
    Ok(())
}

pub fn format_ranking_line(p: &PlayerAggregate) -> String {
    format!(
        "{:<28} {:>9.4} {:>9.4} {:>9.4} {:>6}",
        p.player_name, p.vaep_value, p.offensive_value, p.defensive_value, p.action_count
    )
}

pub fn format_audit_line(a: &AuditEntry) -> String {
    format!(
        "Player: {} | Action: {} | Loc: ({:.1}, {:.1}) | Value: {:.4}",
        a.player_name, a.type_name, a.start_x, a.start_y, a.defensive_value
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranking() -> Vec<PlayerAggregate> {
        vec![PlayerAggregate {
            player_name: "A. Player".to_string(),
            vaep_value: 0.25,
            offensive_value: 0.3,
            defensive_value: -0.05,
            action_count: 4,
        }]
    }

    #[test]
    fn csv_has_expected_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rank.csv");
        write_rankings_csv(&ranking(), &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(RANKING_HEADER.join(",").as_str()));
        assert_eq!(lines.next(), Some("A. Player,0.25,0.3,-0.05,4"));
    }

    #[test]
    fn empty_ranking_still_writes_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rank.csv");
        write_rankings_csv(&[], &path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap().trim(), RANKING_HEADER.join(","));
    }

    #[test]
    fn workbook_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rank.xlsx");
        let audit = vec![AuditEntry {
            player_name: "B".to_string(),
            type_name: "clearance",
            start_x: 20.0,
            start_y: 30.0,
            defensive_value: -0.004,
        }];
        write_rankings_workbook(&ranking(), &audit, &path).unwrap();
        assert!(fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn audit_line_matches_report_format() {
        let a = AuditEntry {
            player_name: "B".to_string(),
            type_name: "interception",
            start_x: 20.04,
            start_y: 30.0,
            defensive_value: -0.00449,
        };
        assert_eq!(
            format_audit_line(&a),
            "Player: B | Action: interception | Loc: (20.0, 30.0) | Value: -0.0045"
        );
    }
}
