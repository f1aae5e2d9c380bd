//! Export rendering: the tabular results summary (CSV and single-sheet
//! spreadsheet) and the per-date sign-in workbook.
//!
//! Sheet building is split in two: a pure row model (`SignInSheet`) derived
//! from ballots, then an xlsx writer that only does formatting. The row
//! model is what the tests exercise.

use crate::db::models::{Choice, Period, TimeSlot, age_on};
use crate::db::repositories::VoterRecord;
use crate::stats::SlotStatistics;
use chrono::{Datelike, NaiveDate};
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Workbook, XlsxError};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Spreadsheet error: {0}")]
    Xlsx(#[from] XlsxError),
    #[error("Failed to finish export: {0}")]
    Finish(String),
}

pub const CSV_HEADER: [&str; 9] = [
    "Date",
    "Période",
    "Oui",
    "Non",
    "Peut-être",
    "Total Votes",
    "Oui %",
    "Non %",
    "Peut-être %",
];

fn format_percent(value: f64) -> String {
    format!("{value:.1}%")
}

/// One row per (date, period), percentages to one decimal with a trailing
/// `%` sign.
pub fn results_csv(stats: &[SlotStatistics]) -> Result<Vec<u8>, ReportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    for s in stats {
        writer.write_record([
            s.date.format("%Y-%m-%d").to_string(),
            s.period.label_fr().to_string(),
            s.yes.to_string(),
            s.no.to_string(),
            s.maybe.to_string(),
            s.total.to_string(),
            format_percent(s.yes_percent),
            format_percent(s.no_percent),
            format_percent(s.maybe_percent),
        ])?;
    }
    writer
        .into_inner()
        .map_err(|e| ReportError::Finish(e.to_string()))
}

/// Single "Voting Results" sheet mirroring the CSV summary.
pub fn results_workbook(stats: &[SlotStatistics]) -> Result<Vec<u8>, ReportError> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();

    let sheet = workbook.add_worksheet();
    sheet.set_name("Voting Results")?;

    for (col, header) in CSV_HEADER.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *header, &bold)?;
    }
    for (i, s) in stats.iter().enumerate() {
        let row = (i + 1) as u32;
        sheet.write_string(row, 0, s.date.format("%Y-%m-%d").to_string())?;
        sheet.write_string(row, 1, s.period.label_fr())?;
        sheet.write_number(row, 2, s.yes as f64)?;
        sheet.write_number(row, 3, s.no as f64)?;
        sheet.write_number(row, 4, s.maybe as f64)?;
        sheet.write_number(row, 5, s.total as f64)?;
        sheet.write_string(row, 6, format_percent(s.yes_percent))?;
        sheet.write_string(row, 7, format_percent(s.no_percent))?;
        sheet.write_string(row, 8, format_percent(s.maybe_percent))?;
    }
    sheet.set_column_width(0, 12)?;
    sheet.set_column_width(1, 12)?;

    Ok(workbook.save_to_buffer()?)
}

/// Which children make it onto a sign-in sheet. The production exports
/// disagreed on this, so it is an explicit knob rather than a buried
/// constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignInPolicy {
    YesOnly,
    #[default]
    YesAndMaybe,
}

impl SignInPolicy {
    pub fn parse(value: &str) -> Option<SignInPolicy> {
        match value {
            "yes-only" => Some(SignInPolicy::YesOnly),
            "yes-and-maybe" => Some(SignInPolicy::YesAndMaybe),
            _ => None,
        }
    }
}

/// Age above which a child leaves the youngest band; the separator row sits
/// directly above the first such child.
const AGE_BAND_LIMIT: i32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInRow {
    pub number: usize,
    /// "First Last (N ans)"
    pub label: String,
    /// Per-period mark in morning/lunch/afternoon order: "✓", "?" or "".
    pub marks: [&'static str; 3],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignInLine {
    Child(SignInRow),
    Separator,
}

#[derive(Debug, Clone)]
pub struct SignInSheet {
    pub date: NaiveDate,
    /// Worksheet title, e.g. "24-Dec-2025".
    pub title: String,
    pub lines: Vec<SignInLine>,
    /// Per-period yes counts in morning/lunch/afternoon order.
    pub yes_totals: [usize; 3],
    pub no_totals: [usize; 3],
}

/// Build the sign-in rows for one date: children with an affirmative vote
/// on any of the date's slots, youngest first (birth date is the stable
/// sort key; computed age would shift at midnight on a birthday).
pub fn sign_in_sheet(
    date: NaiveDate,
    slots: &[(TimeSlot, Vec<VoterRecord>)],
    policy: SignInPolicy,
    today: NaiveDate,
) -> SignInSheet {
    let mut yes_by_period: [HashSet<Uuid>; 3] = Default::default();
    let mut maybe_by_period: [HashSet<Uuid>; 3] = Default::default();
    let mut yes_totals = [0usize; 3];
    let mut no_totals = [0usize; 3];
    let mut roster: HashMap<Uuid, (String, String, NaiveDate)> = HashMap::new();

    for (slot, votes) in slots {
        let idx = slot.period.sort_key();
        for vote in votes {
            match vote.choice {
                Choice::Yes => {
                    yes_by_period[idx].insert(vote.child_id);
                    yes_totals[idx] += 1;
                }
                Choice::Maybe => {
                    maybe_by_period[idx].insert(vote.child_id);
                }
                Choice::No => {
                    no_totals[idx] += 1;
                }
            }
            let eligible = match policy {
                SignInPolicy::YesOnly => vote.choice == Choice::Yes,
                SignInPolicy::YesAndMaybe => matches!(vote.choice, Choice::Yes | Choice::Maybe),
            };
            if eligible {
                roster.entry(vote.child_id).or_insert_with(|| {
                    (
                        vote.first_name.clone(),
                        vote.last_name.clone(),
                        vote.birth_date,
                    )
                });
            }
        }
    }

    let mut children: Vec<(Uuid, String, String, NaiveDate)> = roster
        .into_iter()
        .map(|(id, (first, last, birth))| (id, first, last, birth))
        .collect();
    // Youngest first; names only break ties between same-day birthdays.
    children.sort_by(|a, b| {
        (b.3.year(), b.3.month(), b.3.day())
            .cmp(&(a.3.year(), a.3.month(), a.3.day()))
            .then_with(|| (a.2.as_str(), a.1.as_str()).cmp(&(b.2.as_str(), b.1.as_str())))
    });

    let mut lines = Vec::new();
    let mut separator_placed = false;
    let mut offset = 0;
    for (i, (child_id, first, last, birth)) in children.iter().enumerate() {
        let age = age_on(*birth, today);
        if !separator_placed && age > AGE_BAND_LIMIT {
            separator_placed = true;
            offset = i;
            lines.push(SignInLine::Separator);
        }

        let mark = |idx: usize| -> &'static str {
            if yes_by_period[idx].contains(child_id) {
                "✓"
            } else if maybe_by_period[idx].contains(child_id) {
                "?"
            } else {
                ""
            }
        };

        lines.push(SignInLine::Child(SignInRow {
            number: i + 1 - offset,
            label: format!("{first} {last} ({age} ans)"),
            marks: [mark(0), mark(1), mark(2)],
        }));
    }

    SignInSheet {
        date,
        title: date.format("%d-%b-%Y").to_string(),
        lines,
        yes_totals,
        no_totals,
    }
}

const SIGN_IN_COLUMNS: u16 = 9;

/// Multi-sheet sign-in workbook: an optional "Résumé" sheet followed by one
/// print-formatted sheet per date.
pub fn sign_in_workbook(
    sheets: &[SignInSheet],
    include_summary: bool,
) -> Result<Vec<u8>, ReportError> {
    let mut workbook = Workbook::new();

    let cell = Format::new()
        .set_align(FormatAlign::Center)
        .set_border(FormatBorder::Thin);
    let bold = Format::new()
        .set_bold()
        .set_align(FormatAlign::Center)
        .set_border(FormatBorder::Thin);
    let separator = Format::new()
        .set_align(FormatAlign::Center)
        .set_border(FormatBorder::Thin)
        .set_background_color(Color::RGB(0xD9D9D9));

    if include_summary {
        let summary = workbook.add_worksheet();
        summary.set_name("Résumé")?;
        let headers = [
            "Date",
            "Matin Oui",
            "Matin Non",
            "Repas Oui",
            "Repas Non",
            "Après-midi Oui",
            "Après-midi Non",
        ];
        for (col, header) in headers.iter().enumerate() {
            summary.write_string_with_format(0, col as u16, *header, &bold)?;
        }
        for (i, sheet) in sheets.iter().enumerate() {
            let row = (i + 1) as u32;
            summary.write_string_with_format(row, 0, &sheet.title, &cell)?;
            for p in 0..3 {
                let col = (1 + p * 2) as u16;
                summary.write_number_with_format(row, col, sheet.yes_totals[p] as f64, &cell)?;
                summary.write_number_with_format(row, col + 1, sheet.no_totals[p] as f64, &cell)?;
            }
        }
        summary.set_column_width(0, 14)?;
        for col in 1..7u16 {
            summary.set_column_width(col, 14)?;
        }
    }

    for sheet in sheets {
        let ws = workbook.add_worksheet();
        ws.set_name(&sheet.title)?;

        // Two header rows with merged spans over the booking and
        // arrival/departure columns.
        ws.write_blank(0, 0, &bold)?;
        ws.write_string_with_format(0, 1, &sheet.title, &bold)?;
        ws.merge_range(0, 2, 0, 4, "Réservation", &bold)?;
        ws.merge_range(0, 5, 0, 6, "arrivée", &bold)?;
        ws.merge_range(0, 7, 0, 8, "départ", &bold)?;

        let mut headers = vec!["#", "Nom de l'enfant"];
        headers.extend(Period::ALL.iter().map(|p| p.short_label()));
        headers.extend(["heure", "signature", "heure", "signature"]);
        for (col, header) in headers.iter().enumerate() {
            ws.write_string_with_format(1, col as u16, *header, &bold)?;
        }

        let mut row: u32 = 2;
        let mut name_width = headers[1].len();
        for line in &sheet.lines {
            match line {
                SignInLine::Separator => {
                    for col in 0..SIGN_IN_COLUMNS {
                        ws.write_blank(row, col, &separator)?;
                    }
                }
                SignInLine::Child(child) => {
                    name_width = name_width.max(child.label.chars().count());
                    ws.write_number_with_format(row, 0, child.number as f64, &cell)?;
                    ws.write_string_with_format(row, 1, &child.label, &cell)?;
                    for (p, mark) in child.marks.iter().enumerate() {
                        ws.write_string_with_format(row, (2 + p) as u16, *mark, &cell)?;
                    }
                    for col in 5..SIGN_IN_COLUMNS {
                        ws.write_blank(row, col, &cell)?;
                    }
                }
            }
            row += 1;
        }

        if include_summary {
            ws.write_blank(row, 0, &bold)?;
            ws.write_string_with_format(row, 1, "Total", &bold)?;
            for p in 0..3 {
                ws.write_number_with_format(
                    row,
                    (2 + p) as u16,
                    sheet.yes_totals[p] as f64,
                    &bold,
                )?;
            }
            for col in 5..SIGN_IN_COLUMNS {
                ws.write_blank(row, col, &bold)?;
            }
        }

        // Fixed widths for print; the name column grows with content but
        // stays capped.
        ws.set_column_width(0, 4)?;
        ws.set_column_width(1, ((name_width + 2).min(50)) as f64)?;
        ws.set_column_width(2, 3.5)?;
        ws.set_column_width(3, 3.5)?;
        ws.set_column_width(4, 3.5)?;
        ws.set_column_width(5, 10)?;
        ws.set_column_width(6, 27)?;
        ws.set_column_width(7, 10)?;
        ws.set_column_width(8, 27)?;
    }

    Ok(workbook.save_to_buffer()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::slot_statistics;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn voter(first: &str, last: &str, birth: NaiveDate, choice: Choice) -> VoterRecord {
        VoterRecord {
            child_id: Uuid::new_v4(),
            first_name: first.to_string(),
            last_name: last.to_string(),
            birth_date: birth,
            choice,
        }
    }

    fn slot(period: Period, votes: Vec<VoterRecord>) -> (TimeSlot, Vec<VoterRecord>) {
        (
            TimeSlot {
                id: Uuid::new_v4(),
                date_option_id: Uuid::new_v4(),
                period,
            },
            votes,
        )
    }

    #[test]
    fn csv_has_french_header_and_one_decimal_percentages() {
        let votes = vec![
            voter("Léa", "Martin", date(2022, 3, 1), Choice::Yes),
            voter("Noah", "Bernard", date(2021, 5, 9), Choice::Yes),
            voter("Emma", "Petit", date(2020, 8, 2), Choice::Yes),
            voter("Louis", "Durand", date(2019, 2, 14), Choice::No),
        ];
        let stats = vec![slot_statistics(date(2025, 12, 24), Period::Morning, &votes)];

        let bytes = results_csv(&stats).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Date,Période,Oui,Non,Peut-être,Total Votes,Oui %,Non %,Peut-être %"
        );
        assert_eq!(
            lines.next().unwrap(),
            "2025-12-24,Matin,3,1,0,4,75.0%,25.0%,0.0%"
        );
    }

    #[test]
    fn sheet_title_uses_day_month_year() {
        let sheet = sign_in_sheet(date(2025, 12, 24), &[], SignInPolicy::default(), date(2025, 12, 1));
        assert_eq!(sheet.title, "24-Dec-2025");
        assert!(sheet.lines.is_empty());
    }

    #[test]
    fn youngest_child_comes_first_with_separator_above_older_band() {
        let today = date(2025, 6, 1);
        let seven = voter("Hugo", "Roux", date(2018, 1, 10), Choice::Yes);
        let three = voter("Mia", "Blanc", date(2022, 2, 20), Choice::Yes);
        let slots = vec![slot(Period::Morning, vec![seven, three])];

        let sheet = sign_in_sheet(date(2025, 6, 15), &slots, SignInPolicy::YesOnly, today);
        assert_eq!(sheet.lines.len(), 3);
        match &sheet.lines[0] {
            SignInLine::Child(row) => {
                assert_eq!(row.number, 1);
                assert_eq!(row.label, "Mia Blanc (3 ans)");
            }
            other => panic!("expected youngest child first, got {other:?}"),
        }
        assert_eq!(sheet.lines[1], SignInLine::Separator);
        match &sheet.lines[2] {
            SignInLine::Child(row) => {
                // Numbering restarts after the separator.
                assert_eq!(row.number, 1);
                assert_eq!(row.label, "Hugo Roux (7 ans)");
            }
            other => panic!("expected older child after separator, got {other:?}"),
        }
    }

    #[test]
    fn marks_show_check_for_yes_and_question_for_maybe() {
        let today = date(2025, 6, 1);
        let child_id = Uuid::new_v4();
        let mut morning = voter("Mia", "Blanc", date(2022, 2, 20), Choice::Yes);
        morning.child_id = child_id;
        let mut lunch = voter("Mia", "Blanc", date(2022, 2, 20), Choice::Maybe);
        lunch.child_id = child_id;
        let slots = vec![
            slot(Period::Morning, vec![morning]),
            slot(Period::Lunch, vec![lunch]),
            slot(Period::Afternoon, vec![]),
        ];

        let sheet = sign_in_sheet(date(2025, 6, 15), &slots, SignInPolicy::YesAndMaybe, today);
        match &sheet.lines[0] {
            SignInLine::Child(row) => assert_eq!(row.marks, ["✓", "?", ""]),
            other => panic!("expected a child row, got {other:?}"),
        }
    }

    #[test]
    fn yes_only_policy_drops_maybe_only_children() {
        let today = date(2025, 6, 1);
        let yes = voter("Mia", "Blanc", date(2022, 2, 20), Choice::Yes);
        let maybe = voter("Tom", "Gris", date(2021, 7, 3), Choice::Maybe);
        let slots = vec![slot(Period::Morning, vec![yes, maybe])];

        let strict = sign_in_sheet(date(2025, 6, 15), &slots, SignInPolicy::YesOnly, today);
        assert_eq!(strict.lines.len(), 1);

        let lenient = sign_in_sheet(date(2025, 6, 15), &slots, SignInPolicy::YesAndMaybe, today);
        assert_eq!(lenient.lines.len(), 2);
    }

    #[test]
    fn totals_count_yes_votes_per_period() {
        let today = date(2025, 6, 1);
        let slots = vec![
            slot(
                Period::Morning,
                vec![
                    voter("A", "A", date(2022, 1, 1), Choice::Yes),
                    voter("B", "B", date(2022, 1, 2), Choice::Yes),
                    voter("C", "C", date(2022, 1, 3), Choice::No),
                ],
            ),
            slot(
                Period::Afternoon,
                vec![voter("D", "D", date(2022, 1, 4), Choice::Yes)],
            ),
        ];

        let sheet = sign_in_sheet(date(2025, 6, 15), &slots, SignInPolicy::YesOnly, today);
        assert_eq!(sheet.yes_totals, [2, 0, 1]);
        assert_eq!(sheet.no_totals, [1, 0, 0]);
    }

    #[test]
    fn workbooks_serialize_to_bytes() {
        let votes = vec![voter("Léa", "Martin", date(2022, 3, 1), Choice::Yes)];
        let stats = vec![slot_statistics(date(2025, 12, 24), Period::Morning, &votes)];
        assert!(!results_workbook(&stats).unwrap().is_empty());

        let slots = vec![slot(Period::Morning, votes)];
        let sheet = sign_in_sheet(
            date(2025, 12, 24),
            &slots,
            SignInPolicy::default(),
            date(2025, 12, 1),
        );
        assert!(!sign_in_workbook(&[sheet.clone()], false).unwrap().is_empty());
        assert!(!sign_in_workbook(&[sheet], true).unwrap().is_empty());
    }

    #[test]
    fn policy_parses_from_query_values() {
        assert_eq!(SignInPolicy::parse("yes-only"), Some(SignInPolicy::YesOnly));
        assert_eq!(
            SignInPolicy::parse("yes-and-maybe"),
            Some(SignInPolicy::YesAndMaybe)
        );
        assert_eq!(SignInPolicy::parse("everyone"), None);
    }
}
