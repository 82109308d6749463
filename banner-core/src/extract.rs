//! Pulls daily TX/TN/PPT readings out of a XEMA station page.
//!
//! Three layouts are understood, tried in this order:
//!
//! 1. A per-period table: a header row naming the variables (`TX (°C)`,
//!    `TN (°C)`, `PPT (mm)`, ...) followed by one row per half-hour period.
//!    The day's values are the maximum of the TX column, the minimum of the
//!    TN column and the sum of the PPT column.
//! 2. A label/value table: each row holds a label cell and a value cell.
//!    The first row matching a variable wins.
//! 3. Free text, when the page has no recognizable table.

use scraper::{ElementRef, Html, Selector};

use crate::{
    error::ExtractError,
    model::{Measurement, MeasurementSet},
    rounding::round_half_up,
};

/// Table selectors, most specific first.
const TABLE_SELECTORS: &[&str] = &[
    "table.table-dades",
    "table.taula-dades",
    "table.dades-table",
    "table#taula-dades",
    "table#table-dades",
    "table.table",
    "table.taula",
];

/// Labels containing any of these never name TX/TN/PPT, even when they
/// contain "màxima" (wind gusts, for instance).
const IGNORED_LABELS: &[&str] = &["ratxa", "vent", "wind", "humitat", "pressió"];

const TEXT_SEPARATORS: &[char] = &[':', '=', '(', ')', '°'];
const TEXT_FILLERS: &[&str] = &["acumulada", "del dia", "d'avui", "avui", "today"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variable {
    MaxTemperature,
    MinTemperature,
    Precipitation,
}

impl Variable {
    pub const ALL: [Variable; 3] =
        [Variable::MaxTemperature, Variable::MinTemperature, Variable::Precipitation];

    /// Lowercase label synonyms, longest phrases first.
    pub fn synonyms(self) -> &'static [&'static str] {
        match self {
            Variable::MaxTemperature => &[
                "temperatura màxima",
                "temperatura maxima",
                "màxima",
                "máxima",
                "maxima",
                "maximum",
                "tx",
            ],
            Variable::MinTemperature => &[
                "temperatura mínima",
                "temperatura minima",
                "mínima",
                "minima",
                "minimum",
                "tn",
            ],
            Variable::Precipitation => &[
                "precipitació acumulada",
                "precipitació",
                "precipitación",
                "precipitacio",
                "precipitation",
                "acumulada",
                "pluja",
                "ppt",
            ],
        }
    }

    /// Case-insensitive substring match of a label cell.
    pub fn classify(label: &str) -> Option<Variable> {
        let lower = label.to_lowercase();
        if IGNORED_LABELS.iter().any(|ignored| lower.contains(ignored)) {
            return None;
        }

        Variable::ALL
            .into_iter()
            .find(|var| var.synonyms().iter().any(|syn| lower.contains(syn)))
    }

    fn slot(self, set: &mut MeasurementSet) -> &mut Measurement {
        match self {
            Variable::MaxTemperature => &mut set.tx,
            Variable::MinTemperature => &mut set.tn,
            Variable::Precipitation => &mut set.ppt,
        }
    }
}

/// Which layout produced the values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMode {
    PeriodTable { periods: usize },
    LabelTable,
    Text,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub values: MeasurementSet,
    pub mode: ExtractionMode,
}

/// Extract the daily values from a full HTML document.
pub fn extract_from_html(html: &str) -> Result<Extraction, ExtractError> {
    let document = Html::parse_document(html);

    if let Some(table) = find_table(&document) {
        let rows = table_rows(table);
        let extraction = extract_from_rows(&rows);
        if !extraction.values.is_empty() {
            return Ok(extraction);
        }
        log::debug!("Data table found but held no readings, falling back to page text");
    } else {
        log::debug!("No data table found, falling back to page text");
    }

    let text = document.root_element().text().collect::<Vec<_>>().join(" ");
    let values = extract_from_text(&text);
    if values.is_empty() {
        return Err(ExtractError::NoData);
    }

    Ok(Extraction { values, mode: ExtractionMode::Text })
}

fn find_table(document: &Html) -> Option<ElementRef<'_>> {
    TABLE_SELECTORS
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .find_map(|selector| document.select(&selector).next())
}

fn table_rows(table: ElementRef<'_>) -> Vec<Vec<String>> {
    let (Ok(row_sel), Ok(cell_sel)) = (Selector::parse("tr"), Selector::parse("td, th")) else {
        return Vec::new();
    };

    table
        .select(&row_sel)
        .map(|row| {
            row.select(&cell_sel)
                .map(|cell| collapse_whitespace(&cell.text().collect::<String>()))
                .collect()
        })
        .collect()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extract from rows of cell texts. Uses the per-period reduction when a
/// header row names at least two distinct variables, label/value pairs
/// otherwise.
pub fn extract_from_rows<S: AsRef<str>>(rows: &[Vec<S>]) -> Extraction {
    match find_header(rows) {
        Some((index, columns)) => {
            let body = &rows[index + 1..];
            Extraction {
                values: reduce_periods(body, &columns),
                mode: ExtractionMode::PeriodTable { periods: body.len() },
            }
        }
        None => Extraction { values: label_values(rows), mode: ExtractionMode::LabelTable },
    }
}

fn find_header<S: AsRef<str>>(rows: &[Vec<S>]) -> Option<(usize, Vec<(usize, Variable)>)> {
    rows.iter().enumerate().find_map(|(index, row)| {
        let mut columns: Vec<(usize, Variable)> = Vec::new();
        for (col, cell) in row.iter().enumerate() {
            match Variable::classify(cell.as_ref()) {
                Some(var) => {
                    if !columns.iter().any(|(_, seen)| *seen == var) {
                        columns.push((col, var));
                    }
                }
                // A reading beside the labels makes this a label/value row.
                None if is_reading(cell.as_ref()) => return None,
                None => {}
            }
        }
        (columns.len() >= 2).then_some((index, columns))
    })
}

/// Cell whose text starts with a number, as opposed to a header with a
/// height or unit in it.
fn is_reading(cell: &str) -> bool {
    matches!(scan_number(cell.trim_start()), Some((0, _)))
}

/// Daily max of period maxima, min of period minima, total of period rain.
fn reduce_periods<S: AsRef<str>>(rows: &[Vec<S>], columns: &[(usize, Variable)]) -> MeasurementSet {
    let mut max: Option<f64> = None;
    let mut min: Option<f64> = None;
    let mut rain: Option<f64> = None;

    for row in rows {
        for &(col, var) in columns {
            let Some(value) = row.get(col).and_then(|cell| parse_number(cell.as_ref())) else {
                continue;
            };
            match var {
                Variable::MaxTemperature => max = Some(max.map_or(value, |m| m.max(value))),
                Variable::MinTemperature => min = Some(min.map_or(value, |m| m.min(value))),
                Variable::Precipitation => rain = Some(rain.unwrap_or(0.0) + value),
            }
        }
    }

    MeasurementSet {
        tx: max.into(),
        tn: min.into(),
        ppt: rain.map(|total| round_half_up(total, 1)).into(),
    }
}

fn label_values<S: AsRef<str>>(rows: &[Vec<S>]) -> MeasurementSet {
    let mut values = MeasurementSet::missing();

    for pair in rows.iter().flat_map(|row| row.windows(2)) {
        let Some(var) = Variable::classify(pair[0].as_ref()) else {
            continue;
        };
        let slot = var.slot(&mut values);
        if !slot.is_missing() {
            continue;
        }
        if let Some(value) = parse_number(pair[1].as_ref()) {
            *slot = Measurement::Value(value);
        }
    }

    values
}

/// Search free text for `<label> [:=] <number>` for each variable.
pub fn extract_from_text(text: &str) -> MeasurementSet {
    let lower = text.to_lowercase();
    let mut values = MeasurementSet::missing();

    for var in Variable::ALL {
        let found = var.synonyms().iter().find_map(|syn| {
            lower.match_indices(syn).find_map(|(idx, matched)| {
                let end = idx + matched.len();
                let boundary_before =
                    lower[..idx].chars().next_back().is_none_or(|c| !c.is_alphanumeric());
                let boundary_after =
                    lower[end..].chars().next().is_none_or(|c| !c.is_alphanumeric());
                if boundary_before && boundary_after {
                    number_after_label(&lower[end..])
                } else {
                    None
                }
            })
        });
        if let Some(value) = found {
            *var.slot(&mut values) = Measurement::Value(value);
        }
    }

    values
}

fn number_after_label(rest: &str) -> Option<f64> {
    let mut rest = rest;
    loop {
        let trimmed =
            rest.trim_start_matches(|c: char| c.is_whitespace() || TEXT_SEPARATORS.contains(&c));
        match TEXT_FILLERS.iter().find(|filler| trimmed.starts_with(**filler)) {
            Some(filler) => rest = &trimmed[filler.len()..],
            None => {
                rest = trimmed;
                break;
            }
        }
    }

    match scan_number(rest) {
        Some((0, value)) => Some(round_half_up(value, 1)),
        _ => None,
    }
}

/// First numeric token in `text`, rounded to one decimal. Accepts an
/// optional sign and `.` or `,` as decimal mark.
pub fn parse_number(text: &str) -> Option<f64> {
    scan_number(text).map(|(_, value)| round_half_up(value, 1))
}

/// Byte offset and value of the first `[+-]?\d*[.,]?\d+` token.
fn scan_number(text: &str) -> Option<(usize, f64)> {
    let bytes = text.as_bytes();

    (0..bytes.len()).filter(|&i| text.is_char_boundary(i)).find_map(|start| {
        let mut pos = start;
        let negative = match bytes[pos] {
            b'-' => {
                pos += 1;
                true
            }
            b'+' => {
                pos += 1;
                false
            }
            _ => false,
        };

        let int_start = pos;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
        let int_digits = &text[int_start..pos];

        let mut frac_digits = "";
        if pos + 1 < bytes.len()
            && matches!(bytes[pos], b'.' | b',')
            && bytes[pos + 1].is_ascii_digit()
        {
            let frac_start = pos + 1;
            pos = frac_start;
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                pos += 1;
            }
            frac_digits = &text[frac_start..pos];
        }

        if int_digits.is_empty() && frac_digits.is_empty() {
            return None;
        }

        let normalized = format!(
            "{}{}.{}",
            if negative { "-" } else { "" },
            if int_digits.is_empty() { "0" } else { int_digits },
            if frac_digits.is_empty() { "0" } else { frac_digits },
        );
        normalized.parse::<f64>().ok().map(|value| (start, value))
    })
}
