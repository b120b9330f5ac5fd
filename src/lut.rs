//! Label lookup tables (label id → region name).
//!
//! Two on-disk layouts are recognised:
//!
//! * headered delimited text, first column named like `label_id`:
//!   `label_id,label_name[,...]`, with comma, tab or semicolon separators
//! * legacy segment tables, one whitespace-separated entry per line:
//!   `<id> <r> <g> <b> <flag> <flag> <name...>`, optionally preceded by an
//!   `irtkSegmentTable` banner line
//!
//! Formats are tried in that order and the first one yielding at least one entry wins.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::path::Path;

const LEGACY_BANNER: &str = "irtksegmenttable";
const DELIMITERS: [u8; 3] = [b',', b'\t', b';'];

/// Immutable label id → name mapping, iterated in ascending id order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelTable {
    entries: BTreeMap<i32, String>,
}

impl LabelTable {
    /// Build a table from `(id, name)` pairs; later duplicates win.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (i32, S)>,
        S: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(|(id, n)| (id, n.into())).collect(),
        }
    }

    /// Name for `id`, if present.
    pub fn get(&self, id: i32) -> Option<&str> {
        self.entries.get(&id).map(String::as_str)
    }

    /// Label ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = i32> + '_ {
        self.entries.keys().copied()
    }

    /// `(id, name)` pairs in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (i32, &str)> {
        self.entries.iter().map(|(&id, n)| (id, n.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

type TableParser = fn(&str) -> Option<BTreeMap<i32, String>>;

/// Parsers in detection order.
const PARSERS: &[(&str, TableParser)] = &[
    ("tabular", parse_tabular as TableParser),
    ("legacy", parse_legacy as TableParser),
];

/// Load a label table, auto-detecting its format.
pub fn load_lut<P: AsRef<Path>>(path: P) -> Result<LabelTable> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::NotFound(format!("LUT {}", path.display())));
    }
    let raw = std::fs::read(path)?;
    let text = String::from_utf8_lossy(&raw);

    for (kind, parser) in PARSERS {
        match parser(&text) {
            Some(entries) if !entries.is_empty() => {
                tracing::debug!(path = %path.display(), format = *kind, labels = entries.len(), "loaded LUT");
                return Ok(LabelTable { entries });
            }
            _ => tracing::debug!(path = %path.display(), format = *kind, "LUT format did not match"),
        }
    }

    Err(Error::parse(
        path,
        "neither tabular nor legacy label table yielded any entries",
    ))
}

/// Separator occurring most often in the header line; commas win ties.
fn sniff_delimiter(text: &str) -> u8 {
    let header = text.lines().find(|l| !l.trim().is_empty()).unwrap_or_default();
    DELIMITERS
        .iter()
        .rev()
        .copied()
        .max_by_key(|&d| header.bytes().filter(|&b| b == d).count())
        .unwrap_or(b',')
}

/// Headered delimited text; `None` when the header does not name a `label_id` column.
fn parse_tabular(text: &str) -> Option<BTreeMap<i32, String>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(sniff_delimiter(text))
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut records = reader.records();
    let header = records.next()?.ok()?;
    let first = header.get(0)?.to_lowercase();
    if !first.contains("label_id") {
        return None;
    }

    let mut out = BTreeMap::new();
    for record in records {
        let Ok(row) = record else { continue };
        if row.len() < 2 {
            continue;
        }
        let Ok(id) = row[0].parse::<i32>() else {
            continue;
        };
        out.insert(id, row[1].to_string());
    }
    Some(out)
}

/// Whitespace-separated legacy segment table.
fn parse_legacy(text: &str) -> Option<BTreeMap<i32, String>> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty()).peekable();
    if lines
        .peek()
        .is_some_and(|l| l.to_lowercase().starts_with(LEGACY_BANNER))
    {
        lines.next();
    }

    let mut out = BTreeMap::new();
    for line in lines {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 3 {
            continue;
        }
        let Ok(id) = parts[0].parse::<i32>() else {
            continue;
        };
        // Colour and visibility columns are absent in some variants.
        let name = if parts.len() >= 7 {
            parts[6..].join(" ")
        } else {
            parts[1..].join(" ")
        };
        out.insert(id, name.trim().to_string());
    }
    Some(out)
}
