use crate::config::{ColumnSpec, CsvLayout};
use crate::error::{Error, Result};
use crate::models::StagingRecord;
use csv::StringRecord;

pub const CATEGORY_DELIMITER: &str = "|";
const FLAG_SET: &str = "Y";

/// Header-derived mapping from export columns to staging fields.
#[derive(Debug, Clone)]
pub struct ColumnMap {
    width: usize,
    // id, market_name, street, city, state, zip, x, y
    identity: [usize; 8],
    category_offset: usize,
    categories: Vec<String>,
}

impl ColumnMap {
    pub fn from_headers(headers: &StringRecord, layout: &CsvLayout) -> Result<Self> {
        let required = layout.min_columns();
        if headers.len() < required {
            return Err(Error::Shape(format!(
                "header has {} columns, expected at least {}",
                headers.len(),
                required
            )));
        }

        let mut identity = [0usize; 8];
        for (slot, spec) in identity.iter_mut().zip(layout.identity_columns()) {
            *slot = find_column(headers, spec)?;
        }

        let block = layout.category_offset..layout.category_offset + layout.category_count;
        if let Some(overlap) = identity.iter().find(|idx| block.contains(*idx)) {
            return Err(Error::Shape(format!(
                "column {} ({}) lies inside the category flag block",
                overlap,
                headers.get(*overlap).unwrap_or_default().trim()
            )));
        }

        let categories: Vec<String> = headers
            .iter()
            .skip(layout.category_offset)
            .take(layout.category_count)
            .map(|name| name.trim().to_string())
            .collect();
        if let Some(blank) = categories.iter().position(|name| name.is_empty()) {
            return Err(Error::Shape(format!(
                "category header at column {} is blank",
                layout.category_offset + blank
            )));
        }

        Ok(Self {
            width: headers.len(),
            identity,
            category_offset: layout.category_offset,
            categories,
        })
    }

    /// Category names in header order.
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Maps one data row; `line` is used for error reporting only.
    pub fn map_row(&self, record: &StringRecord, line: u64) -> Result<StagingRecord> {
        if record.len() != self.width {
            return Err(Error::Shape(format!(
                "line {} has {} fields, header has {}",
                line,
                record.len(),
                self.width
            )));
        }

        let field = |slot: usize| value(record.get(self.identity[slot]));

        let id = field(0)
            .ok_or_else(|| Error::MalformedRow {
                line,
                reason: "missing market id".into(),
            })?
            .parse::<i64>()
            .map_err(|e| Error::MalformedRow {
                line,
                reason: format!("market id is not an integer: {e}"),
            })?;

        let selected: Vec<&str> = self
            .categories
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                value(record.get(self.category_offset + i)).as_deref() == Some(FLAG_SET)
            })
            .map(|(_, name)| name.as_str())
            .collect();

        Ok(StagingRecord {
            id,
            market_name: field(1),
            street: field(2),
            city: field(3),
            state: field(4),
            zip: field(5),
            x: coordinate(field(6), "x", line),
            y: coordinate(field(7), "y", line),
            categories: selected.join(CATEGORY_DELIMITER),
        })
    }
}

fn find_column(headers: &StringRecord, spec: &ColumnSpec) -> Result<usize> {
    let idx = headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(&spec.name))
        .ok_or_else(|| Error::Shape(format!("missing column {:?}", spec.name)))?;
    if idx != spec.position {
        log::warn!(
            "Column {:?} found at position {} instead of {}",
            spec.name,
            idx,
            spec.position
        );
    }
    Ok(idx)
}

/// Blank or whitespace-only cells carry no value.
fn value(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn coordinate(raw: Option<String>, axis: &str, line: u64) -> Option<f64> {
    let raw = raw?;
    match raw.parse::<f64>() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("Line {line}: ignoring unparsable {axis} coordinate {raw:?}");
            None
        }
    }
}

/// Splits a pipe-delimited category list into its non-empty names.
pub fn split_categories(list: &str) -> impl Iterator<Item = &str> {
    list.split(CATEGORY_DELIMITER).filter(|token| !token.is_empty())
}
