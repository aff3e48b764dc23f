use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Header name and documented position of one identity/address column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub position: usize,
}

impl ColumnSpec {
    fn new(name: &str, position: usize) -> Self {
        Self {
            name: name.to_string(),
            position,
        }
    }
}

/// Shape of the market export. Identity columns are looked up by name; the
/// category flag block is a contiguous run of columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsvLayout {
    pub id: ColumnSpec,
    pub market_name: ColumnSpec,
    pub street: ColumnSpec,
    pub city: ColumnSpec,
    pub state: ColumnSpec,
    pub zip: ColumnSpec,
    pub x: ColumnSpec,
    pub y: ColumnSpec,
    #[serde(default = "default_category_offset")]
    pub category_offset: usize,
    #[serde(default = "default_category_count")]
    pub category_count: usize,
}

impl Default for CsvLayout {
    fn default() -> Self {
        Self {
            id: ColumnSpec::new("FMID", 0),
            market_name: ColumnSpec::new("MarketName", 1),
            street: ColumnSpec::new("street", 7),
            city: ColumnSpec::new("city", 8),
            state: ColumnSpec::new("State", 10),
            zip: ColumnSpec::new("zip", 11),
            x: ColumnSpec::new("x", 20),
            y: ColumnSpec::new("y", 21),
            category_offset: default_category_offset(),
            category_count: default_category_count(),
        }
    }
}

fn default_category_offset() -> usize {
    28
}

fn default_category_count() -> usize {
    30
}

impl CsvLayout {
    /// Minimum number of columns a header must carry for this layout.
    pub fn min_columns(&self) -> usize {
        self.identity_columns()
            .iter()
            .map(|spec| spec.position + 1)
            .chain(std::iter::once(self.category_offset + self.category_count))
            .max()
            .unwrap_or(0)
    }

    /// Identity columns in staging order: id, name, street, city, state, zip, x, y.
    pub fn identity_columns(&self) -> [&ColumnSpec; 8] {
        [
            &self.id,
            &self.market_name,
            &self.street,
            &self.city,
            &self.state,
            &self.zip,
            &self.x,
            &self.y,
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default)]
    pub layout: CsvLayout,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            page_size: default_page_size(),
            layout: CsvLayout::default(),
        }
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("markets.db")
}

fn default_page_size() -> u32 {
    10
}

impl Settings {
    /// Reads settings from a JSON file; missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&raw)?;
        if settings.page_size == 0 {
            return Err(Error::Config("page_size must be at least 1".into()));
        }
        if settings.layout.category_count == 0 {
            return Err(Error::Config("layout.category_count must be at least 1".into()));
        }
        log::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }
}
