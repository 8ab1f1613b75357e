use crate::manifest::{CatalogEntry, ExtractionStrategy};
use serde::Deserialize;
use std::{fs, path::Path};
use toml_edit::{ArrayOfTables, DocumentMut, Item, Table, value};

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Key under which the most recent result is saved and loaded.
    #[serde(default = "default_result_key")]
    pub result_key: String,
    #[serde(default)]
    pub parser: ParserSection,
}

fn default_db_path() -> String {
    "conferencia/results.db".to_string()
}

fn default_result_key() -> String {
    "resultadoConferencia".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParserSection {
    #[serde(default = "default_strategies")]
    pub strategies: Vec<ExtractionStrategy>,
    /// How many characters after a catalog hit the fallback looks at.
    #[serde(default = "default_catalog_window")]
    pub catalog_window: usize,
    #[serde(default)]
    pub catalog: Vec<CatalogEntry>,
}

fn default_strategies() -> Vec<ExtractionStrategy> {
    ExtractionStrategy::ALL.to_vec()
}

fn default_catalog_window() -> usize {
    600
}

impl Default for ParserSection {
    fn default() -> Self {
        Self {
            strategies: default_strategies(),
            catalog_window: default_catalog_window(),
            catalog: Vec::new(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            result_key: default_result_key(),
            parser: ParserSection::default(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Like [`Config::load`], but a missing file means defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Append a `[[parser.catalog]]` entry, keeping the rest of the file intact.
    pub fn add_catalog_entry(
        path: impl AsRef<Path>,
        entry: &CatalogEntry,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let content = if path.as_ref().exists() {
            fs::read_to_string(&path)?
        } else {
            String::new()
        };
        let mut doc = content.parse::<DocumentMut>()?;

        if !doc.contains_key("parser") {
            doc["parser"] = Item::Table(Table::new());
        }
        let parser = doc["parser"]
            .as_table_mut()
            .ok_or("`parser` must be a table")?;
        if !parser.contains_key("catalog") {
            parser.insert("catalog", Item::ArrayOfTables(ArrayOfTables::new()));
        }
        let catalog = parser["catalog"]
            .as_array_of_tables_mut()
            .ok_or("`parser.catalog` must be an array of tables")?;

        let mut table = Table::new();
        table["code"] = value(entry.code.as_str());
        table["name"] = value(entry.name.as_str());
        catalog.push(table);

        fs::write(&path, doc.to_string())?;
        Ok(())
    }
}
