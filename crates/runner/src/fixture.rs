//! Declarative scenario fixtures
//!
//! One YAML (or JSON) file describes one scenario:
//!
//! ```yaml
//! name: order lookup
//! reset:
//!   - { schema: public, table: orders }
//! setup:
//!   - schema: public
//!     table: orders
//!     body:
//!       - { id: 1, status: NEW }
//! execute:
//!   method: GET
//!   path: /orders/1
//! verification:
//!   httpStatus: 200
//!   result: { isCheck: true, excludes: [updatedAt] }
//!   tables:
//!     - { schema: public, table: orders, excludes: [] }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use apitest_common::{Request, Row, TableRef};

use crate::diff::ExcludePath;
use crate::error::{FixtureError, RunnerError, RunnerResult};

const FIXTURE_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Source identity of a scenario: the fixture file name up to its first `.`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScenarioId {
    key: String,
    file_name: String,
}

impl ScenarioId {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            file_name: key.clone(),
            key,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, FixtureError> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let key = file_name.split('.').next().unwrap_or_default().to_string();
        if key.is_empty() {
            return Err(FixtureError::Invalid {
                id: path.display().to_string(),
                reason: "file name has no stem".to_string(),
            });
        }
        Ok(Self { key, file_name })
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// A settings entry names this scenario by identity or by full file name
    pub fn matches(&self, entry: &str) -> bool {
        entry == self.key || entry == self.file_name
    }
}

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Rows to insert into one table before execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedItem {
    pub schema: String,
    pub table: String,
    #[serde(default)]
    pub body: Vec<Row>,
}

impl SeedItem {
    pub fn target(&self) -> TableRef {
        TableRef::new(&self.schema, &self.table)
    }
}

/// Response body check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ResultCheck {
    #[serde(default)]
    pub is_check: bool,
    #[serde(default)]
    pub excludes: Vec<ExcludePath>,
}

/// Table contents check after execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableCheck {
    pub schema: String,
    pub table: String,
    #[serde(default)]
    pub excludes: Vec<ExcludePath>,
}

impl TableCheck {
    pub fn target(&self) -> TableRef {
        TableRef::new(&self.schema, &self.table)
    }
}

/// Expectations for one scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Verification {
    pub http_status: u16,
    #[serde(default)]
    pub result: Option<ResultCheck>,
    #[serde(default)]
    pub tables: Vec<TableCheck>,
}

impl Verification {
    pub fn checks_body(&self) -> bool {
        self.result.as_ref().map(|r| r.is_check).unwrap_or(false)
    }
}

/// On-disk shape; identity comes from the file, not from its contents
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct FixtureFile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    reset: Vec<TableRef>,
    #[serde(default)]
    setup: Vec<SeedItem>,
    execute: Request,
    verification: Verification,
}

/// One test scenario, immutable once loaded
#[derive(Debug, Clone, PartialEq)]
pub struct Fixture {
    pub id: ScenarioId,
    pub name: String,
    pub description: String,
    pub reset: Vec<TableRef>,
    pub setup: Vec<SeedItem>,
    pub execute: Request,
    pub verification: Verification,
    pub source: Option<PathBuf>,
}

impl Fixture {
    /// Load and validate the fixture at `path`
    pub fn load(path: &Path) -> Result<Self, FixtureError> {
        let id = ScenarioId::from_path(path)?;
        let content = std::fs::read_to_string(path).map_err(|source| FixtureError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: FixtureFile =
            serde_yaml::from_str(&content).map_err(|source| FixtureError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let mut fixture = Self::from_file(id, file)?;
        fixture.source = Some(path.to_path_buf());
        Ok(fixture)
    }

    /// Parse fixture text under an explicit identity
    pub fn from_yaml(id: ScenarioId, yaml: &str) -> Result<Self, FixtureError> {
        let file: FixtureFile = serde_yaml::from_str(yaml).map_err(|source| FixtureError::Parse {
            path: PathBuf::from(id.file_name()),
            source,
        })?;
        Self::from_file(id, file)
    }

    fn from_file(id: ScenarioId, file: FixtureFile) -> Result<Self, FixtureError> {
        let invalid = |reason: String| FixtureError::Invalid {
            id: id.to_string(),
            reason,
        };

        if !file.execute.path.starts_with('/') {
            return Err(invalid(format!(
                "execute.path must start with '/': {:?}",
                file.execute.path
            )));
        }
        if !(100..=599).contains(&file.verification.http_status) {
            return Err(invalid(format!(
                "verification.httpStatus out of range: {}",
                file.verification.http_status
            )));
        }

        let targets = file
            .reset
            .iter()
            .cloned()
            .chain(file.setup.iter().map(SeedItem::target))
            .chain(file.verification.tables.iter().map(TableCheck::target));
        for target in targets {
            if target.schema.trim().is_empty() || target.table.trim().is_empty() {
                return Err(invalid(format!("empty schema or table name in {:?}", target)));
            }
        }

        let name = file
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| id.to_string());

        Ok(Self {
            id,
            name,
            description: file.description,
            reset: file.reset,
            setup: file.setup,
            execute: file.execute,
            verification: file.verification,
            source: None,
        })
    }

    /// Fixture files directly inside `dir`, sorted by file name
    pub fn discover(dir: &Path) -> RunnerResult<Vec<PathBuf>> {
        let mut sources = Vec::new();

        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|source| RunnerError::Discover {
                dir: dir.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            let known = path
                .extension()
                .map(|ext| FIXTURE_EXTENSIONS.iter().any(|e| ext == *e))
                .unwrap_or(false);

            if entry.file_type().is_file() && known && !hidden {
                sources.push(path.to_path_buf());
            }
        }

        Ok(sources)
    }

    /// Human-readable summary of the scenario. Deterministic for a given fixture.
    pub fn render_specification(&self) -> String {
        let mut doc = String::new();

        let _ = writeln!(doc, "# {}\n", self.name);
        if !self.description.trim().is_empty() {
            let _ = writeln!(doc, "{}\n", self.description.trim());
        }
        let _ = writeln!(doc, "- scenario: `{}`\n", self.id);

        doc.push_str("## Reset\n\n");
        if self.reset.is_empty() {
            doc.push_str("_none_\n\n");
        } else {
            doc.push_str("| schema | table |\n| --- | --- |\n");
            for target in &self.reset {
                let _ = writeln!(doc, "| {} | {} |", cell_text(&target.schema), cell_text(&target.table));
            }
            doc.push('\n');
        }

        doc.push_str("## Setup\n\n");
        if self.setup.is_empty() {
            doc.push_str("_none_\n\n");
        }
        for item in &self.setup {
            let _ = writeln!(doc, "### {}\n", item.target());
            render_rows(&mut doc, &item.body);
        }

        doc.push_str("## Request\n\n");
        let _ = writeln!(doc, "- method: `{}`", self.execute.method);
        let _ = writeln!(doc, "- path: `{}`\n", self.execute.path);
        render_pairs(&mut doc, "Headers", self.execute.headers.iter());
        render_pairs(&mut doc, "Query", self.execute.query.iter());
        if let Some(body) = &self.execute.body {
            doc.push_str("Body:\n\n```json\n");
            doc.push_str(&serde_json::to_string_pretty(body).unwrap_or_else(|_| body.to_string()));
            doc.push_str("\n```\n\n");
        }

        doc.push_str("## Expectations\n\n");
        let _ = writeln!(doc, "- HTTP status: `{}`", self.verification.http_status);
        match &self.verification.result {
            Some(result) if result.is_check => {
                let _ = writeln!(
                    doc,
                    "- response body: compared with `{}.golden`{}",
                    self.id,
                    excluding(&result.excludes)
                );
            }
            _ => doc.push_str("- response body: not checked\n"),
        }
        for check in &self.verification.tables {
            let _ = writeln!(
                doc,
                "- table `{}`: compared with `{}-{}-{}.golden`{}",
                check.target(),
                self.id,
                check.schema,
                check.table,
                excluding(&check.excludes)
            );
        }

        doc
    }

    /// Write the rendering, creating parent directories as needed
    pub fn write_specification(&self, path: &Path) -> Result<(), FixtureError> {
        let write_err = |source: std::io::Error| FixtureError::WriteSpecification {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(path, self.render_specification()).map_err(write_err)
    }
}

fn render_rows(doc: &mut String, rows: &[Row]) {
    if rows.is_empty() {
        doc.push_str("_no rows_\n\n");
        return;
    }

    let mut columns: Vec<&str> = Vec::new();
    for row in rows {
        for column in row.keys() {
            if !columns.contains(&column.as_str()) {
                columns.push(column);
            }
        }
    }

    let header: Vec<String> = columns.iter().map(|c| cell_text(c)).collect();
    let _ = writeln!(doc, "| {} |", header.join(" | "));
    let _ = writeln!(doc, "|{}", " --- |".repeat(columns.len()));
    for row in rows {
        let cells: Vec<String> = columns
            .iter()
            .map(|c| row.get(*c).map(cell_value).unwrap_or_default())
            .collect();
        let _ = writeln!(doc, "| {} |", cells.join(" | "));
    }
    doc.push('\n');
}

fn render_pairs<'a>(doc: &mut String, title: &str, pairs: impl Iterator<Item = (&'a String, &'a String)>) {
    let pairs: Vec<_> = pairs.collect();
    if pairs.is_empty() {
        return;
    }
    let _ = writeln!(doc, "{}:\n\n| name | value |\n| --- | --- |", title);
    for (name, value) in pairs {
        let _ = writeln!(doc, "| {} | {} |", cell_text(name), cell_text(value));
    }
    doc.push('\n');
}

fn excluding(excludes: &[ExcludePath]) -> String {
    if excludes.is_empty() {
        return String::new();
    }
    let list: Vec<String> = excludes.iter().map(|e| format!("`{}`", e)).collect();
    format!(" excluding {}", list.join(", "))
}

fn cell_value(value: &Value) -> String {
    match value {
        Value::String(s) => cell_text(s),
        other => cell_text(&other.to_string()),
    }
}

fn cell_text(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', "<br>")
}
