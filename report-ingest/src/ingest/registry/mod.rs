//! Report schema registry
//!
//! Lookup of `ReportSchema` descriptors by type tag. Every version of a
//! report type is kept; lookups by tag alone resolve the highest version.

pub mod builtin;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;

use super::types::{IngestError, ReportSchema};

/// Shape of a TOML schema file: one or more `[[schema]]` tables
#[derive(Debug, Deserialize)]
struct SchemaFile {
    #[serde(default)]
    schema: Vec<ReportSchema>,
}

/// Registered schemas by type tag and version
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, BTreeMap<u32, Arc<ReportSchema>>>,
}

impl SchemaRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in report types
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::new();
        for schema in builtin::builtin_schemas() {
            registry.register(schema)?;
        }
        Ok(registry)
    }

    /// Validate and add a schema, replacing the same type and version
    pub fn register(&mut self, schema: ReportSchema) -> Result<()> {
        schema
            .validate()
            .map_err(|msg| anyhow::anyhow!(msg))
            .with_context(|| format!("Invalid schema '{}' v{}", schema.report_type, schema.version))?;

        let versions = self.schemas.entry(schema.report_type.clone()).or_default();
        if versions.contains_key(&schema.version) {
            log::info!(
                "Overriding schema '{}' v{}",
                schema.report_type,
                schema.version
            );
        }
        versions.insert(schema.version, Arc::new(schema));
        Ok(())
    }

    /// Load `[[schema]]` tables from a TOML string
    pub fn load_toml_str(&mut self, source: &str) -> Result<usize> {
        let file: SchemaFile = toml::from_str(source).context("Failed to parse schema TOML")?;
        let count = file.schema.len();
        for schema in file.schema {
            self.register(schema)?;
        }
        Ok(count)
    }

    /// Load `[[schema]]` tables from a TOML file
    pub fn load_toml(&mut self, path: &Path) -> Result<usize> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read schema file {}", path.display()))?;
        let count = self
            .load_toml_str(&source)
            .with_context(|| format!("Failed to load schemas from {}", path.display()))?;
        log::info!("Loaded {} schemas from {}", count, path.display());
        Ok(count)
    }

    /// Latest version of a report type
    pub fn get(&self, report_type: &str) -> Result<Arc<ReportSchema>, IngestError> {
        self.schemas
            .get(report_type)
            .and_then(|versions| versions.values().next_back())
            .cloned()
            .ok_or_else(|| IngestError::UnknownReportType(report_type.to_string()))
    }

    /// A specific version of a report type
    pub fn get_version(&self, report_type: &str, version: u32) -> Result<Arc<ReportSchema>, IngestError> {
        self.schemas
            .get(report_type)
            .and_then(|versions| versions.get(&version))
            .cloned()
            .ok_or_else(|| IngestError::UnknownReportType(format!("{} v{}", report_type, version)))
    }

    /// Check if a type tag is registered
    pub fn contains(&self, report_type: &str) -> bool {
        self.schemas.contains_key(report_type)
    }

    /// Latest version of every report type
    pub fn latest(&self) -> Vec<Arc<ReportSchema>> {
        self.schemas
            .values()
            .filter_map(|versions| versions.values().next_back().cloned())
            .collect()
    }

    /// Every registered version of every report type
    pub fn all_versions(&self) -> Vec<Arc<ReportSchema>> {
        self.schemas
            .values()
            .flat_map(|versions| versions.values().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REVISED_DIVERSE: &str = r#"
        [[schema]]
        report_type = "diversedaily"
        version = 2
        table = "diverse_daily_reports_v2"
        header_source = "values"
        identifying = ["uploaded_date", "employee_name"]
        mutable = ["reg"]
        expected_headers = ["EMPLOYEE NAME"]

        [[schema.columns]]
        name = "employee_name"
        label = "EMPLOYEE NAME"

        [[schema.columns]]
        name = "reg"
        label = "REG"
        coercion = "NUMERIC_OR_ZERO"
    "#;

    #[test]
    fn test_builtin_registry() {
        let registry = SchemaRegistry::builtin().unwrap();
        assert_eq!(registry.len(), 8);
        assert!(registry.contains("employeeTotal"));
        assert_eq!(registry.get("labor").unwrap().table, "daily_reports");
    }

    #[test]
    fn test_unknown_report_type() {
        let registry = SchemaRegistry::builtin().unwrap();
        let err = registry.get("payroll").unwrap_err();
        assert!(matches!(err, IngestError::UnknownReportType(_)));
        assert!(err.is_input_error());
    }

    #[test]
    fn test_versions_resolve_latest() {
        let mut registry = SchemaRegistry::builtin().unwrap();
        assert_eq!(registry.load_toml_str(REVISED_DIVERSE).unwrap(), 1);

        let latest = registry.get("diversedaily").unwrap();
        assert_eq!(latest.version, 2);
        assert_eq!(latest.identifying, vec!["uploaded_date", "employee_name"]);

        let original = registry.get_version("diversedaily", 1).unwrap();
        assert_eq!(original.identifying, vec!["uploaded_date", "employee_payroll_id"]);
        assert_eq!(registry.all_versions().len(), 9);
        assert_eq!(registry.latest().len(), 8);
    }

    #[test]
    fn test_invalid_schema_rejected() {
        let mut registry = SchemaRegistry::new();
        let bad = r#"
            [[schema]]
            report_type = "bad"
            table = "bad"
            identifying = ["missing"]

            [[schema.columns]]
            name = "a"
            label = "A"
        "#;
        let err = registry.load_toml_str(bad).unwrap_err();
        assert!(format!("{:#}", err).contains("identifying field 'missing'"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_load_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schemas.toml");
        std::fs::write(&path, REVISED_DIVERSE).unwrap();

        let mut registry = SchemaRegistry::new();
        assert_eq!(registry.load_toml(&path).unwrap(), 1);
        assert_eq!(registry.get("diversedaily").unwrap().table, "diverse_daily_reports_v2");
    }
}
