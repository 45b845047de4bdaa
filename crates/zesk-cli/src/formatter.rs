//! Output formatters for registry listings and fetched rows.

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use serde_json::json;
use std::sync::Arc;
use zesk_core::{ClassDescriptor, Member, ModelInstance, Module, Route};

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter: Send + Sync {
    /// Format class descriptors.
    fn format_classes(&self, classes: &[Arc<ClassDescriptor>]) -> String;

    /// Format loaded modules.
    fn format_modules(&self, modules: &[&Module]) -> String;

    /// Format routes with the module that declared them.
    fn format_routes(&self, routes: &[(&str, &Route)]) -> String;

    /// Format the outcome of a relation check.
    fn format_problems(&self, problems: &[String]) -> String;

    /// Format one fetched instance.
    fn format_instance(&self, instance: &ModelInstance) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_classes(&self, classes: &[Arc<ClassDescriptor>]) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Class", "Table", "Id", "Columns", "Relations"]);

        for descriptor in classes {
            table.add_row(vec![
                Cell::new(&descriptor.class),
                Cell::new(&descriptor.table),
                Cell::new(descriptor.id_column.as_deref().unwrap_or("-")),
                Cell::new(descriptor.column_types.len()),
                Cell::new(relation_summary(descriptor)),
            ]);
        }

        format!("{}\n{} class(es)", table, classes.len())
    }

    fn format_modules(&self, modules: &[&Module]) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Module", "Version", "Requires", "Classes", "Routes", "Hooks"]);

        for module in modules {
            table.add_row(vec![
                Cell::new(&module.name),
                Cell::new(module.version.as_deref().unwrap_or("-")),
                Cell::new(module.requires.join(", ")),
                Cell::new(module.model_classes.join(", ")),
                Cell::new(module.routes.len()),
                Cell::new(module.hook_count()),
            ]);
        }

        format!("{}\n{} module(s)", table, modules.len())
    }

    fn format_routes(&self, routes: &[(&str, &Route)]) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Weight", "Path", "Handler", "Module"]);

        for (module, route) in routes {
            table.add_row(vec![
                Cell::new(route.weight),
                Cell::new(&route.path),
                Cell::new(&route.handler),
                Cell::new(module),
            ]);
        }

        format!("{}\n{} route(s)", table, routes.len())
    }

    fn format_problems(&self, problems: &[String]) -> String {
        if problems.is_empty() {
            return "All relations resolve".to_string();
        }

        let mut table = Table::new();
        table.set_header(vec!["Problem"]);
        for problem in problems {
            table.add_row(vec![problem]);
        }
        format!("{}\n{} problem(s)", table, problems.len())
    }

    fn format_instance(&self, instance: &ModelInstance) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Column", "Type", "Value"]);

        let descriptor = instance.descriptor();
        for (column, value) in instance.values() {
            let column_type = descriptor
                .column_type(column)
                .map(|t| t.to_string())
                .unwrap_or_default();
            table.add_row(vec![
                Cell::new(column),
                Cell::new(column_type),
                Cell::new(format_member(value)),
            ]);
        }

        format!("{}\n{}", table, instance.class())
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_classes(&self, classes: &[Arc<ClassDescriptor>]) -> String {
        let descriptors: Vec<&ClassDescriptor> = classes.iter().map(Arc::as_ref).collect();
        to_pretty(&json!(descriptors))
    }

    fn format_modules(&self, modules: &[&Module]) -> String {
        let modules: Vec<serde_json::Value> = modules
            .iter()
            .map(|module| {
                json!({
                    "name": module.name,
                    "version": module.version,
                    "requires": module.requires,
                    "model_classes": module.model_classes,
                    "routes": module.routes,
                    "hooks": module.hook_count(),
                })
            })
            .collect();
        to_pretty(&serde_json::Value::Array(modules))
    }

    fn format_routes(&self, routes: &[(&str, &Route)]) -> String {
        let routes: Vec<serde_json::Value> = routes
            .iter()
            .map(|(module, route)| {
                json!({
                    "module": module,
                    "path": route.path,
                    "handler": route.handler,
                    "weight": route.weight,
                })
            })
            .collect();
        to_pretty(&serde_json::Value::Array(routes))
    }

    fn format_problems(&self, problems: &[String]) -> String {
        to_pretty(&json!({ "ok": problems.is_empty(), "problems": problems }))
    }

    fn format_instance(&self, instance: &ModelInstance) -> String {
        to_pretty(&json!({ "class": instance.class(), "values": instance.to_json() }))
    }
}

fn to_pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// One-line summary of a class's relations, e.g. `person -> Person, notes => Note`.
fn relation_summary(descriptor: &ClassDescriptor) -> String {
    let ones = descriptor
        .has_one
        .iter()
        .map(|(column, target)| format!("{} -> {}", column, target));
    let manys = descriptor
        .has_many
        .iter()
        .map(|(name, many)| format!("{} => {}", name, many.class));
    ones.chain(manys).collect::<Vec<_>>().join(", ")
}

/// Format a member for table display.
fn format_member(member: &Member) -> String {
    match member {
        Member::Null => "NULL".to_string(),
        Member::String(s) => s.clone(),
        other => other.to_json().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zesk_core::{ColumnType, HasMany};

    #[test]
    fn test_relation_summary() {
        let descriptor = ClassDescriptor::new("Contact")
            .with_has_one("person", "Person")
            .with_has_many("notes", HasMany::new("Note", "contact"));
        assert_eq!(relation_summary(&descriptor), "person -> Person, notes => Note");
    }

    #[test]
    fn test_format_member() {
        assert_eq!(format_member(&Member::Null), "NULL");
        assert_eq!(format_member(&Member::from("plain")), "plain");
        assert_eq!(format_member(&Member::Int(42)), "42");
    }

    #[test]
    fn test_problems_output() {
        assert_eq!(TableFormatter.format_problems(&[]), "All relations resolve");

        let json: serde_json::Value =
            serde_json::from_str(&JsonFormatter.format_problems(&["broken".to_string()])).unwrap();
        assert_eq!(json["ok"], false);
        assert_eq!(json["problems"][0], "broken");
    }

    #[test]
    fn test_classes_table_counts() {
        let descriptor = Arc::new(
            ClassDescriptor::new("Person")
                .with_table("people")
                .with_column("id", ColumnType::Id),
        );
        let output = TableFormatter.format_classes(&[descriptor]);
        assert!(output.contains("people"));
        assert!(output.ends_with("1 class(es)"));
    }
}
