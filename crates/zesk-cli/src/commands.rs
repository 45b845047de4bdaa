//! Subcommand execution.

use crate::formatter::Formatter;
use crate::{Args, Command};
use tracing::{debug, info};
use zesk_core::{Application, Bootstrap, Result, StorageConfig};

/// Read the bootstrap file, if any, and apply command-line overrides.
pub fn load_bootstrap(args: &Args) -> Result<Bootstrap> {
    let mut bootstrap = match &args.bootstrap {
        Some(path) => {
            debug!(path = %path.display(), "loading bootstrap");
            Bootstrap::from_file(path)?
        }
        None => Bootstrap::default(),
    };

    if let Some(path) = &args.data {
        bootstrap.config.storage = StorageConfig::sled(path);
    }
    if let Some(prefix) = &args.table_prefix {
        bootstrap.config.table_prefix = prefix.clone();
    }

    Ok(bootstrap)
}

/// Build the application and run one subcommand against it.
pub fn execute(bootstrap: Bootstrap, command: &Command, formatter: &dyn Formatter) -> Result<String> {
    let mut app = Application::from_bootstrap(bootstrap)?;
    info!(
        modules = app.modules().len(),
        classes = app.classes().len(),
        "bootstrap loaded"
    );

    let output = match command {
        Command::Classes => {
            let classes: Vec<_> = app
                .classes()
                .class_names()
                .iter()
                .filter_map(|class| app.classes().get(class))
                .collect();
            formatter.format_classes(&classes)
        }
        Command::Modules => formatter.format_modules(&app.modules().modules()),
        Command::Routes => formatter.format_routes(&app.modules().routes()),
        Command::Check => {
            app.boot()?;
            let problems: Vec<String> = app.classes().check().iter().map(|e| e.to_string()).collect();
            formatter.format_problems(&problems)
        }
        Command::Get { class, id } => {
            let instance = app.fetch(class, id.as_str())?;
            formatter.format_instance(&instance)
        }
    };

    app.shutdown()?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::JsonFormatter;
    use clap::Parser;
    use zesk_core::{ClassDescriptor, ColumnType, HasMany, ModuleManifest, Route};

    fn bootstrap() -> Bootstrap {
        Bootstrap {
            modules: vec![ModuleManifest::new("Notes")
                .with_version("2.1")
                .with_class(
                    ClassDescriptor::new("Note")
                        .with_column("id", ColumnType::Id)
                        .with_column("body", ColumnType::String)
                        .with_has_many("tags", HasMany::new("Tag", "")),
                )
                .with_route(Route::new("notes", "Controller_Note").with_weight(5))
                .with_route(Route::new("notes/{id}", "Controller_Note"))],
            ..Default::default()
        }
    }

    fn run_json(command: Command) -> serde_json::Value {
        let output = execute(bootstrap(), &command, &JsonFormatter).unwrap();
        serde_json::from_str(&output).unwrap()
    }

    #[test]
    fn test_parse_args() {
        let args = Args::try_parse_from(["zesk", "--format", "json", "get", "Note", "7"]).unwrap();
        assert_eq!(args.format, crate::formatter::OutputFormat::Json);
        assert_eq!(
            args.command,
            Command::Get {
                class: "Note".to_string(),
                id: "7".to_string()
            }
        );
    }

    #[test]
    fn test_overrides_apply() {
        let args =
            Args::try_parse_from(["zesk", "--data", "/tmp/zesk", "--table-prefix", "z_", "classes"])
                .unwrap();
        let bootstrap = load_bootstrap(&args).unwrap();
        assert_eq!(bootstrap.config.table_prefix, "z_");
        assert_eq!(bootstrap.config.storage, StorageConfig::sled("/tmp/zesk"));
    }

    #[test]
    fn test_classes_and_routes() {
        let classes = run_json(Command::Classes);
        assert_eq!(classes[0]["class"], "Note");
        assert_eq!(classes[0]["table"], "Note");

        let routes = run_json(Command::Routes);
        assert_eq!(routes[0]["path"], "notes/{id}");
        assert_eq!(routes[1]["weight"], 5);
    }

    #[test]
    fn test_check_reports_unresolved_relation() {
        let check = run_json(Command::Check);
        assert_eq!(check["ok"], false);
        assert!(check["problems"][0].as_str().unwrap().contains("Tag"));
    }

    #[test]
    fn test_get_missing_row() {
        let command = Command::Get {
            class: "Note".to_string(),
            id: "1".to_string(),
        };
        assert!(execute(bootstrap(), &command, &JsonFormatter).is_err());
    }
}
