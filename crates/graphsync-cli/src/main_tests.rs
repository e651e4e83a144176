//! CLI argument parsing tests

use clap::{CommandFactory, Parser};

use crate::{Cli, Commands, ConfigAction, OutputFormat};

#[test]
fn test_cli_definition_is_valid() {
    Cli::command().debug_assert();
}

#[test]
fn test_parse_ingest() {
    let cli = Cli::try_parse_from([
        "graphsync",
        "ingest",
        "notes.md",
        "--id",
        "contract-7",
        "--modified-at",
        "2024-02-01T00:00:00Z",
    ])
    .unwrap();

    match cli.command {
        Commands::Ingest {
            files,
            id,
            modified_at,
        } => {
            assert_eq!(files.len(), 1);
            assert_eq!(id.as_deref(), Some("contract-7"));
            assert_eq!(
                modified_at.unwrap().to_rfc3339(),
                "2024-02-01T00:00:00+00:00"
            );
        }
        _ => panic!("expected ingest"),
    }
}

#[test]
fn test_ingest_requires_a_file() {
    assert!(Cli::try_parse_from(["graphsync", "ingest"]).is_err());
}

#[test]
fn test_ingest_rejects_bad_timestamp() {
    let result = Cli::try_parse_from([
        "graphsync",
        "ingest",
        "a.md",
        "--modified-at",
        "last tuesday",
    ]);
    assert!(result.is_err());
}

#[test]
fn test_parse_reconcile_flags() {
    let cli = Cli::try_parse_from(["graphsync", "reconcile", "--limit", "5", "--watch"]).unwrap();
    match cli.command {
        Commands::Reconcile {
            limit,
            watch,
            interval,
        } => {
            assert_eq!(limit, Some(5));
            assert!(watch);
            assert_eq!(interval, None);
        }
        _ => panic!("expected reconcile"),
    }
}

#[test]
fn test_global_format_flag() {
    let cli = Cli::try_parse_from(["graphsync", "status", "--format", "json"]).unwrap();
    assert_eq!(cli.format, OutputFormat::Json);
    assert!(matches!(cli.command, Commands::Status { document_id: None }));

    let cli = Cli::try_parse_from(["graphsync", "-q", "episodes", "doc-1", "--all"]).unwrap();
    assert!(cli.quiet);
    assert!(matches!(cli.command, Commands::Episodes { all: true, .. }));
}

#[test]
fn test_parse_config_set() {
    let cli =
        Cli::try_parse_from(["graphsync", "config", "set", "sync.max_attempts", "5"]).unwrap();
    match cli.command {
        Commands::Config {
            action: ConfigAction::Set { key, value },
        } => {
            assert_eq!(key, "sync.max_attempts");
            assert_eq!(value, "5");
        }
        _ => panic!("expected config set"),
    }
}

#[test]
fn test_reconcile_interval_must_be_positive() {
    assert!(Cli::try_parse_from(["graphsync", "reconcile", "--watch", "--interval", "0"]).is_err());

    let cli =
        Cli::try_parse_from(["graphsync", "reconcile", "--watch", "--interval", "30"]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::Reconcile {
            interval: Some(30),
            ..
        }
    ));
}
