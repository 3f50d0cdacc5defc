use super::*;
use clap::CommandFactory;

#[test]
fn verify_cli_args() {
    // Short flag conflicts, duplicate args, and other definition errors.
    Cli::command().debug_assert();
}

#[test]
fn test_run_flags() {
    let cli = Cli::try_parse_from([
        "tf",
        "--project-dir",
        "proj",
        "run",
        "--allow-backfill",
        "--run-id",
        "run_x",
        "--run-timestamp",
        "2024-04-01T08:00:00+08:00",
    ])
    .unwrap();

    assert_eq!(cli.global.project_dir, "proj");
    match cli.command {
        Commands::Run(args) => {
            assert!(args.allow_backfill);
            assert_eq!(args.run_id.as_deref(), Some("run_x"));
            assert_eq!(
                args.run_timestamp.as_deref(),
                Some("2024-04-01T08:00:00+08:00")
            );
        }
        other => panic!("expected run, got {:?}", other),
    }
}

#[test]
fn test_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from(["tf", "ledger", "-v", "-o", "json", "-c", "x.yml"]).unwrap();
    assert!(cli.global.verbose);
    assert_eq!(cli.global.config.as_deref(), Some("x.yml"));
    match cli.command {
        Commands::Ledger(args) => assert_eq!(args.output, LedgerOutput::Json),
        other => panic!("expected ledger, got {:?}", other),
    }
}

#[test]
fn test_validate_defaults() {
    let cli = Cli::try_parse_from(["tf", "validate"]).unwrap();
    match cli.command {
        Commands::Validate(args) => {
            assert_eq!(args.output, ReportOutput::Text);
            assert!(!args.strict);
            assert!(!args.allow_backfill);
        }
        other => panic!("expected validate, got {:?}", other),
    }
}
