use birdhouse::cli::{Cli, Commands, ReleaseArgs, Target};
use clap::Parser;

fn release(argv: &[&str]) -> ReleaseArgs {
    let mut full = vec!["birdhouse", "release"];
    full.extend_from_slice(argv);
    match Cli::parse_from(full).command {
        Commands::Release(args) => args,
        _ => panic!("expected Release command"),
    }
}

#[test]
fn version_flag_with_and_without_value() {
    // Given / When
    let bare = release(&["-v", "--local"]);
    let explicit = release(&["--version", "1.2.3.4"]);
    let absent = release(&[]);

    // Then
    assert_eq!(bare.set_version, Some(None));
    assert_eq!(bare.target(), Some(Target::Local));
    assert_eq!(explicit.set_version, Some(Some("1.2.3.4".to_string())));
    assert!(explicit.bumps_version());
    assert_eq!(absent.set_version, None);
    assert!(!absent.bumps_version());
}

#[test]
fn markers_imply_a_bump() {
    let args = release(&["--silent"]);
    assert!(args.bumps_version());
    assert!(args.silent && !args.forced);
}

#[test]
fn short_flags_and_aliases() {
    let args = release(&["-p", "-c", "-m", "-b", "--su", "--nl"]);
    assert_eq!(args.target(), Some(Target::Production));
    assert!(args.cache && args.minify && args.backup);
    assert!(args.skip_compress && args.no_log);
}

#[test]
fn exclusive_groups_are_enforced() {
    for argv in [
        ["birdhouse", "release", "-p", "-s"],
        ["birdhouse", "release", "-d", "--rollback"],
        ["birdhouse", "release", "--forced", "--silent"],
    ] {
        assert!(Cli::try_parse_from(argv).is_err(), "{argv:?} should be rejected");
    }
}

#[test]
fn remote_operations_require_a_target() {
    for flag in ["-d", "-b", "--rollback"] {
        let err = Cli::try_parse_from(["birdhouse", "release", flag]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument, "{flag}");
    }
    assert!(release(&["-b", "-s", "-v"]).backup);
    assert!(release(&["--rollback", "-p", "--su"]).rollback);
}

#[test]
fn delete_and_rollback_reject_build_flags() {
    for argv in [
        ["birdhouse", "release", "-l", "-d", "-v"],
        ["birdhouse", "release", "-l", "--rollback", "--forced"],
        ["birdhouse", "release", "-l", "-d", "-m"],
    ] {
        let err = Cli::try_parse_from(argv).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict, "{argv:?}");
    }
}

#[test]
fn icons_without_selection_means_all() {
    match Cli::parse_from(["birdhouse", "icons"]).command {
        Commands::Icons(args) => assert!(args.all_unselected()),
        _ => panic!("expected Icons command"),
    }
    match Cli::parse_from(["birdhouse", "icons", "--app-icons"]).command {
        Commands::Icons(args) => assert!(!args.all_unselected() && args.app_icons),
        _ => panic!("expected Icons command"),
    }
}

#[test]
fn globals_work_after_the_subcommand() {
    let cli = Cli::parse_from(["birdhouse", "info", "--dry-run", "-C", "site"]);
    assert!(cli.dry_run);
    assert_eq!(cli.project_dir, std::path::PathBuf::from("site"));
}

#[test]
fn help_exits_zero() {
    assert_cmd::Command::cargo_bin("birdhouse")
        .unwrap()
        .arg("--help")
        .assert()
        .success();
}
