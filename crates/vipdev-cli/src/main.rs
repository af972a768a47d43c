use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use tracing_subscriber::EnvFilter;
use vipdev_core::prelude::*;
use vipdev_core::ConfigError;

/// Environment variable overriding the log filter
const LOG_ENV: &str = "VIPDEV_LOG";

fn component_args() -> [Arg; 5] {
    [
        Arg::new("php")
            .short('p')
            .long("php")
            .value_name("php-version")
            .help("Use a specific PHP version (default: 7.3)"),
        Arg::new("wordpress")
            .short('w')
            .long("wordpress")
            .value_name("wordpress")
            .help("Use a specific WordPress version or local directory (default: last stable)"),
        Arg::new("mu-plugins")
            .short('u')
            .long("mu-plugins")
            .value_name("mu-plugins")
            .help("Use a specific mu-plugins changeset or local directory (\"auto\": last commit in master)"),
        Arg::new("jetpack")
            .short('j')
            .long("jetpack")
            .value_name("jetpack")
            .help("Use a specific Jetpack version or local directory (\"mu\": use the version in mu-plugins)"),
        Arg::new("client-code")
            .short('c')
            .long("client-code")
            .value_name("clientcode")
            .help("Use the client code from github or a local directory (default: the VIP skeleton)"),
    ]
}

fn cli() -> Command {
    Command::new("vipdev")
        .version(vipdev_core::VERSION)
        .about("Create and upgrade local VIP Go development environments")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .env("VIPDEV_CONFIG")
                .value_parser(value_parser!(PathBuf))
                .global(true)
                .help("Settings file (default: ./vipdev.toml when present)"),
        )
        .arg(
            Arg::new("root")
                .long("root")
                .value_parser(value_parser!(PathBuf))
                .global(true)
                .help("Directory holding the dev-<slug> instance directories"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .global(true)
                .help("More log output (-v info, -vv debug, -vvv trace)"),
        )
        .subcommand(
            Command::new("create")
                .about("Create a new local development instance")
                .arg(
                    Arg::new("slug")
                        .required(true)
                        .help("Short name used for the lando project and the internal domain"),
                )
                .arg(
                    Arg::new("title")
                        .short('t')
                        .long("title")
                        .help("Title for the WordPress site (default: \"VIP Dev\")"),
                )
                .arg(
                    Arg::new("multisite")
                        .short('m')
                        .long("multisite")
                        .action(ArgAction::SetTrue)
                        .help("Enable multisite install"),
                )
                .arg(
                    Arg::new("site")
                        .short('s')
                        .long("site")
                        .value_name("site_id")
                        .help("Get all options below for a specific site"),
                )
                .args(component_args())
                .arg(
                    Arg::new("no-start")
                        .long("no-start")
                        .action(ArgAction::SetTrue)
                        .help("Don't start the Lando environment, just create it"),
                ),
        )
        .subcommand(
            Command::new("upgrade")
                .about("Upgrade versions for one or more components of a development instance")
                .arg(
                    Arg::new("slug")
                        .required(true)
                        .help("Name of the development instance"),
                )
                .args(component_args()),
        )
}

fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        let level = match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        EnvFilter::new(format!("warn,vipdev_core={level},vipdev={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn string(args: &ArgMatches, id: &str) -> Option<String> {
    args.get_one::<String>(id).cloned()
}

fn selector_args(args: &ArgMatches) -> SelectorArgs {
    SelectorArgs {
        php: string(args, "php"),
        wordpress: string(args, "wordpress"),
        muplugins: string(args, "mu-plugins"),
        jetpack: string(args, "jetpack"),
        clientcode: string(args, "client-code"),
    }
}

fn load_config(matches: &ArgMatches) -> anyhow::Result<VipdevConfig> {
    let explicit = matches.get_one::<PathBuf>("config");
    let mut config = VipdevConfig::load(explicit.map(PathBuf::as_path))
        .context("failed to load vipdev settings")?;
    if let Some(root) = matches.get_one::<PathBuf>("root") {
        config = config.with_root(root);
    }
    Ok(config)
}

async fn run(lifecycle: &Lifecycle, matches: &ArgMatches) -> Result<(), VipdevError> {
    match matches.subcommand() {
        Some(("create", args)) => {
            let slug = string(args, "slug").unwrap_or_default();
            let request = CreateRequest {
                slug,
                title: string(args, "title"),
                multisite: args.get_flag("multisite"),
                site: string(args, "site"),
                selectors: selector_args(args),
                start: !args.get_flag("no-start"),
            };
            let outcome = lifecycle.create(request).await?;
            let dir = outcome.instance_dir.display();
            if outcome.stage == Stage::Started {
                println!("Lando environment created on directory \"{dir}\" and started.");
            } else {
                println!("Lando environment created on directory \"{dir}\".");
                println!("You can cd into that directory and run \"lando start\"");
            }
        }
        Some(("upgrade", args)) => {
            let slug = string(args, "slug").unwrap_or_default();
            let request = UpgradeRequest {
                slug,
                selectors: selector_args(args),
            };
            let outcome = lifecycle.upgrade(request).await?;
            println!("Instance {} upgraded.", outcome.descriptor.site_slug);
        }
        _ => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli().get_matches();
    init_tracing(matches.get_count("verbose"));

    let config = match load_config(&matches) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err:#}");
            return ExitCode::from(ConfigError::EXIT_CODE);
        }
    };

    let lifecycle = Lifecycle::new(&config, Capabilities::from_config(&config));
    match run(&lifecycle, &matches).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => ExitCode::from(report(&err, &mut std::io::stderr())),
    }
}

/// Print a command failure once and pick the exit status
fn report(err: &VipdevError, out: &mut impl Write) -> u8 {
    let _ = writeln!(out, "error: {err}");
    err.exit_code()
}
