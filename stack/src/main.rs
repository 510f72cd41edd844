//! EC2 Stack CLI

use clap::{Arg, ArgAction, ArgMatches, Command};
use ec2_stack::{
    aws::{self, Region},
    config::Config,
    instance::MachineImage,
    stack::Stack,
    template::Format,
    Error,
};
use std::path::PathBuf;
use tracing::{error, info, warn};

/// Returns the version of the crate.
pub const fn crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Flag for verbose output
const VERBOSE_FLAG: &str = "verbose";

const SYNTH_CMD: &str = "synth";
const CHECK_CMD: &str = "check";

fn config_arg() -> Arg {
    Arg::new("config")
        .long("config")
        .help("Path to YAML config file (environment variables are used if omitted)")
        .value_parser(clap::value_parser!(PathBuf))
}

fn region_arg() -> Arg {
    Arg::new("region")
        .long("region")
        .help("AWS region to query")
        .value_parser(clap::value_parser!(String))
}

/// Entrypoint for the EC2 Stack CLI
#[tokio::main]
async fn main() -> std::process::ExitCode {
    // Define application
    let matches = Command::new("ec2-stack")
        .version(crate_version())
        .about("Define a single-AZ VPC and EC2 instance as a CloudFormation template.")
        .arg(
            Arg::new(VERBOSE_FLAG)
                .short('v')
                .long(VERBOSE_FLAG)
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new(SYNTH_CMD)
                .about("Build the stack and write its CloudFormation template.")
                .arg(config_arg())
                .arg(
                    Arg::new("format")
                        .long("format")
                        .default_value("json")
                        .help("Template format")
                        .value_parser(Format::VALUES),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .help("Path to write the template to (stdout if omitted)")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("resolve-ami")
                        .long("resolve-ami")
                        .help("Pin the instance to the latest Amazon Linux AMI instead of resolving it at deploy time")
                        .requires("region")
                        .action(ArgAction::SetTrue),
                )
                .arg(region_arg()),
        )
        .subcommand(
            Command::new(CHECK_CMD)
                .about("Build the stack and check the image, key pair and CIDR against an account.")
                .arg(config_arg())
                .arg(region_arg().required(true)),
        )
        .get_matches();

    // Create logger
    let level = if matches.get_flag(VERBOSE_FLAG) {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    // Parse subcommands
    match matches.subcommand() {
        Some((SYNTH_CMD, matches)) => {
            if let Err(e) = synth(matches).await {
                error!(error=?e, "failed to synthesize stack");
            } else {
                return std::process::ExitCode::SUCCESS;
            }
        }
        Some((CHECK_CMD, matches)) => {
            if let Err(e) = check(matches).await {
                error!(error=?e, "failed to check stack");
            } else {
                return std::process::ExitCode::SUCCESS;
            }
        }
        Some((cmd, _)) => {
            error!(cmd, "invalid subcommand");
        }
        None => {
            error!("no subcommand provided");
        }
    }
    std::process::ExitCode::FAILURE
}

/// Loads the configuration from `--config` or the environment
fn load_config(matches: &ArgMatches) -> Result<Config, Error> {
    match matches.get_one::<PathBuf>("config") {
        Some(path) => {
            let config = Config::from_file(path)?;
            info!(path = ?path, "loaded configuration file");
            Ok(config)
        }
        None => {
            let config = Config::from_env()?;
            info!("loaded configuration from environment");
            Ok(config)
        }
    }
}

/// Writes the template of the configured stack
async fn synth(matches: &ArgMatches) -> Result<(), Error> {
    let config = load_config(matches)?;
    let mut stack = Stack::new(&config)?;

    if matches.get_flag("resolve-ami") {
        if let Some(region) = matches.get_one::<String>("region") {
            let client = aws::create_client(Region::new(region.clone())).await;
            let ami = aws::find_latest_ami(&client).await?;
            info!(ami = ami.as_str(), region = region.as_str(), "pinned image");
            stack = stack.with_image(MachineImage::Pinned(ami));
        }
    }

    let format: Format = matches
        .get_one::<String>("format")
        .map(|format| format.parse())
        .transpose()?
        .unwrap_or_default();
    let rendered = format.render(&stack.synth()?)?;
    match matches.get_one::<PathBuf>("output") {
        Some(path) => {
            std::fs::write(path, rendered)?;
            info!(path = ?path, %format, "wrote template");
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

/// Verifies that the configured stack can be deployed in the given region
async fn check(matches: &ArgMatches) -> Result<(), Error> {
    let config = load_config(matches)?;
    Stack::new(&config)?;
    let region = matches
        .get_one::<String>("region")
        .cloned()
        .unwrap_or_default();
    let client = aws::create_client(Region::new(region.clone())).await;

    let (ami, key_exists, vpcs) = futures::try_join!(
        aws::find_latest_ami(&client),
        aws::key_pair_exists(&client, &config.key_name),
        aws::find_conflicting_vpcs(&client, &config.cidr),
    )?;
    info!(ami = ami.as_str(), region = region.as_str(), "found image");
    if !key_exists {
        return Err(Error::KeyPairNotFound(config.key_name));
    }
    info!(key = config.key_name.as_str(), "found key pair");
    for vpc in &vpcs {
        warn!(
            vpc = vpc.as_str(),
            cidr = %config.cidr,
            "existing VPC uses the same CIDR"
        );
    }
    info!(region = region.as_str(), "stack can be deployed");
    Ok(())
}
