use anyhow::Context;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use dpac_core::{
    rules::host_from_url, Config, ConfigLoader, ConfigValidator, NetworkRouter, PacServer,
    PacServerConfig, PacService, RuleSet, SystemHost,
};
use std::io::Write;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

#[derive(Parser, Debug)]
#[command(name = "dpac")]
#[command(about = "Dynamic proxy auto-config: per-client PAC scripts and proxy decisions")]
#[command(version)]
struct Args {
    /// Config file path
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Network table mapping client networks to PAC files
    #[arg(long, short = 'n', global = true)]
    networks: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    // Optional: a bare run inside a CGI environment acts as `cgi`
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the proxy decision for a URL
    Decide {
        url: String,

        /// Host to evaluate (default: taken from the URL)
        #[arg(long)]
        host: Option<String>,

        /// Rule profile (default: common.default_profile)
        #[arg(long, short = 'p')]
        profile: Option<String>,

        /// Local address used by my_ip rules
        #[arg(long)]
        my_ip: Option<Ipv4Addr>,
    },

    /// Print the PAC script generated from a profile
    Render {
        #[arg(long, short = 'p')]
        profile: Option<String>,
    },

    /// Act as a CGI program, serving the PAC for $REMOTE_ADDR
    Cgi,

    /// Serve PAC scripts over HTTP
    Serve {
        #[arg(long, short = 'l', default_value = "127.0.0.1:8080")]
        listen: SocketAddr,
    },

    /// Validate the configuration and list profiles and routes
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let Some(command) = command_or_cgi(args.command, in_cgi_environment()) else {
        Args::command()
            .error(
                ErrorKind::MissingSubcommand,
                "a subcommand is required outside a CGI environment",
            )
            .exit()
    };

    let config = ConfigLoader::load_or_default(args.config.clone())?;

    // Initialize logging on stderr; stdout carries PAC output
    let level = if args.verbose || config.common.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let env_filter = match std::env::var("DPAC_LOG") {
        Ok(filter) => EnvFilter::new(filter),
        Err(_) => EnvFilter::from_default_env().add_directive(level.into()),
    };
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match command {
        Command::Decide {
            url,
            host,
            profile,
            my_ip,
        } => {
            let rules = load_profile(&config, profile)?;
            let host = match host {
                Some(host) => host,
                None => host_from_url(&url)?,
            };
            let env = SystemHost::new().with_my_ip(my_ip.or(config.common.my_ip));
            println!("{}", rules.decide(&url, &host, &env));
        }
        Command::Render { profile } => {
            let rules = load_profile(&config, profile)?;
            print!("{}", rules.to_script());
        }
        Command::Cgi => {
            let service = build_service(&config, args.networks)?;
            let remote = std::env::var("REMOTE_ADDR").context(
                "unable to get client's address from environment variable \"REMOTE_ADDR\"",
            )?;
            let doc = service.document_for_addr(&remote)?;

            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&doc.to_cgi())?;
            stdout.flush()?;
        }
        Command::Serve { listen } => {
            let service = build_service(&config, args.networks)?;
            let server = PacServer::new(PacServerConfig {
                listen,
                service: Arc::new(service),
            });
            server.start().await?;
        }
        Command::Check => {
            ConfigValidator::validate(&config)?;
            let router = select_router(&config, args.networks)?;

            println!("default profile: {}", config.common.default_profile);
            for (name, profile) in &config.profiles {
                println!(
                    "profile {}: {} rules, fallback {}",
                    name,
                    profile.rules.len(),
                    profile.fallback.join("; ")
                );
            }
            for route in router.routes() {
                println!("route {} -> {}", route.network, route.target);
            }
        }
    }

    Ok(())
}

/// A web server runs CGI programs without arguments
fn command_or_cgi(command: Option<Command>, cgi: bool) -> Option<Command> {
    match command {
        Some(command) => Some(command),
        None if cgi => Some(Command::Cgi),
        None => None,
    }
}

fn in_cgi_environment() -> bool {
    std::env::var_os("GATEWAY_INTERFACE").is_some() || std::env::var_os("REMOTE_ADDR").is_some()
}

fn load_profile(config: &Config, profile: Option<String>) -> anyhow::Result<RuleSet> {
    let name = profile.unwrap_or_else(|| config.common.default_profile.clone());
    Ok(RuleSet::from_profile(&name, &config.profiles)?)
}

fn build_service(config: &Config, networks: Option<PathBuf>) -> anyhow::Result<PacService> {
    let router = select_router(config, networks)?;
    Ok(PacService::new(config, router)?)
}

/// Routes come from, in order: --networks, `<program>.conf` in the
/// working directory, the config's `[[networks]]`
fn select_router(config: &Config, networks: Option<PathBuf>) -> anyhow::Result<NetworkRouter> {
    let table = networks.or_else(|| {
        let path = default_table_path()?;
        path.exists().then_some(path)
    });

    match table {
        Some(path) => {
            tracing::debug!("Using network table {:?}", path);
            Ok(NetworkRouter::load_table(&path)?)
        }
        None => Ok(NetworkRouter::from_config(config)?),
    }
}

fn default_table_path() -> Option<PathBuf> {
    let argv0 = std::env::args_os().next()?;
    let name = Path::new(&argv0).file_name()?.to_string_lossy().into_owned();
    Some(PathBuf::from(format!("{name}.conf")))
}
