mod banner;
mod config;
mod error;
mod layout;
mod locator;
mod logging;
mod login;
mod platform;
mod process;
mod retry;
mod session;
mod sleep;
mod warning;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use serde_json::json;
use tracing::{info, warn};

use crate::config::{Config, LoadStatus, DEFAULT_CONFIG_FILE};
use crate::layout::resources_dir;
use crate::locator::TemplateCache;
use crate::login::Credentials;
use crate::process::SystemProcesses;
use crate::session::{Gate, Session};
use crate::sleep::ThreadSleeper;

#[derive(Parser, Debug)]
#[command(
    name = "easinote-login",
    version,
    about = "Restart EasiNote and log in automatically"
)]
struct Cli {
    /// Configuration file, created with defaults when missing
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Restart EasiNote and log in with the given account
    Login(LoginArgs),
    /// Skip the next login run
    Skip,
    /// Print the effective configuration as JSON
    Config,
    /// Search the screen once for a template image and report the match
    Locate(LocateArgs),
    /// Run the scrolling warning banner (started by `login`)
    #[command(hide = true)]
    Banner(BannerArgs),
}

#[derive(Args, Debug)]
struct LoginArgs {
    /// Account name
    #[arg(short, long)]
    account: String,
    /// Account password
    #[arg(short, long)]
    password: String,
}

#[derive(Args, Debug)]
struct LocateArgs {
    /// Template PNG, absolute or relative to the resources directory
    template: PathBuf,
    /// Minimum score to count as found (default: login.confidence)
    #[arg(long)]
    confidence: Option<f32>,
    /// Print the result as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(Args, Debug)]
struct BannerArgs {
    #[arg(long)]
    text: Option<String>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // The banner child must not touch the config file.
    if let Commands::Banner(args) = &cli.command {
        return command_banner(args.text.clone());
    }

    let (config, status) = Config::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    logging::init(&config.app.log_level);
    if status == LoadStatus::Created {
        warn!(
            "config file {} did not exist, wrote defaults",
            cli.config.display()
        );
    }

    match cli.command {
        Commands::Login(args) => command_login(config, &cli.config, args),
        Commands::Skip => command_skip(config, &cli.config),
        Commands::Config => command_config(&config),
        Commands::Locate(args) => command_locate(&config, args),
        Commands::Banner(_) => Ok(()),
    }
}

fn command_login(mut config: Config, path: &Path, args: LoginArgs) -> Result<()> {
    let prompt = warning::system_prompt();
    match session::preflight(&mut config, path, prompt.as_ref())? {
        Gate::Proceed => {}
        Gate::Skipped | Gate::Cancelled => return Ok(()),
    }

    let _banner = if config.banner.enabled {
        banner::spawn(&config.banner.text)
    } else {
        None
    };

    let resources = resources_dir(config.app.resources_dir.as_deref());
    info!(resources = %resources.display(), "template directory");
    let session = Session::new(&config.login, &resources);
    let credentials = Credentials {
        account: args.account,
        password: args.password,
    };

    let mut processes = SystemProcesses;
    let mut desktop = platform::create_desktop();
    let anchor = session
        .run(
            &config.app,
            &mut processes,
            &mut desktop,
            &ThreadSleeper,
            &credentials,
        )
        .context("EasiNote login failed")?;
    info!(x = anchor.x, y = anchor.y, "login finished");
    Ok(())
}

fn command_skip(mut config: Config, path: &Path) -> Result<()> {
    config
        .request_skip(path)
        .context("failed to record skip request")?;
    println!("next login will be skipped");
    Ok(())
}

fn command_config(config: &Config) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

fn command_locate(config: &Config, args: LocateArgs) -> Result<()> {
    let path = if args.template.is_absolute() || args.template.exists() {
        args.template
    } else {
        resources_dir(config.app.resources_dir.as_deref()).join(&args.template)
    };
    let confidence = args.confidence.unwrap_or(config.login.confidence);

    let mut cache = TemplateCache::default();
    let template = cache.get(&path)?;
    let screen = platform::create_desktop()
        .capture()
        .context("failed to capture the screen")?;
    let gray = image::imageops::grayscale(&screen);
    let best = locator::best_match(&gray, template, confidence);
    let found = best.as_ref().is_some_and(|m| m.score >= confidence);

    if args.json {
        let payload = json!({
            "template": path.display().to_string(),
            "confidence": confidence,
            "found": found,
            "best": best,
        });
        println!("{}", serde_json::to_string(&payload)?);
    } else if let Some(m) = &best {
        println!(
            "{} center=({}, {}) box=({}, {}, {}x{}) score={:.3}",
            if found { "found" } else { "below confidence" },
            m.center.x,
            m.center.y,
            m.x,
            m.y,
            m.w,
            m.h,
            m.score
        );
    }

    if !found {
        bail!("{} not found at confidence {confidence}", path.display());
    }
    Ok(())
}

fn command_banner(text: Option<String>) -> Result<()> {
    let text = text.unwrap_or_else(|| config::BannerConfig::default().text);
    banner::run(&text).context("banner console closed")
}
