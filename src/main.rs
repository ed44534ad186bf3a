use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;

use kiln::config::Config;
use kiln::core::{BuildMode, TaskBody, TaskRegistry};
use kiln::orchestration::{format_elapsed, Runner};
use kiln::steps::default_registry;
use kiln::tools::Toolchain;
use kiln::{klog, klog_debug, klog_error, Error, Result};

/// How long an interrupted run may take to wind down.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Kiln - front-end asset pipeline: stylesheets, scripts, fonts and a dev server
#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(version, about, long_about = None)]
#[command(disable_help_subcommand = true)]
#[command(after_help = "ENVIRONMENT:\n    KILN_DEBUG=1     Enable debug logging (alternative to --debug)")]
pub struct Cli {
    /// Annotate and minify scripts, compress stylesheets
    #[arg(long, global = true)]
    pub production: bool,

    /// Enable debug logging
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    /// Project root (defaults to the current directory)
    #[arg(short = 'C', long, global = true)]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Build the design and the JavaScript together
    Build,

    /// Compile, bless and inject the stylesheets
    BuildSass,

    /// Lint, bundle and inject the scripts
    BuildJs,

    /// Rebuild on source changes until Ctrl-C
    Watch,

    /// Copy the icon fonts
    Fonts,

    /// Serve the output directory with live-reload
    Webserver,

    /// List the available commands
    Help,

    /// Run any registered task
    Run {
        /// Task name, e.g. `compile`
        task: String,
    },

    /// List every registered task
    Tasks,
}

impl Command {
    /// Registry task the command runs, if any.
    fn task_name(&self) -> Option<&str> {
        match self {
            Command::Build => Some("build"),
            Command::BuildSass => Some("build-sass"),
            Command::BuildJs => Some("build-js"),
            Command::Watch => Some("watch"),
            Command::Fonts => Some("fonts"),
            Command::Webserver => Some("webserver"),
            Command::Help => Some("help"),
            Command::Run { task } => Some(task.as_str()),
            Command::Tasks => None,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    kiln::log::init_with_debug(cli.debug);

    if let Err(e) = run(cli) {
        if !e.is_reported() {
            klog_error!("{}", e);
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let registry = default_registry()?;
    if cli.command == Some(Command::Tasks) {
        print_tasks(&registry)?;
        return Ok(());
    }

    let task = cli
        .command
        .as_ref()
        .and_then(Command::task_name)
        .unwrap_or("default")
        .to_string();
    // Unknown names fail before the project is touched.
    registry.check_closure(&task)?;

    let root = match &cli.root {
        Some(root) => root.canonicalize()?,
        None => std::env::current_dir()?,
    };
    klog_debug!("Project root: {}", root.display());

    let config = Config::load(&root)?;
    let mode = BuildMode::from_flag(cli.production);
    let tools = Toolchain::from_config(&config);
    let runner = Runner::new(registry, config, mode, tools)?;
    klog_debug!("Running '{}' in {} mode", task, mode);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(async {
        let run = runner.run(&task);
        tokio::pin!(run);

        let report = tokio::select! {
            report = &mut run => report?,
            _ = tokio::signal::ctrl_c() => {
                klog!("Stopping...");
                runner.cancel_token().cancel();
                tokio::time::timeout(SHUTDOWN_GRACE, run)
                    .await
                    .map_err(|_| Error::Timeout(SHUTDOWN_GRACE))??
            }
        };
        klog_debug!(
            "'{}' finished ({}) after {}",
            report.task,
            report.outcome,
            format_elapsed(report.elapsed)
        );
        Ok(())
    })
}

fn print_tasks(registry: &TaskRegistry) -> Result<()> {
    let width = registry
        .tasks()
        .iter()
        .map(|def| def.name.len())
        .max()
        .unwrap_or(0);

    // Everything a composite runs is listed above it.
    for def in registry.topological_order()? {
        let line = format!("  {:<width$}  {}", def.name, def.description, width = width);
        match &def.body {
            TaskBody::Step(_) => println!("{}", line),
            TaskBody::Sequence { stages, .. } => {
                let stages: Vec<String> = stages.iter().map(|s| s.to_string()).collect();
                println!("{}", line.bold());
                println!("  {:<width$}  = {}", "", stages.join(" -> "), width = width);
            }
        }
    }
    Ok(())
}
