use std::fs;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use similar::{ChangeTag, TextDiff};

use strata_core::bootstrap::{self, BootstrapContext, Pipeline, Probe};
use strata_core::profile::profile_table;
use strata_core::validation::validate;
use strata_core::{DerivedConfig, InputSet, resolve};

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Resolve observability stack configuration and host bootstrap scripts", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate an input file
    Validate {
        /// Path to the input file (.toml or .json)
        #[arg(default_value = "strata.toml")]
        file: PathBuf,
    },
    /// Resolve the derived configuration as JSON
    Resolve {
        /// Path to the input file (.toml or .json)
        #[arg(default_value = "strata.toml")]
        file: PathBuf,

        /// Write the document here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Render the host bootstrap script
    Render {
        /// Path to the input file (.toml or .json)
        #[arg(default_value = "strata.toml")]
        file: PathBuf,

        /// Managed metrics workspace endpoint
        #[arg(long)]
        metrics_endpoint: String,

        /// Write the script here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Fail if the existing output differs (don't write)
        #[arg(long, requires = "output")]
        check: bool,

        /// Show diff against the existing output
        #[arg(long, requires = "output")]
        diff: bool,
    },
    /// List the units the bootstrap installs
    Pipeline {
        /// Path to the input file (.toml or .json)
        #[arg(default_value = "strata.toml")]
        file: PathBuf,

        /// Managed metrics workspace endpoint
        #[arg(long)]
        metrics_endpoint: String,
    },
    /// Show the environment profile table
    Profiles,
    /// Generate shell completions
    Completions {
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Validate { file } => run_validate(&file),
        Commands::Resolve { file, output } => run_resolve(&file, output.as_deref()),
        Commands::Render {
            file,
            metrics_endpoint,
            output,
            check,
            diff,
        } => run_render(&file, &metrics_endpoint, output.as_deref(), check, diff),
        Commands::Pipeline {
            file,
            metrics_endpoint,
        } => run_pipeline(&file, &metrics_endpoint),
        Commands::Profiles => {
            print_profiles();
            Ok(())
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "strata", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

/// Load an input file, choosing the format by extension
fn load_input(file: &Path) -> Result<InputSet, String> {
    let content = fs::read_to_string(file)
        .map_err(|e| format!("Failed to read {}: {}", file.display(), e))?;

    log::debug!("Loading inputs from {}", file.display());
    if file.extension().is_some_and(|ext| ext == "json") {
        serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse {}: {}", file.display(), e))
    } else {
        toml::from_str(&content).map_err(|e| format!("Failed to parse {}: {}", file.display(), e))
    }
}

fn load_config(file: &Path) -> Result<DerivedConfig, String> {
    let input = load_input(file)?;
    resolve(&input).map_err(|e| e.to_string())
}

fn run_validate(file: &Path) -> Result<(), String> {
    let input = load_input(file)?;

    println!("{}", "Validating...".cyan());
    let validated = validate(&input).map_err(|e| format!("Validation error: {}", e))?;

    println!(
        "{}",
        format!(
            "✓ {} ({}) is valid.",
            input.project_name, validated.environment
        )
        .green()
        .bold()
    );
    Ok(())
}

fn run_resolve(file: &Path, output: Option<&Path>) -> Result<(), String> {
    let config = load_config(file)?;
    let json = config
        .to_json()
        .map_err(|e| format!("Failed to serialize configuration: {}", e))?;

    match output {
        Some(path) => {
            fs::write(path, format!("{}\n", json))
                .map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;
            println!("{} {}", "Wrote:".green(), path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn render_script(file: &Path, metrics_endpoint: &str) -> Result<String, String> {
    let config = load_config(file)?;
    let ctx = BootstrapContext::from_config(&config, metrics_endpoint);
    bootstrap::render(&ctx)
        .map(|script| script.into_string())
        .map_err(|e| format!("Render error: {}", e))
}

fn run_render(
    file: &Path,
    metrics_endpoint: &str,
    output: Option<&Path>,
    check: bool,
    show_diff: bool,
) -> Result<(), String> {
    let script = render_script(file, metrics_endpoint)?;

    let Some(path) = output else {
        print!("{}", script);
        return Ok(());
    };

    let existing = if path.exists() {
        Some(
            fs::read_to_string(path)
                .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?,
        )
    } else {
        None
    };
    let up_to_date = existing.as_deref() == Some(script.as_str());

    if show_diff && !up_to_date {
        print_diff(path, existing.as_deref().unwrap_or(""), &script);
    }

    if check {
        if up_to_date {
            println!("{}", "Bootstrap script is up to date.".green());
            return Ok(());
        }
        return Err(format!("{} is out of date", path.display()));
    }

    if up_to_date {
        println!("{}", "Bootstrap script is already up to date.".green());
    } else {
        fs::write(path, &script)
            .map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;
        println!("{} {}", "Wrote:".green(), path.display());
    }
    Ok(())
}

fn run_pipeline(file: &Path, metrics_endpoint: &str) -> Result<(), String> {
    let config = load_config(file)?;
    let ctx = BootstrapContext::from_config(&config, metrics_endpoint);
    let pipeline = Pipeline::build(&ctx).map_err(|e| format!("Render error: {}", e))?;

    println!(
        "{}",
        format!("Bootstrap pipeline for {}:", config.name_prefix)
            .cyan()
            .bold()
    );
    println!();
    for (i, unit) in pipeline.units().iter().enumerate() {
        let probe = match &unit.probe {
            Some(Probe::Http { url }) => format!("http {}", url),
            Some(Probe::Tcp { host, port }) => format!("tcp {}:{}", host, port),
            None => "status only".to_string(),
        };
        println!(
            "  {}. {} {}",
            i + 1,
            unit.name.bold(),
            format!("({:?})", unit.role).dimmed()
        );
        println!("     {}", unit.description);
        println!("     probe: {}", probe);
    }
    Ok(())
}

fn print_profiles() {
    println!(
        "{:<12} {:>14} {:>17} {:>10} {:>4} {:>19}",
        "environment", "log_retention", "backup_retention", "interval", "ha", "instance_monitoring"
    );
    for (env, profile) in profile_table() {
        println!(
            "{:<12} {:>14} {:>17} {:>10} {:>4} {:>19}",
            env.as_str(),
            profile.log_retention_days,
            profile.backup_retention_days,
            profile.monitoring_interval,
            profile.enable_ha,
            profile.instance_monitoring
        );
    }
}

/// Lines of context kept around each changed hunk
const DIFF_CONTEXT: usize = 3;

/// Hunked diff of the existing script against the freshly rendered one
///
/// Returns the number of inserted and deleted lines.
fn print_diff(file: &Path, existing: &str, rendered: &str) -> (usize, usize) {
    println!("\n{} {}:", "Bootstrap changes for".cyan().bold(), file.display());

    let diff = TextDiff::from_lines(existing, rendered);
    let mut unified = diff.unified_diff();
    unified.context_radius(DIFF_CONTEXT);

    let (mut inserted, mut deleted) = (0, 0);
    for hunk in unified.iter_hunks() {
        println!("{}", hunk.header().to_string().dimmed());
        for change in hunk.iter_changes() {
            let text = change.value().trim_end_matches('\n');
            match change.tag() {
                ChangeTag::Insert => {
                    inserted += 1;
                    println!("{}", format!("+{}", text).green());
                }
                ChangeTag::Delete => {
                    deleted += 1;
                    println!("{}", format!("-{}", text).red());
                }
                ChangeTag::Equal => println!(" {}", text),
            }
        }
    }
    println!("{} inserted, {} deleted", inserted, deleted);
    (inserted, deleted)
}
