//! sbom-reconcile: cross-scanner SBOM reconciliation
//!
//! Normalizes the output of several SBOM scanners, matches components across
//! them, merges the result and validates CPE/PURL identifiers.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use sbom_reconcile::{
    cli::{self, MergeArgs, OutputTarget, ReconcileInputs, SbomInput, ScanArgs, ValidateArgs},
    config::{self, AppConfig, Validatable},
    merge::MergeOptions,
    validation::IdentifierKind,
};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Build long version string with format support info
const fn build_long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        "\n\nSupported scanner outputs:",
        "\n  CycloneDX JSON, SPDX 2.x JSON, Syft JSON, Trivy JSON",
        "\n\nDefault scanners:",
        "\n  trivy, syft, cdxgen"
    )
}

#[derive(Parser)]
#[command(name = "sbom-reconcile")]
#[command(author = "Binarly.io")]
#[command(version, long_version = build_long_version())]
#[command(about = "Reconcile SBOMs produced by several scanners", long_about = None)]
#[command(after_help = "EXAMPLES:
    # Compare two scanners' output
    sbom-reconcile analyze --sbom trivy=trivy.json --sbom syft=syft.json

    # Merge common packages plus a selection of unique ones as CycloneDX
    sbom-reconcile merge --sbom trivy=trivy.json --sbom syft=syft.json \\
        --selection picks.json --cyclonedx -O merged.cdx.json

    # Check PURLs against the package registries
    sbom-reconcile validate-purls pkg:npm/lodash@4.17.21 pkg:pypi/requests@2.31.0")]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Matching preset (strict, balanced, permissive), overrides the config file
    #[arg(long, global = true)]
    preset: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Scanner documents and output shared by the offline commands
#[derive(Parser)]
struct SbomArgs {
    /// Scanner output as SCANNER=PATH (repeatable)
    #[arg(long = "sbom", value_name = "SCANNER=PATH", required = true)]
    sboms: Vec<SbomInput>,

    /// Repository URL recorded in the scan
    #[arg(long, default_value = "local")]
    repo_url: String,

    /// Output file path (stdout if not specified)
    #[arg(short = 'O', long)]
    output_file: Option<PathBuf>,
}

impl SbomArgs {
    fn into_inputs(self) -> ReconcileInputs {
        ReconcileInputs {
            sboms: self.sboms,
            repo_url: self.repo_url,
            output: OutputTarget::from_option(self.output_file),
        }
    }
}

/// Identifiers to validate
#[derive(Parser)]
struct IdentifierArgs {
    /// Identifiers to validate
    identifiers: Vec<String>,

    /// Read identifiers from a file, one per line
    #[arg(long, value_name = "PATH")]
    from_file: Option<PathBuf>,

    /// Syntax checks only, no network lookups
    #[arg(long)]
    offline: bool,

    /// Output file path (stdout if not specified)
    #[arg(short = 'O', long)]
    output_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Match components across scanners and report common and unique packages
    Analyze(SbomArgs),

    /// Build one merged SBOM from the common packages and selected unique ones
    Merge {
        #[command(flatten)]
        sboms: SbomArgs,

        /// JSON file with `selected_unique_packages`
        #[arg(long, value_name = "PATH")]
        selection: Option<PathBuf>,

        /// Include every unique package
        #[arg(long)]
        include_all_unique: bool,

        /// Drop unique packages that look like GitHub Actions
        #[arg(long)]
        exclude_github_actions: bool,

        /// Emit CycloneDX 1.4 instead of the merged component list
        #[arg(long)]
        cyclonedx: bool,
    },

    /// Dependency graph of one scanner's output
    Graph {
        #[command(flatten)]
        sboms: SbomArgs,

        /// Scanner whose graph to build
        #[arg(long)]
        scanner: String,
    },

    /// Validate CPE 2.3 strings
    ValidateCpes(IdentifierArgs),

    /// Validate package URLs
    ValidatePurls(IdentifierArgs),

    /// Clone a repository and run every configured scanner
    Scan {
        /// Repository URL
        repo_url: String,

        /// Token for private repositories
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        github_token: Option<String>,

        /// Print the analysis instead of the scan record
        #[arg(long)]
        analyze: bool,

        /// Keep the checkout directory
        #[arg(long)]
        keep_checkout: bool,

        /// Output file path (stdout if not specified)
        #[arg(short = 'O', long)]
        output_file: Option<PathBuf>,
    },

    /// Print the JSON schema of the config file
    ConfigSchema {
        /// Output file path (stdout if not specified)
        #[arg(short = 'O', long)]
        output: Option<PathBuf>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let (mut config, loaded_from) = config::load_or_default(cli.config.as_deref());
    if let Some(path) = loaded_from {
        tracing::debug!("Loaded config from {}", path.display());
    }
    if let Some(preset) = &cli.preset {
        config.matching.preset.clone_from(preset);
    }

    let errors = config.validate();
    if !errors.is_empty() {
        let details: Vec<String> = errors.iter().map(ToString::to_string).collect();
        anyhow::bail!("invalid configuration:\n  {}", details.join("\n  "));
    }
    Ok(config)
}

fn validate_args(kind: IdentifierKind, args: IdentifierArgs) -> ValidateArgs {
    ValidateArgs {
        kind,
        identifiers: args.identifiers,
        from_file: args.from_file,
        output: OutputTarget::from_option(args.output_file),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.to_string()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .init();

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Analyze(sboms) => cli::run_analyze(config, sboms.into_inputs()),
        Commands::Merge {
            sboms,
            selection,
            include_all_unique,
            exclude_github_actions,
            cyclonedx,
        } => cli::run_merge(
            config,
            sboms.into_inputs(),
            MergeArgs {
                selection,
                options: MergeOptions {
                    include_all_unique,
                    exclude_github_actions,
                },
                cyclonedx,
            },
        ),
        Commands::Graph { sboms, scanner } => cli::run_graph(config, sboms.into_inputs(), &scanner),
        Commands::ValidateCpes(args) => run_validate(config, IdentifierKind::Cpe, args),
        Commands::ValidatePurls(args) => run_validate(config, IdentifierKind::Purl, args),
        Commands::Scan {
            repo_url,
            github_token,
            analyze,
            keep_checkout,
            output_file,
        } => cli::run_scan(
            config,
            ScanArgs {
                repo_url,
                github_token,
                analyze,
                keep_checkout,
                output: OutputTarget::from_option(output_file),
            },
        ),
        Commands::ConfigSchema { output } => {
            let schema = config::generate_json_schema();
            match output {
                Some(path) => std::fs::write(&path, schema)
                    .with_context(|| format!("Failed to write {}", path.display())),
                None => {
                    println!("{schema}");
                    Ok(())
                }
            }
        }
        Commands::Completions { shell } => {
            generate(shell, &mut Cli::command(), "sbom-reconcile", &mut io::stdout());
            Ok(())
        }
    }
}

fn run_validate(mut config: AppConfig, kind: IdentifierKind, args: IdentifierArgs) -> Result<()> {
    config.validation.offline |= args.offline;
    let exit_code = cli::run_validate_identifiers(config, validate_args(kind, args))?;
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}
