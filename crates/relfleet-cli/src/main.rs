//! relfleet - release engineering for a fleet of git repositories.
//!
//! ## Commands
//!
//! - `update`, `checkout`, `clean`, `reset`, `track`, `merge`, `tag`,
//!   `push`, `set-remote`, `clean-update`: uniform git operations across
//!   the fleet
//! - `set-versions`: rewrite version descriptors fleet-wide
//! - `build`: build components in dependency order
//! - `release`, `bootstrap`: guided multi-step workflows
//! - `qualifier`, `changed`: build-identity qualifiers

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::Level;

use relfleet_build::{
    load_registry, BootstrapBuild, BootstrapOutcome, BootstrapParams, BootstrapWorkflow,
    BuildProfile, Builder, MemorySettings, ProcessBackend, ReleaseBuild, ReleaseOutcome,
    ReleaseParams, ReleaseWorkflow, TargetRegistry, Verbosity,
};
use relfleet_core::qualifier::DEFAULT_RECORD_FILE;
use relfleet_core::versions::{rewrite, VersionRewriteSpec};
use relfleet_core::{
    apply, AutoConfirmer, Confirmer, Fleet, FleetOp, FleetReport, RemoteKind, StdinConfirmer,
};

#[derive(Parser)]
#[command(name = "relfleet")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Release engineering for multi-repository products", long_about = None)]
struct Cli {
    /// Fleet root repository
    #[arg(long, global = true, default_value = ".")]
    repo: PathBuf,

    /// Enable verbose output
    #[arg(long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and fast-forward every member to its remote branch
    Update {
        /// Limit fetch history depth
        #[arg(long)]
        depth: Option<u32>,
    },

    /// Leave detached-HEAD state by checking out each member's branch
    Checkout {
        #[arg(short, long)]
        yes: bool,
    },

    /// Remove untracked files and directories in every member
    Clean {
        #[arg(short, long)]
        yes: bool,
    },

    /// Hard-reset every member's working tree
    Reset {
        /// Also discard unpushed commits by resetting to the remote branch
        #[arg(long)]
        to_remote: bool,

        #[arg(short, long)]
        yes: bool,
    },

    /// Checkout, reset to remote, clean, and update in one pass
    CleanUpdate {
        /// Limit fetch history depth
        #[arg(long)]
        depth: Option<u32>,

        #[arg(short, long)]
        yes: bool,
    },

    /// Set each member's local branch to track its remote branch
    Track,

    /// Merge a branch into the current branch of every member
    Merge {
        branch: String,

        #[arg(short, long)]
        yes: bool,
    },

    /// Create an annotated tag in every member
    Tag {
        name: String,

        /// Tag message (defaults to the tag name)
        #[arg(short, long)]
        message: Option<String>,

        #[arg(short, long)]
        yes: bool,
    },

    /// Push the current branch of every member
    Push {
        #[arg(short, long)]
        yes: bool,
    },

    /// Rewrite every member's remote URL to the given scheme
    SetRemote {
        kind: RemoteArg,
    },

    /// Rewrite version descriptors across the fleet
    SetVersions {
        /// Version to replace
        #[arg(long)]
        from: String,

        /// Replacement version
        #[arg(long)]
        to: String,

        /// Commit the changes in each modified repository
        #[arg(short, long)]
        commit: bool,

        /// Report the changes without touching any file
        #[arg(short = 'n', long)]
        dry_run: bool,

        #[arg(short, long)]
        yes: bool,
    },

    /// Build components in dependency order
    Build(BuildArgs),

    /// Release the fleet: branch, version, build, tag, merge back, push
    Release {
        /// Branch to release from
        #[arg(long = "rel-branch")]
        release_branch: String,

        /// Development branch to merge in and return to
        #[arg(long = "dev-branch")]
        develop_branch: String,

        /// Version currently on the development branch
        #[arg(long = "cur-dev-ver")]
        cur_develop_version: String,

        /// Version to release and tag
        #[arg(long = "next-rel-ver")]
        next_release_version: String,

        /// Development version to move to afterwards
        #[arg(long = "next-dev-ver")]
        next_develop_version: String,

        /// Components to build on the release branch before tagging
        #[arg(long = "build", value_name = "COMPONENT")]
        build: Vec<String>,

        #[arg(short, long)]
        yes: bool,
    },

    /// Bootstrap self-hosting components from a released baseline
    Bootstrap {
        /// Current development version
        #[arg(long = "cur-ver")]
        current_version: String,

        /// Released baseline version to bootstrap from
        #[arg(long = "cur-base-ver")]
        baseline_version: String,

        /// Components to build (all bootstrap targets when omitted)
        components: Vec<String>,

        #[arg(short, long)]
        yes: bool,
    },

    /// Print the current build-identity qualifier
    Qualifier,

    /// Print the qualifier and succeed only if the fleet changed
    Changed {
        /// Qualifier record file, relative to the fleet root
        #[arg(short, long, default_value = DEFAULT_RECORD_FILE)]
        destination: PathBuf,

        /// Report a change regardless of the record
        #[arg(short, long)]
        force_change: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RemoteArg {
    Ssh,
    Http,
}

#[derive(Debug, clap::Args)]
struct BuildArgs {
    /// Components to build; lists available components when empty
    components: Vec<String>,

    /// Use this qualifier instead of deriving one from commit dates
    #[arg(short, long)]
    qualifier: Option<String>,

    /// Derive the qualifier from the current time
    #[arg(short = 'n', long)]
    now_qualifier: bool,

    /// Remove the local artifact repository before building
    #[arg(short = 'c', long)]
    clean_repo: bool,

    /// Location of the local artifact repository
    #[arg(long)]
    local_repo: Option<PathBuf>,

    /// Build only the named components, not their dependencies
    #[arg(short = 'e', long)]
    no_deps: bool,

    /// Deploy artifacts after building
    #[arg(short, long)]
    deploy: bool,

    /// Release build: reject snapshot versions upfront
    #[arg(short, long)]
    release: bool,

    /// Skip components marked expensive
    #[arg(short = 'k', long)]
    skip_expensive: bool,

    /// Copy produced artifacts to this directory
    #[arg(short = 'a', long)]
    copy_artifacts: Option<PathBuf>,

    /// Skip the backend's clean phase
    #[arg(short = 'u', long)]
    no_clean: bool,

    /// Skip tests while building
    #[arg(short = 'y', long)]
    skip_tests: bool,

    /// Build offline
    #[arg(short = 'O', long)]
    offline: bool,

    /// Debug-level backend output
    #[arg(short = 'D', long, conflicts_with = "quiet")]
    debug: bool,

    /// Quiet backend output
    #[arg(short = 'Q', long)]
    quiet: bool,

    /// Backend stack size
    #[arg(long, default_value = "16M")]
    stack: String,

    /// Backend minimum heap size
    #[arg(long, default_value = "512M")]
    min_heap: String,

    /// Backend maximum heap size
    #[arg(long, default_value = "1024M")]
    max_heap: String,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    relfleet_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Update { depth } => cmd_fleet_op(&cli.repo, FleetOp::Update { depth }, true),
        Commands::Checkout { yes } => cmd_fleet_op(&cli.repo, FleetOp::Checkout, yes),
        Commands::Clean { yes } => cmd_fleet_op(&cli.repo, FleetOp::Clean, yes),
        Commands::Reset { to_remote, yes } => {
            cmd_fleet_op(&cli.repo, FleetOp::Reset { to_remote }, yes)
        }
        Commands::CleanUpdate { depth, yes } => cmd_clean_update(&cli.repo, depth, yes),
        Commands::Track => cmd_fleet_op(&cli.repo, FleetOp::Track, true),
        Commands::Merge { branch, yes } => cmd_fleet_op(&cli.repo, FleetOp::Merge { branch }, yes),
        Commands::Tag { name, message, yes } => {
            cmd_fleet_op(&cli.repo, FleetOp::Tag { name, message }, yes)
        }
        Commands::Push { yes } => cmd_fleet_op(&cli.repo, FleetOp::Push, yes),
        Commands::SetRemote { kind } => {
            let kind = match kind {
                RemoteArg::Ssh => RemoteKind::Ssh,
                RemoteArg::Http => RemoteKind::Http,
            };
            cmd_fleet_op(&cli.repo, FleetOp::SetRemote { kind }, true)
        }
        Commands::SetVersions {
            from,
            to,
            commit,
            dry_run,
            yes,
        } => cmd_set_versions(&cli.repo, from, to, commit, dry_run, yes),
        Commands::Build(args) => cmd_build(&cli.repo, args).await,
        Commands::Release {
            release_branch,
            develop_branch,
            cur_develop_version,
            next_release_version,
            next_develop_version,
            build,
            yes,
        } => {
            cmd_release(
                &cli.repo,
                ReleaseParams {
                    release_branch,
                    develop_branch,
                    cur_develop_version,
                    next_release_version,
                    next_develop_version,
                },
                build,
                yes,
            )
            .await
        }
        Commands::Bootstrap {
            current_version,
            baseline_version,
            components,
            yes,
        } => {
            cmd_bootstrap(
                &cli.repo,
                BootstrapParams {
                    current_version,
                    baseline_version,
                },
                components,
                yes,
            )
            .await
        }
        Commands::Qualifier => cmd_qualifier(&cli.repo),
        Commands::Changed {
            destination,
            force_change,
        } => cmd_changed(&cli.repo, &destination, force_change),
    }
}

fn discover(repo: &Path) -> Result<Fleet> {
    Fleet::discover(repo).with_context(|| format!("not a fleet root: {}", repo.display()))
}

fn make_confirmer(yes: bool) -> Box<dyn Confirmer> {
    if yes {
        Box::new(AutoConfirmer)
    } else {
        Box::new(StdinConfirmer)
    }
}

fn print_report(report: &FleetReport) -> bool {
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(()) => println!("ok      {}", outcome.repo.display()),
            Err(e) => println!("failed  {}: {e}", outcome.repo.display()),
        }
    }
    report.overall_success()
}

fn cmd_fleet_op(repo: &Path, op: FleetOp, yes: bool) -> Result<ExitCode> {
    let fleet = discover(repo)?;
    let severity = op.severity();
    if severity > 0 {
        let warning = format!(
            "About to {} in {} repositories under {}.",
            op.describe(),
            fleet.members().len(),
            fleet.root().path.display()
        );
        if !make_confirmer(yes).confirm(&warning, severity) {
            println!("Aborted.");
            return Ok(ExitCode::FAILURE);
        }
    }
    if print_report(&apply(&fleet, &op)) {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// Checkout, reset to remote, clean, and update, behind one (triple)
/// confirmation covering the whole destructive sequence.
fn cmd_clean_update(repo: &Path, depth: Option<u32>, yes: bool) -> Result<ExitCode> {
    let fleet = discover(repo)?;
    let warning = format!(
        "About to reset {} repositories to their remote branches, discarding \
         unpushed commits and untracked files, then update them.",
        fleet.members().len()
    );
    if !make_confirmer(yes).confirm(&warning, 3) {
        println!("Aborted.");
        return Ok(ExitCode::FAILURE);
    }
    let sequence = [
        FleetOp::Checkout,
        FleetOp::Reset { to_remote: true },
        FleetOp::Checkout,
        FleetOp::Clean,
        FleetOp::Update { depth },
    ];
    for op in sequence {
        if !print_report(&apply(&fleet, &op)) {
            return Ok(ExitCode::FAILURE);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_set_versions(
    repo: &Path,
    from: String,
    to: String,
    commit: bool,
    dry_run: bool,
    yes: bool,
) -> Result<ExitCode> {
    let fleet = discover(repo)?;
    if !dry_run {
        let warning = format!("About to set versions from {from} to {to} across the fleet.");
        if !make_confirmer(yes).confirm(&warning, 1) {
            println!("Aborted.");
            return Ok(ExitCode::FAILURE);
        }
    }
    let changes = rewrite(
        &fleet,
        &VersionRewriteSpec {
            from,
            to,
            commit,
            dry_run,
        },
    )?;
    for change in &changes.changes {
        println!(
            "{}: {} [{}] {} -> {}",
            change.repo.display(),
            change.file.display(),
            change.location,
            change.old,
            change.new
        );
    }
    println!("{} change(s){}", changes.len(), if dry_run { " (dry run)" } else { "" });
    Ok(ExitCode::SUCCESS)
}

fn resolve_qualifier(fleet: &Fleet, args: &BuildArgs) -> Result<String> {
    if let Some(q) = &args.qualifier {
        return Ok(q.clone());
    }
    let q = if args.now_qualifier {
        relfleet_core::compute_now_qualifier(fleet)?
    } else {
        relfleet_core::compute_qualifier(fleet)?
    };
    Ok(q)
}

fn profile_from(args: &BuildArgs, qualifier: String) -> BuildProfile {
    BuildProfile {
        qualifier: Some(qualifier),
        clean: !args.no_clean,
        deploy: args.deploy,
        release: args.release,
        skip_tests: args.skip_tests,
        skip_expensive: args.skip_expensive,
        offline: args.offline,
        verbosity: if args.debug {
            Verbosity::Debug
        } else if args.quiet {
            Verbosity::Quiet
        } else {
            Verbosity::Normal
        },
        memory: MemorySettings {
            stack: args.stack.clone(),
            min_heap: args.min_heap.clone(),
            max_heap: args.max_heap.clone(),
        },
        copy_artifacts: args.copy_artifacts.clone(),
        clean_local_repo: args.clean_repo,
        local_repo: args.local_repo.clone(),
        settings_file: None,
        global_settings_file: None,
    }
}

fn list_components(registry: &TargetRegistry) -> ExitCode {
    println!("Available components:");
    for name in registry.names() {
        println!("  {name}");
    }
    ExitCode::FAILURE
}

async fn cmd_build(repo: &Path, args: BuildArgs) -> Result<ExitCode> {
    let fleet = discover(repo)?;
    let registry = load_registry(&fleet.root().path)?;
    if args.components.is_empty() {
        return Ok(list_components(&registry));
    }

    let qualifier = resolve_qualifier(&fleet, &args)?;
    let profile = profile_from(&args, qualifier);
    let backend = ProcessBackend::new(fleet.root().path.clone());
    let mut builder = Builder::new(fleet.root().path.clone(), &registry);
    if args.no_deps {
        builder = builder.without_deps();
    }

    let summary = builder.build(&profile, &args.components, &backend).await?;
    for name in &summary.built {
        println!("built   {name}");
    }
    for name in &summary.skipped {
        println!("skipped {name}");
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_release(
    repo: &Path,
    params: ReleaseParams,
    build: Vec<String>,
    yes: bool,
) -> Result<ExitCode> {
    let fleet = discover(repo)?;
    let registry;
    let backend;
    let release_build = if build.is_empty() {
        None
    } else {
        registry = load_registry(&fleet.root().path)?;
        backend = ProcessBackend::new(fleet.root().path.clone());
        Some(ReleaseBuild {
            registry: &registry,
            profile: BuildProfile::default(),
            requested: build,
            backend: &backend,
        })
    };

    let confirmer = make_confirmer(yes);
    let mut workflow = ReleaseWorkflow::new(&fleet, params);
    match workflow.run(confirmer.as_ref(), release_build).await? {
        ReleaseOutcome::Completed => {
            println!("Release complete.");
            Ok(ExitCode::SUCCESS)
        }
        ReleaseOutcome::Aborted { at } => {
            println!("Release aborted before {at:?}.");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn cmd_bootstrap(
    repo: &Path,
    params: BootstrapParams,
    components: Vec<String>,
    yes: bool,
) -> Result<ExitCode> {
    let fleet = discover(repo)?;
    let registry = load_registry(&fleet.root().path)?;
    let requested = if components.is_empty() {
        registry.names().map(str::to_string).collect()
    } else {
        components
    };
    let backend = ProcessBackend::new(fleet.root().path.clone());

    let confirmer = make_confirmer(yes);
    let mut workflow = BootstrapWorkflow::new(&fleet, params);
    let build = BootstrapBuild {
        registry: &registry,
        profile: BuildProfile::default(),
        requested,
        backend: &backend,
    };
    match workflow.run(confirmer.as_ref(), build).await? {
        BootstrapOutcome::Completed => {
            println!("Bootstrap complete.");
            Ok(ExitCode::SUCCESS)
        }
        BootstrapOutcome::Aborted { at } => {
            println!("Bootstrap aborted before {at:?}.");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn cmd_qualifier(repo: &Path) -> Result<ExitCode> {
    let fleet = discover(repo)?;
    println!("{}", relfleet_core::compute_qualifier(&fleet)?);
    Ok(ExitCode::SUCCESS)
}

fn cmd_changed(repo: &Path, destination: &Path, force_change: bool) -> Result<ExitCode> {
    let fleet = discover(repo)?;
    let record = if destination.is_absolute() {
        destination.to_path_buf()
    } else {
        fleet.root().path.join(destination)
    };
    let (changed, qualifier) = relfleet_core::has_changed(&fleet, &record)?;
    println!("{qualifier}");
    if changed || force_change {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
