use clap::{Parser, Subcommand};
use h5bp_build::config::{self, Layout, ProjectConfig};
use h5bp_build::output;
use h5bp_build::pipeline::{self, Pipeline, PipelineError, PipelineEvent, Plan, RunReport};
use h5bp_build::selector::Selector;
use h5bp_build::stage::{RunContext, Stage};
use h5bp_build::stages::compile;
use h5bp_build::types::BuildMode;
use h5bp_build::watch::{self, Watcher};
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Shared flags for commands that compress images.
#[derive(clap::Args, Clone, Default)]
struct CacheArgs {
    /// Disable the compression cache and recompress every image
    #[arg(long)]
    no_cache: bool,
}

#[derive(Parser)]
#[command(name = "h5bp-build")]
#[command(about = "Asset build pipeline for HTML5 Boilerplate style projects")]
#[command(long_about = "\
Asset build pipeline for HTML5 Boilerplate style projects

Project structure:

  ./
  ├── h5bp.toml          # Project config (optional)
  ├── LICENSE.txt        # Copied to dist/
  ├── server/.htaccess   # Copied to dist/, '# ErrorDocument' uncommented
  ├── test/*.js          # Linted with the scripts
  └── src/
      ├── index.html     # Markup; build blocks are bundled in production
      ├── js/            # Scripts (linted, fingerprinted)
      ├── css/           # Stylesheets; less/ and sass/ compile into here
      ├── img/           # Images; sprite-img/*.png become a sprite sheet
      └── fonts/

Runs:
  dev       clean → lint → compile → copy → optimize → fingerprint → rewrite
  build     the same, plus bundling and minification
  archive   build, then zip dist/ into archive/<name>_v<version>.zip

Run 'h5bp-build plan' to see every stage and 'h5bp-build gen-config' for a
documented h5bp.toml.")]
#[command(version)]
struct Cli {
    /// Project root
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    /// Config file [default: <root>/h5bp.toml]
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log stage details to stderr (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Development build (default)
    Dev(CacheArgs),
    /// Production build: bundles and minifies
    #[command(visible_alias = "product")]
    Build(CacheArgs),
    /// Production build, then zip the output
    Archive(CacheArgs),
    /// Remove the output and archive directories
    Clean,
    /// Lint scripts
    Lint,
    /// Compile LESS and SCSS into the source stylesheet directory
    Compile,
    /// Copy server config, license and misc files
    Copy,
    /// Compress images already copied to the output
    Compress(CacheArgs),
    /// Run stages or aliases by name, one after another
    Stage {
        #[arg(required = true)]
        names: Vec<String>,
        /// Run in production mode
        #[arg(long)]
        production: bool,
        #[command(flatten)]
        cache: CacheArgs,
    },
    /// Rebuild for production whenever a source file changes
    Watch(CacheArgs),
    /// Recompile stylesheets whenever LESS or SCSS sources change
    WatchCompile,
    /// Show the stage groups of a full run
    Plan {
        /// Show the production run
        #[arg(long)]
        production: bool,
    },
    /// Print a stock h5bp.toml with all options documented
    GenConfig,
}

/// Everything loaded once at startup.
struct Project {
    root: PathBuf,
    layout: Layout,
    config: ProjectConfig,
}

impl Project {
    fn load(cli: &Cli) -> Result<Self, config::ConfigError> {
        let config = match &cli.config {
            Some(path) => config::load_config_file(path)?,
            None => config::load_config(&cli.root)?,
        };
        let layout = Layout::resolve(&cli.root, &config.directories);
        Ok(Self {
            root: cli.root.clone(),
            layout,
            config,
        })
    }

    fn catalog(&self) -> Result<Vec<Stage>, PipelineError> {
        pipeline::project_catalog(&self.layout, &self.config)
    }

    fn context(&self, mode: BuildMode, cache: &CacheArgs) -> RunContext {
        RunContext {
            layout: self.layout.clone(),
            config: self.config.clone(),
            mode,
            use_cache: !cache.no_cache,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Some(Command::GenConfig) = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let project = Project::load(&cli)?;
    init_thread_pool(&project.config.processing);
    let command = cli.command.unwrap_or(Command::Dev(CacheArgs::default()));

    match command {
        Command::Dev(cache) => {
            run_plan(&project, Plan::Development, &cache)?;
        }
        Command::Build(cache) => {
            run_plan(&project, Plan::Production, &cache)?;
        }
        Command::Archive(cache) => {
            run_plan(&project, Plan::Archive, &cache)?;
            println!(
                "==> Archive: {}",
                project
                    .layout
                    .archive
                    .join(project.config.archive_file_name())
                    .display()
            );
        }
        Command::Clean => run_development(&project, "clean", &CacheArgs::default())?,
        Command::Lint => run_development(&project, "lint", &CacheArgs::default())?,
        Command::Compile => run_development(&project, "compile", &CacheArgs::default())?,
        Command::Copy => run_development(&project, "copy", &CacheArgs::default())?,
        Command::Compress(cache) => run_development(&project, "compress", &cache)?,
        Command::Stage {
            names,
            production,
            cache,
        } => {
            let mode = if production {
                BuildMode::Production
            } else {
                BuildMode::Development
            };
            run_stages(&project, &names, mode, &cache)?;
        }
        Command::Watch(cache) => watch_build(&project, &cache)?,
        Command::WatchCompile => watch_compile(&project)?,
        Command::Plan { production } => {
            let plan = if production {
                Plan::Production
            } else {
                Plan::Development
            };
            let pipeline = Pipeline::for_plan(plan, &project.catalog()?)?;
            println!("{} run", plan.mode());
            output::print_plan(&pipeline, &project.root);
        }
        Command::GenConfig => print!("{}", config::stock_config_toml()),
    }

    Ok(())
}

/// `RUST_LOG` wins; otherwise warnings only, or debug with `-v`.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

/// Run with a printer thread draining progress events.
fn execute(pipeline: &Pipeline, ctx: &RunContext) -> Result<RunReport, PipelineError> {
    let (tx, rx) = mpsc::channel::<PipelineEvent>();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_event(&event) {
                println!("{}", line);
            }
        }
    });
    let result = pipeline.run(ctx, Some(tx));
    printer.join().ok();

    if let Err(PipelineError::Stage { source, .. }) = &result
        && compile::is_missing_tool(source)
    {
        eprintln!(
            "hint: install the compiler or set [stylesheets] less_command in {}",
            config::CONFIG_FILENAME
        );
    }
    result
}

fn run_plan(project: &Project, plan: Plan, cache: &CacheArgs) -> Result<RunReport, PipelineError> {
    let pipeline = Pipeline::for_plan(plan, &project.catalog()?)?;
    execute(&pipeline, &project.context(plan.mode(), cache))
}

fn run_stages<S: AsRef<str>>(
    project: &Project,
    names: &[S],
    mode: BuildMode,
    cache: &CacheArgs,
) -> Result<(), PipelineError> {
    let pipeline = Pipeline::adhoc(names, &project.catalog()?)?;
    execute(&pipeline, &project.context(mode, cache))?;
    Ok(())
}

/// One stage or alias in development mode.
fn run_development(project: &Project, name: &str, cache: &CacheArgs) -> Result<(), PipelineError> {
    run_stages(project, &[name], BuildMode::Development, cache)
}

fn watch_interval(project: &Project) -> Duration {
    Duration::from_millis(project.config.watch.interval_ms)
}

/// Production run without streamed progress; watch mode prints the
/// summary table instead.
fn rebuild(project: &Project, cache: &CacheArgs) -> Result<RunReport, PipelineError> {
    let pipeline = Pipeline::for_plan(Plan::Production, &project.catalog()?)?;
    pipeline.run(&project.context(BuildMode::Production, cache), None)
}

/// Production run on every source change. A failed run is reported and
/// watching continues.
fn watch_build(project: &Project, cache: &CacheArgs) -> Result<(), Box<dyn std::error::Error>> {
    let source = Selector::new(&project.layout.source, &["**/*"])?.with_dot();
    let mut watchers = vec![Watcher::new(vec![source])?];
    println!("==> Watching {}", project.layout.source.display());

    watch::watch(&mut watchers, watch_interval(project), |_, changes| {
        output::print_changes(changes, &project.root);
        match rebuild(project, cache) {
            Ok(report) => output::print_run_report(&report),
            Err(e) => eprintln!("Build failed: {e}"),
        }
        ControlFlow::Continue(())
    })?;
    Ok(())
}

/// Recompile only the stylesheet language whose sources changed.
fn watch_compile(project: &Project) -> Result<(), Box<dyn std::error::Error>> {
    let css = project.layout.source.join("css");
    let targets = [
        ("compile:less", Selector::new(css.join("less"), &["**/*.less"])?),
        ("compile:sass", Selector::new(css.join("sass"), &["**/*.scss"])?),
    ];
    let stage_names: Vec<&str> = targets.iter().map(|(name, _)| *name).collect();
    let mut watchers = targets
        .into_iter()
        .map(|(_, selector)| Watcher::new(vec![selector]))
        .collect::<Result<Vec<_>, _>>()?;
    println!("==> Watching {}", css.display());

    watch::watch(&mut watchers, watch_interval(project), |index, changes| {
        output::print_changes(changes, &project.root);
        if let Err(e) = run_stages(
            project,
            &stage_names[index..=index],
            BuildMode::Development,
            &CacheArgs::default(),
        ) {
            eprintln!("Compile failed: {e}");
        }
        ControlFlow::Continue(())
    })?;
    Ok(())
}
