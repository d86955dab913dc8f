use clap::{Parser, Subcommand};
use folio::sw::{
    CacheController, CacheStorage, ControllerSettings, DirStorage, Fetcher, LifecycleState,
    Method, OfflineFetcher, Request, SiteFetcher, Store, TracingHost, sweep,
};
use folio::{audit, budget, cards, config, htmlfix, imaging, optimize, output, server, sw};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn version_string() -> &'static str {
    let on_tag = env!("FOLIO_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("FOLIO_GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "folio")]
#[command(about = "Offline cache controller and tooling for a static portfolio site")]
#[command(long_about = "\
Offline cache controller and tooling for a static portfolio site

The site is plain files in one directory. folio serves it with live reload,
runs the service-worker cache policy against it, checks it, and generates
the pieces that are tedious to write by hand.

Site structure:

  site/
  ├── folio.toml          # Config (optional; 'folio gen-config' prints one)
  ├── index.html          # Registers /sw.js
  ├── offline.html        # Served for navigations while offline
  ├── site.webmanifest    # Web app manifest
  ├── icon.png            # Primary icon (precached)
  ├── sw.js               # Generated by 'folio sw script --write'
  ├── cards/              # Generated by 'folio cards'
  └── .folio-cache/       # Cache generations written by 'folio sw'

Logging goes to stderr and is controlled by FOLIO_LOG (default: info).")]
#[command(version = version_string())]
struct Cli {
    /// Site root directory
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    /// Config file (default: <root>/folio.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the site with live reload
    Serve {
        /// Port to listen on (overrides [server] port)
        #[arg(long, env = "PORT")]
        port: Option<u16>,
    },
    /// Run the offline cache controller against the site
    #[command(subcommand)]
    Sw(SwCommand),
    /// Check page sizes against the performance budget
    Budget,
    /// Remove void-element slashes and trailing whitespace
    FixHtml {
        /// Files relative to the root (default: [fix_html] files)
        files: Vec<String>,
    },
    /// Generate Open-Graph card HTML
    Cards,
    /// Convert images to WebP/AVIF and print <picture> snippets
    OptimizeImages,
    /// Audit pages, manifest and service-worker wiring
    Check,
    /// Print a stock folio.toml with all options documented
    GenConfig,
}

#[derive(Subcommand)]
enum SwCommand {
    /// Install the configured version into the cache store
    Install,
    /// Install if needed, then delete stale generations and take control
    Activate,
    /// Run one request through the active controller
    Fetch {
        /// Absolute URL or path on the site origin
        url: String,
        /// HTTP method
        #[arg(long, default_value = "GET")]
        method: String,
        /// Treat the request as a top-level navigation
        #[arg(long)]
        navigate: bool,
        /// Simulate a network outage
        #[arg(long)]
        offline: bool,
    },
    /// List cache generations and their keys
    List,
    /// Print the browser sw.js for the configured policy
    Script {
        /// Write it to [cache] script_path instead of stdout
        #[arg(long)]
        write: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing();

    let load = || -> Result<config::SiteConfig, config::ConfigError> {
        let config = config::load_config(&cli.root, cli.config.as_deref())?;
        tracing::debug!(root = %cli.root.display(), cache = %config.cache_name(), "config loaded");
        Ok(config)
    };

    match &cli.command {
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
        Command::Serve { port } => {
            let config = load()?;
            let port = port.unwrap_or(config.server.port);
            let server = server::DevServer::bind(&cli.root, port, &config.cache.offline_url)?;
            println!("==> Serving {} at http://{}", cli.root.display(), server.local_addr()?);
            println!("==> Live reload on {}", config.server.watch.join(", "));
            server.run(&config)?;
        }
        Command::Sw(command) => {
            let config = load()?;
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()?;
            runtime.block_on(run_sw(&cli.root, &config, command))?;
        }
        Command::Budget => {
            let config = load()?;
            let report = budget::check_site(&cli.root, &config)?;
            output::print_budget_report(&report);
            if !report.passed() {
                std::process::exit(1);
            }
        }
        Command::FixHtml { files } => {
            let config = load()?;
            let files = if files.is_empty() {
                &config.fix_html.files
            } else {
                files
            };
            let results = htmlfix::fix_files(&cli.root, files)?;
            output::print_fix_results(&results);
        }
        Command::Cards => {
            let config = load()?;
            let written = cards::generate_cards(&cli.root, &config.og)?;
            let shown: Vec<&Path> = written
                .iter()
                .map(|p| p.strip_prefix(&cli.root).unwrap_or(p))
                .collect();
            output::print_lines(&output::format_cards_output(&shown, &config.og));
        }
        Command::OptimizeImages => {
            let config = load()?;
            init_thread_pool(&config.images);
            let backend = imaging::RustBackend::new();
            let results = optimize::optimize_images(&backend, &cli.root, &config.images);
            output::print_optimize_results(&results, &config.images.formats);
            if results
                .iter()
                .any(|r| matches!(r, optimize::ImageOutcome::Failed { .. }))
            {
                std::process::exit(1);
            }
        }
        Command::Check => {
            let config = load()?;
            println!("==> Checking {}", cli.root.display());
            let report = audit::audit_site(&cli.root, &config)?;
            output::print_audit_report(&report);
            if !report.passed() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

async fn run_sw(
    root: &Path,
    config: &config::SiteConfig,
    command: &SwCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    let settings = ControllerSettings::from_config(config)?;
    let storage = DirStorage::new(root.join(&config.cache.store_dir));
    let site = SiteFetcher::new(root, settings.origin.clone());

    match command {
        SwCommand::Install => {
            let mut controller = CacheController::new(settings, storage, site, TracingHost);
            let report = controller.on_install().await?;
            output::print_lines(&output::format_install_report(&report));
        }
        SwCommand::Activate => {
            let installed = storage.keys().await?;
            let report = if installed.contains(&settings.cache_name) {
                let mut controller =
                    CacheController::resume(settings, storage, site, TracingHost).await?;
                if controller.state() == LifecycleState::Active {
                    sweep(controller.storage(), &controller.settings().cache_name).await
                } else {
                    controller.on_activate().await?
                }
            } else {
                let mut controller = CacheController::new(settings, storage, site, TracingHost);
                let install = controller.on_install().await?;
                output::print_lines(&output::format_install_report(&install));
                controller.on_activate().await?
            };
            output::print_lines(&output::format_sweep_report(&report));
        }
        SwCommand::Fetch {
            url,
            method,
            navigate,
            offline,
        } => {
            let url = settings.resolve(url)?;
            let method: Method = method.parse()?;
            let request = if *navigate {
                Request::navigate(url)
            } else {
                Request::get(url)
            }
            .with_method(method);
            if *offline {
                fetch_one(settings, storage, OfflineFetcher, &request).await?;
            } else {
                fetch_one(settings, storage, site, &request).await?;
            }
        }
        SwCommand::List => {
            let mut generations = Vec::new();
            for name in storage.keys().await? {
                if let Some(store) = storage.open_existing(&name).await? {
                    generations.push((name, store.keys().await?));
                }
            }
            output::print_lines(&output::format_generations(
                &generations,
                &settings.cache_name,
            ));
        }
        SwCommand::Script { write } => {
            if *write {
                let path = sw::script::write(root, config)?;
                println!("Wrote {}", path.display());
                println!();
                println!("Register it from every page:");
                print!("{}", sw::script::registration_snippet(&config.cache.script_path)?);
            } else {
                print!("{}", sw::script::render(config)?);
            }
        }
    }
    Ok(())
}

async fn fetch_one<F: Fetcher>(
    settings: ControllerSettings,
    storage: DirStorage,
    fetcher: F,
    request: &Request,
) -> Result<(), Box<dyn std::error::Error>> {
    let controller = CacheController::resume(settings, storage, fetcher, TracingHost).await?;
    let outcome = controller.on_fetch(request).await?;
    output::print_lines(&output::format_fetch_outcome(request, &outcome));
    Ok(())
}

/// Log to stderr, filtered by `FOLIO_LOG` (default `info`).
fn init_tracing() {
    let filter = EnvFilter::try_from_env("FOLIO_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize the rayon thread pool based on images config.
///
/// Capped at the number of available cores: `max_processes` can only lower it.
fn init_thread_pool(images: &config::ImagesConfig) {
    let threads = config::effective_threads(images);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
