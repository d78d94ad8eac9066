use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use log::{error, info, warn};

use gamedata_binder::config::{self, AppConfig};
use gamedata_binder::memory::ProcessScanner;
use gamedata_binder::provider::GameDataStorage;
use gamedata_binder::schema::{
    Collaborators, GameSceneNodeHelper, ObserverServicesHelper, PlayerPawnHelper,
};
use gamedata_binder::{
    BindingRegistry, GameConfig, HostMetadata, LayeredHost, LoadReport, Platform, Requirement,
    Resolver, SchemaDump,
};

/// Resolves every registered consumer against a gamedata set and reports
/// what the current host build no longer provides.
#[derive(Parser, Debug)]
#[command(name = "gamedata-check", version, about)]
struct Args {
    /// Gamedata document, may be repeated. Overrides the configured list.
    #[arg(long = "gamedata", value_name = "FILE")]
    gamedata: Vec<PathBuf>,

    /// Schema dump of the host's class metadata.
    #[arg(long, value_name = "FILE")]
    schema: Option<PathBuf>,

    /// Platform whose gamedata values are used.
    #[arg(long)]
    platform: Option<Platform>,

    /// Scan a running process for signatures. Defaults to the configured process.
    #[arg(long, value_name = "NAME", num_args = 0..=1, default_missing_value = "")]
    attach: Option<String>,

    /// Log at debug level.
    #[arg(short, long)]
    verbose: bool,
}

// ─── Logging ─────────────────────────────────────────────────────────

const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024; // 10 MB

fn rotate_file(path: &Path) {
    if let Ok(meta) = std::fs::metadata(path) {
        if meta.len() >= MAX_LOG_SIZE {
            let old = path.with_extension("old");
            let _ = std::fs::rename(path, old);
        }
    }
}

fn setup_logging(level: log::LevelFilter) {
    let log_path = config::config_dir().join("gamedata-check.log");
    rotate_file(&log_path);

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path);

    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339_millis(std::time::SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr());

    if let Ok(file) = log_file {
        dispatch = dispatch.chain(file);
    } else {
        eprintln!("Warning: could not open log file {}", log_path.display());
    }

    if let Err(e) = dispatch.apply() {
        eprintln!("Warning: could not initialize logger: {}", e);
    }
}

// ─── Inputs ──────────────────────────────────────────────────────────

fn load_gamedata(paths: &[PathBuf], platform: Platform) -> GameConfig {
    let mut merged = GameConfig::new();
    for path in paths {
        match GameConfig::load(path, platform) {
            Ok(config) => merged.merge(config),
            Err(e) => error!("Skipping gamedata {}: {}", path.display(), e),
        }
    }
    merged
}

fn load_schema(path: &Path) -> SchemaDump {
    match SchemaDump::load(path) {
        Ok(dump) => {
            info!("Schema dump lists {} classes", dump.class_count());
            dump
        }
        Err(e) => {
            warn!("No schema dump loaded from {}: {}", path.display(), e);
            SchemaDump::new()
        }
    }
}

fn print_report(report: &LoadReport) {
    for diagnostic in &report.diagnostics {
        let tag = match diagnostic.requirement {
            Requirement::Required => "FAIL",
            Requirement::Optional => "skip",
        };
        println!("{} {}", tag, diagnostic);
    }
    println!(
        "{} symbols resolved, {} unresolved: {}",
        report.resolved,
        report.diagnostics.len(),
        if report.success { "ok" } else { "FAILED" }
    );
}

// ─── Main ────────────────────────────────────────────────────────────

fn main() -> ExitCode {
    let args = Args::parse();
    let app_config = AppConfig::load();
    let level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        app_config.level_filter()
    };
    setup_logging(level);

    info!("gamedata-check {} starting", env!("CARGO_PKG_VERSION"));

    let platform = args.platform.unwrap_or_else(|| {
        if app_config.platform.is_empty() {
            return Platform::current();
        }
        app_config.platform.parse().unwrap_or_else(|e| {
            warn!("{}, using {}", e, Platform::current());
            Platform::current()
        })
    });

    let gamedata_paths: Vec<PathBuf> = if args.gamedata.is_empty() {
        app_config
            .gamedata_paths
            .iter()
            .map(|p| AppConfig::resolve_path(p))
            .collect()
    } else {
        args.gamedata
    };
    let gamedata = load_gamedata(&gamedata_paths, platform);

    let schema_path = args
        .schema
        .unwrap_or_else(|| AppConfig::resolve_path(&app_config.schema_dump_path));
    let schema = load_schema(&schema_path);

    let scanner = args.attach.map(|name| {
        if name.is_empty() {
            app_config.process_name.clone()
        } else {
            name
        }
    });
    let scanner = match scanner.map(|name| ProcessScanner::attach(&name)) {
        Some(Ok(scanner)) => Some(scanner),
        Some(Err(e)) => {
            error!("Cannot attach: {}", e);
            return ExitCode::from(2);
        }
        None => None,
    };

    let mut host = LayeredHost::new().with(&schema);
    if let Some(scanner) = &scanner {
        host = host.with(scanner as &dyn HostMetadata);
    }

    let mut registry = BindingRegistry::new();
    let mut helpers = Collaborators::new()
        .with(GameSceneNodeHelper::new())
        .with(ObserverServicesHelper::new())
        .with(PlayerPawnHelper::new());
    let failures = helpers.add_listeners(&mut registry, &host);
    for (class, e) in &failures {
        println!("FAIL {}: {}", class, e);
    }
    let _storage = GameDataStorage::new(&mut registry);

    let report = Resolver::new(&host).load(&mut registry, &gamedata);
    print_report(&report);

    helpers.clear();
    if report.success && failures.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
