use modsync::{Config, KeyClient, KeyStore, NullProgress, SyncError, SyncService};

use clap::{Arg, ArgAction, Command, crate_description, crate_name, crate_version};
use std::path::{Path, PathBuf};

fn start() -> Result<i32, SyncError> {
    let matches = Command::new(crate_name!())
        .version(crate_version!())
        .about(crate_description!())
        .arg(
            Arg::new("debug")
                .short('d')
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Prints debugging information"),
        )
        .arg(
            Arg::new("base_dir")
                .value_name("directory")
                .long("base-dir")
                .short('C')
                .global(true)
                .help("Base directory holding the configuration and the cache (defaults to the working directory)"),
        )
        .subcommand(Command::new("sync").about("Run a sync cycle and print the admitted artifact paths"))
        .subcommand(
            Command::new("check")
                .about("Re-check a single cached artifact against its signature")
                .arg(
                    Arg::new("file")
                        .value_name("mod_file")
                        .required(true)
                        .help("Cached artifact to verify"),
                ),
        )
        .subcommand(Command::new("keys").about("Print the keys in the trust store"))
        .get_matches();

    let debug = matches.get_flag("debug");
    env_logger::builder()
        .format_timestamp(None)
        .format_level(false)
        .format_module_path(false)
        .format_target(false)
        .filter_level(if debug {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    let base_dir = matches
        .get_one::<String>("base_dir")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let config = Config::load(&base_dir)?;

    if matches.subcommand_matches("keys").is_some() {
        let client = KeyClient::new(config.timeout());
        let keystore = KeyStore::load(
            &base_dir.join(&config.key_ring_path),
            &config.key_servers,
            &config.key_ids,
            &client,
        )?;
        println!("{} key ring(s) in the trust store", keystore.len());
        keystore.debug_dump();
        return Ok(0);
    }

    if let Some(matches) = matches.subcommand_matches("check") {
        let file = matches
            .get_one::<String>("file")
            .ok_or_else(|| SyncError::Config("missing file argument".to_string()))?;
        let client = KeyClient::new(config.timeout());
        let keystore = KeyStore::load(
            &base_dir.join(&config.key_ring_path),
            &config.key_servers,
            &config.key_ids,
            &client,
        )?;
        let path = resolve(&base_dir, &config, file);
        if keystore.verify_file(&path) {
            println!("{}: OK", path.display());
            return Ok(0);
        }
        println!("{}: verification failed", path.display());
        return Ok(1);
    }

    // Default action: run a sync cycle
    let service = SyncService::start(&config, &base_dir, Box::new(NullProgress))?;
    let report = service.wait();
    for path in &report.admitted {
        println!("{}", path.display());
    }
    let incomplete = report.incomplete();
    service.shutdown();
    if incomplete {
        log::warn!(
            "Sync incomplete: the mod list could not be refreshed, cached content may be missing or outdated"
        );
        return Ok(1);
    }
    Ok(0)
}

/// Bare file names refer to the cache directory, anything with a
/// separator is used as given.
fn resolve(base_dir: &Path, config: &Config, file: &str) -> PathBuf {
    let given = Path::new(file);
    if given.components().count() > 1 {
        given.to_path_buf()
    } else {
        base_dir.join(&config.mod_dir).join(given)
    }
}

fn main() {
    match start() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(2);
        }
    }
}
