use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser};
use log::LevelFilter;
use verscout::{
    arguments::Arguments,
    config::Config,
    engine::{FingerprintResult, PluginFingerprinter, WebAppFingerprinter},
    guess::{PluginGuesser, WebAppGuesser},
    http::HttpFetcher,
    scanner::Scanner,
    tables::{builder, store},
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Arguments::parse();
    pretty_env_logger::env_logger::builder()
        .filter_level(if args.verbose { LevelFilter::Debug } else { LevelFilter::Info })
        .format_timestamp(None)
        .init();

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::builtin(),
    };

    if args.list {
        return list_supported(&config);
    }

    if let Some(basepath) = &args.build_db {
        // with -b the sole positional is the app name, not a URL
        let Some(app_name) = args.app_name.as_deref().or(args.url.as_deref()) else {
            bail!("--build-db requires an app name");
        };
        return build_database(&config, app_name, args.plugin_name.as_deref(), basepath);
    }

    let (Some(url), Some(app_name)) = (&args.url, &args.app_name) else {
        eprintln!("Error: url and appName are required arguments unless using -l, -b, or -h\n");
        Arguments::command().print_help()?;
        return Ok(());
    };

    let url = normalize_url(url);
    let fetcher = HttpFetcher::new()?;
    let cache = store::TableCache::new();

    if app_name == "guess" {
        println!("Probing...");
        let mut guesser = WebAppGuesser::new(&fetcher, &cache, &config, &url);
        let apps = guesser.guess_apps(None).await?;
        println!("Possible apps:");
        for app in apps {
            println!("{app}");
        }
        return Ok(());
    }

    if app_name == "scan" {
        let scanner = Scanner::new(&fetcher, &cache, &config, &url, true, args.num_probes, args.winnow);
        let report = scanner.scan().await?;
        print!("{report}");
        if let Some(path) = &args.result {
            report.write_to(path)?;
            println!("Results saved to {path}");
        }
        return Ok(());
    }

    if config.app(app_name).is_err() {
        eprintln!("Unsupported web app \"{app_name}\"");
        return Ok(());
    }

    if !args.skip {
        let fingerprinter = WebAppFingerprinter::new(
            &fetcher,
            &cache,
            &config,
            &url,
            app_name,
            args.num_probes,
            args.winnow,
        );
        print_result(&fingerprinter.fingerprint().await?);
    }

    match args.plugin_name.as_deref() {
        Some("guess") => {
            let mut guesser = PluginGuesser::new(&fetcher, &cache, &config, &url, app_name)?;
            let plugins = guesser.guess_plugins().await?;
            println!("Possible plugins:");
            for plugin in plugins {
                println!("{plugin}");
            }
        }
        Some(plugin_name) => {
            let fingerprinter = PluginFingerprinter::new(
                &fetcher,
                &cache,
                &config,
                &url,
                app_name,
                plugin_name,
                args.num_probes,
                args.winnow,
            )?;
            print_result(&fingerprinter.fingerprint().await?);
        }
        None => {}
    }

    Ok(())
}

/// Strips trailing slashes and defaults the scheme to plain http, matching
/// how targets are usually pasted in.
fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

fn print_result(result: &FingerprintResult) {
    if result.versions.is_empty() {
        println!("Error: All versions ruled out!");
        return;
    }
    println!("Fingerprinting resulted in:");
    for version in &result.versions {
        println!("{version}");
    }
    if let Some(guess) = &result.best_guess {
        println!("\nBest Guess: {guess}");
    }
}

fn list_supported(config: &Config) -> Result<()> {
    println!("Currently configured web apps: {}", config.apps.len());
    for app_name in config.apps.keys() {
        let plugins = config.plugin_dbs(app_name)?;
        println!("{app_name} with {} plugins", plugins.len());
        for plugin in plugins {
            println!(" - {plugin}");
        }
    }
    Ok(())
}

fn build_database(
    config: &Config,
    app_name: &str,
    plugin_name: Option<&str>,
    basepath: &str,
) -> Result<()> {
    let app = config.app(app_name)?;
    let version_directory_regex = app.version_directory_regex()?;
    let filters = builder::WalkFilters {
        directory_exclude: app.directory_exclude_regex()?,
        file_exclude: app.file_exclude_regex()?,
    };
    let tables = builder::compute_tables(basepath, &version_directory_regex, &filters)
        .with_context(|| format!("Failed to build tables from {basepath}"))?;
    let db_path = match plugin_name {
        Some(plugin) => config.plugin_db_path(app_name, plugin),
        None => config.db_path(app_name),
    };
    store::save_tables(&db_path, &tables)?;
    println!("Saved database to {}", db_path.display());
    Ok(())
}
