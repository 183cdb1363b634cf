use std::path::PathBuf;
use std::sync::Arc;

use driveindex_engine::auth::{AuthContext, AuthScheme, SessionCookies};
use driveindex_engine::config::{load_crawl_config, save_crawl_config};
use driveindex_engine::crawl::CancelToken;
use driveindex_engine::descriptor::{crawl_descriptor, SourceSpec};
use driveindex_engine::events::JsonlLog;
use driveindex_engine::http::UreqTransport;
use driveindex_engine::models::LinkDescriptor;
use driveindex_engine::pagination::ListingClient;
use driveindex_engine::paths::AppPaths;
use driveindex_engine::resolver::LinkResolver;

fn main() -> Result<(), String> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "-h" || a == "--help") {
        print_help();
        return Ok(());
    }

    let mut base_dir: Option<PathBuf> = None;
    let mut source: Option<String> = None;
    let mut descriptor_json: Option<String> = None;
    let mut cookies_file: Option<PathBuf> = None;
    let mut resolve = false;
    let mut parallel = false;
    let mut init_config = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--base-dir" => {
                i += 1;
                let v = args
                    .get(i)
                    .ok_or_else(|| "--base-dir requires a value".to_string())?;
                base_dir = Some(PathBuf::from(v));
            }
            "--source" => {
                i += 1;
                let v = args
                    .get(i)
                    .ok_or_else(|| "--source requires a value".to_string())?;
                source = Some(v.to_string());
            }
            "--descriptor" => {
                i += 1;
                let v = args
                    .get(i)
                    .ok_or_else(|| "--descriptor requires a value".to_string())?;
                descriptor_json = Some(v.to_string());
            }
            "--cookies" => {
                i += 1;
                let v = args
                    .get(i)
                    .ok_or_else(|| "--cookies requires a value".to_string())?;
                cookies_file = Some(PathBuf::from(v));
            }
            "--resolve" => resolve = true,
            "--parallel" => parallel = true,
            "--init-config" => init_config = true,
            other => return Err(format!("unknown arg: {other} (try --help)")),
        }
        i += 1;
    }

    let base_dir = base_dir
        .or_else(default_base_dir)
        .ok_or_else(|| "could not determine base dir; pass --base-dir".to_string())?;
    let paths = AppPaths::new(AppPaths::normalize_base_dir(&base_dir));
    paths.ensure_dirs().map_err(|e| e.to_string())?;

    let mut config = load_crawl_config(&paths).map_err(|e| e.to_string())?;
    if init_config {
        save_crawl_config(&paths, &config).map_err(|e| e.to_string())?;
        println!("Config: {}", paths.crawl_config_path().to_string_lossy());
        return Ok(());
    }
    if parallel {
        config.parallel = true;
    }

    let (descriptor, basic) = match (source, descriptor_json) {
        (Some(raw), None) => {
            let spec = SourceSpec::parse(&raw).map_err(|e| e.to_string())?;
            (spec.descriptor(), spec.auth)
        }
        (None, Some(raw)) => (
            LinkDescriptor::from_json(&raw).map_err(|e| e.to_string())?,
            AuthScheme::None,
        ),
        _ => return Err("pass exactly one of --source or --descriptor".to_string()),
    };

    let raw_cookies = match cookies_file {
        Some(path) => Some(std::fs::read_to_string(path).map_err(|e| e.to_string())?),
        None => paths.read_cookies().map_err(|e| e.to_string())?,
    };
    let cookies = Arc::new(
        raw_cookies
            .as_deref()
            .map(SessionCookies::from_raw)
            .unwrap_or_default(),
    );

    let scheme = match (basic, config.hash_origin.clone()) {
        (AuthScheme::None, Some(origin)) => AuthScheme::DerivedHash {
            origin,
            secret: None,
        },
        (scheme, _) => scheme,
    };

    let transport = UreqTransport::new(config.timeout_secs, config.user_agent.as_deref());
    let mut auth = AuthContext::new(scheme, cookies);
    if config.bootstrap_seed {
        auth = auth.with_bootstrap_seed(&transport).map_err(|e| e.to_string())?;
    }

    let log = JsonlLog::for_paths(&paths);
    let log_fn = |level: &str, event: &str, data: serde_json::Value| log.log(level, event, data);

    let client = ListingClient::new(&transport, &auth, &config.codec).with_max_pages(config.max_pages);
    let options = config.crawl_options(None);
    let outcome = crawl_descriptor(&client, &descriptor, &options, CancelToken::new(), &log_fn)
        .map_err(|e| e.to_string())?;

    let leaves: Vec<serde_json::Value> = outcome
        .leaves
        .iter()
        .map(|leaf| {
            serde_json::json!({
                "ordinal": leaf.ordinal,
                "episode_number": leaf.episode_number,
                "name": leaf.display_name,
                "url": leaf.raw_reference,
                "path": leaf.path,
                "size_bytes": leaf.size_bytes,
                "info": leaf.info_label(),
            })
        })
        .collect();

    let mut report = serde_json::json!({
        "leaves": leaves,
        "thumbnail_url": outcome.thumbnail_url,
        "skipped": outcome.skipped,
    });

    if resolve {
        let resolver = LinkResolver::new(&transport, &auth, &log_fn);
        let resolved: Vec<serde_json::Value> = resolver
            .resolve_all(&outcome.leaves)
            .into_iter()
            .map(|(leaf, video)| {
                serde_json::json!({
                    "ordinal": leaf.ordinal,
                    "label": video.display_label,
                    "playback_url": video.playback_url,
                })
            })
            .collect();
        report["resolved"] = serde_json::Value::Array(resolved);
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?
    );
    Ok(())
}

fn default_base_dir() -> Option<PathBuf> {
    if let Ok(v) = std::env::var("DRIVEINDEX_BASE_DIR") {
        let t = v.trim();
        if !t.is_empty() {
            return Some(PathBuf::from(t));
        }
    }
    None
}

fn print_help() {
    println!(
        r#"driveindex_crawl

Crawls a drive-index folder and prints the discovered episodes as JSON.

Usage:
  cargo run --bin driveindex_crawl -- --source "[Show]https://idx.example.workers.dev/0:/Show/#2"
  cargo run --bin driveindex_crawl -- --source "https://idx.example.workers.dev/0:/Show/#1,1,12" --resolve
  cargo run --bin driveindex_crawl -- --descriptor '{{"type":"single","url":"https://..."}}'

Options:
  --base-dir <path>       Override base dir (default: $DRIVEINDEX_BASE_DIR)
  --source <string>       [name]https://host/0:/path/#depth[,start,stop]
  --descriptor <json>     Stored link descriptor (single, multi or search)
  --cookies <file>        Cookie header or JSON export (default: <base-dir>/config/cookies.txt)
  --resolve               Resolve playback urls for every episode
  --parallel              Crawl root subfolders concurrently
  --init-config           Write the current config to <base-dir>/config/crawl.json and exit
"#
    );
}
