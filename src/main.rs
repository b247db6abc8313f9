use std::{
    fs,
    sync::Arc,
};

use tracing_subscriber::{
    fmt,
    prelude::*,
    EnvFilter,
};
use yomine_reader::{
    anki::wait_awake,
    core::{
        debug::{
            DebugLog,
            DebugScope,
        },
        utils::normalize_source_text,
        DictionaryEntry,
    },
    persistence::DataDir,
    AnkiConnectClient,
    AnkiNoteService,
    FlashcardConnector,
    ReaderError,
    ReaderSettings,
};

const USAGE: &str = "usage: yomine-reader <entries.json> <source text> [--add <entry index>]";

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(fmt::layer().with_target(false)).with(env_filter).init();
}

struct Args {
    entries_path: String,
    source_text: String,
    add_index: Option<usize>,
}

fn parse_args() -> Result<Args, ReaderError> {
    let mut args = std::env::args().skip(1);
    let usage = || ReaderError::Custom(USAGE.to_string());

    let entries_path = args.next().ok_or_else(usage)?;
    let source_text = args.next().ok_or_else(usage)?;
    let add_index = match args.next().as_deref() {
        None => None,
        Some("--add") => {
            let index = args.next().ok_or_else(usage)?;
            Some(index.parse::<usize>().map_err(|_| usage())?)
        }
        Some(_) => return Err(usage()),
    };

    Ok(Args { entries_path, source_text, add_index })
}

#[tokio::main]
async fn main() -> Result<(), ReaderError> {
    init_tracing();
    let debug = DebugLog::from_env();

    let args = parse_args()?;
    let entries: Vec<DictionaryEntry> =
        serde_json::from_str(&fs::read_to_string(&args.entries_path)?)?;
    let source_text = normalize_source_text(&args.source_text);

    let data_dir = DataDir::app_default();
    let settings = ReaderSettings::load(&data_dir);
    let anki_settings = settings.anki_connect_settings;
    if !anki_settings.enabled {
        tracing::warn!("AnkiConnect is disabled in {}", data_dir.root().display());
    }

    let client = AnkiConnectClient::new(anki_settings.url_or_default())?;
    if !wait_awake(&client, 1, 3).await? {
        return Err(ReaderError::Custom(format!("AnkiConnect not reachable at {}", client.url())));
    }

    let service = AnkiNoteService::new(Arc::new(client), anki_settings);

    match args.add_index {
        Some(index) => {
            let entry = entries.get(index).ok_or_else(|| {
                ReaderError::Custom(format!("No entry {index}; file has {}", entries.len()))
            })?;
            let outcome = service.add_note(entry, &source_text, None).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        None => {
            let result = service.precheck(&entries, &source_text, None).await;
            debug.record(
                DebugScope::Core,
                "Precheck finished",
                Some(serde_json::json!({ "hadConnectionError": result.had_connection_error })),
            );
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    if debug.is_enabled() {
        eprintln!("{}", debug.snapshot(Some(serde_json::json!({ "entries": entries.len() })))?);
    }

    Ok(())
}
