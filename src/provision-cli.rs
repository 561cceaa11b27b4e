//! Provision the question store: make sure the database and the language
//! containers exist, and optionally import a JSON dump of questions.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use clap::{Arg, ArgAction, ArgMatches, Command};
use log::{error, info};
use thiserror::Error;

use qna_store::{BulkInsertReport, MongoClient, NewQuestion, QuestionStore, StoreConfig};

const PROGRAM_NAME: &str = "qna-provision";

const ABOUT_TEXT: &str = "Provision the question database and its language containers.

EXIT CODES:
     0: Success.
     1: Error, including an import where any question was rejected.";

const CONFIG: &str = "CONFIG";
const LANGUAGE: &str = "LANGUAGE";
const IMPORT: &str = "IMPORT";
const INTO: &str = "INTO";

const DEFAULT_CONFIG: &str = "Store.toml";

const IMPORT_HELP: &str = "Path to a JSON array of questions to insert.\n\
Each question may carry `answers`, `sources`, `youtubeLinks` and any other fields;\n\
ids, dates and counters in the file are ignored.";

/// Construct the CLI configuration.
fn cli() -> Command {
    // Make the build dirty when the toml changes.
    include_str!("../Cargo.toml");

    clap::command!(PROGRAM_NAME)
        .about(ABOUT_TEXT)
        .arg(
            Arg::new(CONFIG)
                .long("config")
                .short('c')
                .help("Config file; `QNA_*` environment variables override it")
                .default_value(DEFAULT_CONFIG)
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new(LANGUAGE)
                .long("language")
                .short('l')
                .help("Also ensure the container for this language exists (repeatable)")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new(IMPORT)
                .long("import")
                .value_name("FILE")
                .help(IMPORT_HELP)
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new(INTO)
                .long("into")
                .value_name("LANGUAGE")
                .help("Language container to import into [default: the configured default language]")
                .requires(IMPORT)
                .action(ArgAction::Set),
        )
}

/// Errors that this program may produce.
#[derive(Debug, Error)]
enum Error {
    #[error("Bad configuration: {0}")]
    Config(#[from] figment::Error),
    #[error("Could not read {0}: {1}")]
    Io(String, std::io::Error),
    #[error("Could not decode {0}: {1}")]
    Format(String, serde_json::Error),
    #[error(transparent)]
    Store(#[from] qna_store::Error),
    #[error("{rejected} of {submitted} questions were rejected")]
    Incomplete { rejected: usize, submitted: usize },
}

/// Read a JSON array of questions.
fn read_questions(path: &str) -> Result<Vec<NewQuestion>, Error> {
    let file = File::open(path).map_err(|e| Error::Io(path.to_string(), e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| Error::Format(path.to_string(), e))
}

/// Print what an import did, failing if any question was left out.
fn summarize(report: &BulkInsertReport, container: &str) -> Result<(), Error> {
    println!(
        "Imported {} of {} questions into {container}",
        report.inserted().count(),
        report.len(),
    );
    for (index, err) in report.failures() {
        println!("  question {index}: {err}");
    }
    match report.failures().count() {
        0 => Ok(()),
        rejected => Err(Error::Incomplete {
            rejected,
            submitted: report.len(),
        }),
    }
}

async fn run(args: &ArgMatches) -> Result<(), Error> {
    let config_path = args
        .get_one::<String>(CONFIG)
        .map(String::as_str)
        .unwrap_or(DEFAULT_CONFIG);
    let config = StoreConfig::load(config_path)?;
    info!("Loaded config from {config_path}, connecting...");

    let client = MongoClient::with_uri_str(config.db_uri())
        .await
        .map_err(qna_store::Error::StoreUnavailable)?;
    let store = QuestionStore::from_config(Arc::new(client), &config);
    store.init().await?;

    for language in args.get_many::<String>(LANGUAGE).into_iter().flatten() {
        let container = store.container(language).await?;
        info!("Container {} is ready", container.name());
    }

    let Some(path) = args.get_one::<String>(IMPORT) else {
        return Ok(());
    };
    let language = args
        .get_one::<String>(INTO)
        .map(String::as_str)
        .unwrap_or(config.default_language());
    let questions = read_questions(path)?;
    let container = store.container(language).await?;
    let report = container.add_items(questions).await;
    summarize(&report, container.name())
}

#[tokio::main]
async fn main() {
    // Set up logging.
    if let Err(e) = log4rs::init_file("log4rs.yaml", Default::default()) {
        eprintln!("Failed to initialise logging: {e}");
    }

    let args = cli().get_matches();
    if let Err(err) = run(&args).await {
        error!("{err}");
        std::process::exit(1);
    }
}
