mod batch;
mod config;
mod glean;
mod instrumentation;

use std::path::PathBuf;

use anyhow::Result;
use clap::error::ErrorKind;
use clap::Parser;
use tracing::{error, info};

use batch::BatchRunner;
use config::{Config, Overrides};
use glean::GleanClient;

const USAGE: &str =
    "Usage: glean-batch -v -d false -a <app-id> -q <questions-csv> -u <user>";

#[derive(Parser, Debug, Default)]
#[command(
    name = "glean-batch",
    version,
    about = "Answer a CSV of questions with the Glean chat API"
)]
struct Cli {
    /// Glean AI application id
    #[arg(short, long = "app-id")]
    app_id: Option<String>,

    /// Dry run: log requests instead of sending them (true/false)
    #[arg(short, long)]
    debug: Option<String>,

    /// Path to the questions CSV
    #[arg(short, long = "questions-csv")]
    questions_csv: Option<PathBuf>,

    /// Ask as this user
    #[arg(short, long)]
    user: Option<String>,

    /// Log request and response details
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            app_id: self.app_id.clone(),
            debug: self.debug.clone(),
            questions_csv: self.questions_csv.clone(),
            user: self.user.clone(),
            verbose: self.verbose,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let (cli, usage_error) = match Cli::try_parse() {
        Ok(cli) => (cli, None),
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => (Cli::default(), Some(e)),
    };
    let overrides = cli.overrides();
    let config = Config::from_env(&overrides);

    let debug_logging = match &config {
        Ok(config) => config.debug || config.verbose,
        Err(_) => config::debug_requested(&overrides),
    };
    instrumentation::init_logging(debug_logging, cli.log_json);

    if let Some(e) = usage_error {
        error!("{}", e.to_string().trim_end());
        error!("{}", USAGE);
    }

    let config = match config {
        Ok(config) => config,
        Err(config::ConfigError::Missing(keys)) => {
            for key in &keys {
                error!("Required environment variable {} not set", key);
            }
            error!("Not all required environment variables are set. Exiting.");
            std::process::exit(1);
        }
    };

    let mut questions = batch::read_questions(&config.questions_csv);
    if questions.is_empty() {
        error!("No questions found or error reading CSV file. Exiting.");
        return Ok(());
    }

    let output = batch::output_path(
        &config.questions_csv,
        chrono::Local::now().naive_local(),
        config.act_as.as_deref(),
    );
    let client = GleanClient::new(&config)?;
    let report = BatchRunner::new(&client, output)
        .persist(!config.debug)
        .run(&mut questions)
        .await;

    info!("Processing complete.");
    println!("{}", report.summary());

    Ok(())
}
