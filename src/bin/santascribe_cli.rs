use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use santascribe::{
    client::{FormController, FormState, LetterClient, MemorySessionStore, SubmitOutcome},
    model::Gender,
};

#[derive(Parser, Debug)]
#[command(name = "santascribe-cli", version, about = "Ask a SantaScribe server for a letter from Santa")]
struct Cli {
    /// Base URL of the SantaScribe server
    #[arg(long, default_value = "http://127.0.0.1:3000")]
    server: String,

    /// Only probe /api/health and report the result
    #[arg(long)]
    health: bool,

    #[arg(long)]
    name: Option<String>,

    #[arg(long)]
    age: Option<String>,

    #[arg(long, value_enum)]
    gender: Option<GenderArg>,

    #[arg(long, default_value = "")]
    good_things: String,

    #[arg(long, default_value = "")]
    bad_things: String,

    /// Put the child on the naughty list
    #[arg(long)]
    naughty: bool,

    #[arg(long)]
    gifts: Option<String>,

    #[arg(long, default_value = "")]
    notes: String,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum GenderArg {
    Boy,
    Girl,
}

impl From<GenderArg> for Gender {
    fn from(value: GenderArg) -> Self {
        match value {
            GenderArg::Boy => Gender::Boy,
            GenderArg::Girl => Gender::Girl,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = LetterClient::new(cli.server.clone());

    if cli.health {
        let health = client.check_health().await;
        println!("{}", serde_json::to_string_pretty(&health)?);
        if !health.is_success() {
            bail!("{}", health.message);
        }
        return Ok(());
    }

    let form = FormController::new(client, Arc::new(MemorySessionStore::new()));
    form.edit(|draft| {
        draft.child_name = cli.name.clone().unwrap_or_default();
        draft.age = cli.age.clone();
        draft.gender = cli.gender.map(Gender::from).unwrap_or_default();
        draft.good_things = cli.good_things.clone();
        draft.bad_things = cli.bad_things.clone();
        draft.is_on_good_list = !cli.naughty;
        draft.gifts = cli.gifts.clone();
        draft.additional_notes = cli.notes.clone();
    });

    match form.submit().await {
        Ok(SubmitOutcome::Generated(letter)) => {
            println!("{}", letter.letter);
            Ok(())
        }
        Ok(SubmitOutcome::Ignored) => bail!("a letter is already being written"),
        Err(err) => {
            if let FormState::Error(body) = form.state() {
                if let Some(details) = body.details {
                    eprintln!("{details}");
                }
            }
            bail!("{err}")
        }
    }
}
