use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tokenator_lib::{commands, init_logging, AppState};

#[derive(Parser)]
#[command(name = "tokenator")]
#[command(about = "PushDrop bearer tokens over Nostr message boxes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Data directory holding config, key and token database
    #[arg(short, long, global = true, default_value = ".tokenator")]
    data_dir: PathBuf,

    /// Password for the encrypted signing key
    #[arg(short, long, global = true)]
    password: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the identity key
    Identity,

    /// Create a token without sending it
    Create {
        /// JSON payload (bare text is stored as a string)
        payload: String,

        /// Recipient identity key, "self" or "anyone"
        #[arg(short, long)]
        to: Option<String>,

        #[arg(short = 'g', long)]
        tag: Vec<String>,
    },

    /// Create a token and send it to the recipient's message box
    Send {
        payload: String,

        /// Recipient key, "self" or "anyone". Defaults to the payload's
        /// `recipient` field, then to self
        #[arg(short, long)]
        to: Option<String>,

        #[arg(short = 'g', long)]
        tag: Vec<String>,
    },

    /// Accept every pending token message
    Receive,

    /// List held tokens
    List {
        #[arg(short = 'g', long)]
        tag: Vec<String>,

        /// Require every tag instead of any
        #[arg(long)]
        all: bool,
    },

    /// Spend a held token
    Redeem {
        txid: String,

        #[arg(default_value = "0")]
        vout: u32,

        #[arg(short = 'm', long)]
        description: Option<String>,
    },

    /// Decrypt a held token's payload
    Decrypt {
        txid: String,

        #[arg(default_value = "0")]
        vout: u32,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{text}");
    Ok(())
}

async fn run(cli: Cli) -> Result<(), String> {
    let state =
        AppState::open(&cli.data_dir, cli.password.as_deref()).map_err(|e| e.to_string())?;
    let app = &state.tokenator;

    match cli.command {
        Commands::Identity => print_json(&commands::identity(app).await?),
        Commands::Create { payload, to, tag } => {
            print_json(&commands::create_token(app, &payload, to.as_deref(), tag).await?)
        }
        Commands::Send { payload, to, tag } => {
            print_json(&commands::send_token(app, &payload, to.as_deref(), tag).await?)
        }
        Commands::Receive => print_json(&commands::receive_tokens(app).await?),
        Commands::List { tag, all } => print_json(&commands::list_tokens(app, tag, all).await?),
        Commands::Redeem {
            txid,
            vout,
            description,
        } => print_json(&commands::redeem_token(app, &txid, vout, description).await?),
        Commands::Decrypt { txid, vout } => {
            print_json(&commands::decrypt_token(app, &txid, vout).await?)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
