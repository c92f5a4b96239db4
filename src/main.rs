use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};

use hrchat::auth::{FileTokenStore, TokenStore};
use hrchat::client::HttpAssistantClient;
use hrchat::controller::{SendError, SessionController};
use hrchat::repl;
use hrchat::settings::{SettingsOverrides, env_overrides, resolve_settings};

#[derive(Debug, Parser)]
#[command(name = "hrchat")]
#[command(about = "Terminal chat client for the HR assistant", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start an interactive chat session.
    Chat {
        /// Assistant server base URL.
        #[arg(long)]
        server: Option<String>,
        /// Token file location.
        #[arg(long)]
        token_file: Option<PathBuf>,
    },
    /// Store a token obtained from the HR portal's login flow.
    Login {
        /// The token value; prompted for when omitted.
        #[arg(long)]
        token: Option<String>,
        #[arg(long)]
        token_file: Option<PathBuf>,
    },
    /// Delete the stored token.
    Logout {
        #[arg(long)]
        token_file: Option<PathBuf>,
    },
    /// Show the target server and whether a token is stored.
    Status {
        #[arg(long)]
        server: Option<String>,
        #[arg(long)]
        token_file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Chat { server, token_file } => {
            let settings = resolve_settings(
                &SettingsOverrides {
                    server_url: server,
                    token_file,
                },
                &env_overrides(),
            )?;
            let store = Arc::new(FileTokenStore::new(settings.token_path));
            let api = Arc::new(HttpAssistantClient::new(settings.server_url));
            let controller = Arc::new(SessionController::new(api, store));

            match controller.initialize() {
                Ok(()) => repl::run(controller).await?,
                Err(SendError::NotAuthenticated) => {
                    println!(
                        "Not logged in. Run `hrchat login` with the token from the HR portal."
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }
        Commands::Login { token, token_file } => {
            let store = token_store(token_file)?;
            let token = match token {
                Some(t) => t,
                None => prompt_for_token()?,
            };
            let token = token.trim();
            if token.is_empty() {
                anyhow::bail!("token is empty");
            }
            store.store(token)?;
            println!("Token stored at {}", store.path().display());
        }
        Commands::Logout { token_file } => {
            let store = token_store(token_file)?;
            store.clear()?;
            println!("Logged out.");
        }
        Commands::Status { server, token_file } => {
            let settings = resolve_settings(
                &SettingsOverrides {
                    server_url: server,
                    token_file,
                },
                &env_overrides(),
            )?;
            let store = FileTokenStore::new(settings.token_path);
            println!("Server: {}", settings.server_url);
            match store.load()? {
                Some(_) => println!("Logged in (token at {})", store.path().display()),
                None => println!("Not logged in."),
            }
        }
    }
    Ok(())
}

fn token_store(token_file: Option<PathBuf>) -> anyhow::Result<FileTokenStore> {
    let settings = resolve_settings(
        &SettingsOverrides {
            server_url: None,
            token_file,
        },
        &env_overrides(),
    )?;
    Ok(FileTokenStore::new(settings.token_path))
}

fn prompt_for_token() -> anyhow::Result<String> {
    eprint!("Paste token: ");
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line)
}
