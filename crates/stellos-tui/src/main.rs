mod action;
mod app;
mod app_state;
mod component;
mod components;
mod http;
mod interaction;
mod mpv;
mod playback;
mod theme;
mod widgets;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use stellos_proto::api::ApiClient;
use stellos_proto::config::Config;

#[derive(Parser)]
#[command(name = "stellos", version)]
#[command(about = "Terminal galaxy map of live tracks")]
struct Cli {
    /// Backend base URL (overrides config and STELLOS_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Token session id; a fresh one is generated per run when omitted
    #[arg(long, global = true)]
    session: Option<String>,

    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Upload an audio file to the galaxy
    Upload {
        file: PathBuf,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        artist: Option<String>,
    },
    /// Print the token balance of the session
    Balance,
}

fn new_session_id() -> String {
    format!("tui-{:016x}", rand::random::<u64>())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let data_dir = stellos_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("stellos.log");
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    // RUST_LOG overrides; HTTP client internals are noisy at debug.
    let log_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "debug,hyper_util=warn,reqwest=warn,hyper=warn".to_string());
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(log_filter.as_str())
        .with_ansi(false)
        .init();

    // ── Load config ──────────────────────────────────────────────────────────
    let mut config = Config::load().unwrap_or_else(|e| {
        tracing::warn!("config load failed, using defaults: {}", e);
        Config::default()
    });
    config.apply_env();
    config.apply_api_url(cli.api_url.clone());

    let api = ApiClient::new(&config.api)?;
    let session_id = cli.session.clone().unwrap_or_else(new_session_id);

    match cli.command {
        Some(CliCommand::Upload {
            file,
            title,
            artist,
        }) => {
            tracing::info!("upload {:?} to {}", file, api.base_url());
            let receipt = api
                .upload(&file, title.as_deref(), artist.as_deref())
                .await?;
            println!("uploaded: track {} ({})", receipt.track_id, receipt.status);
            Ok(())
        }
        Some(CliCommand::Balance) => {
            let balance = api.token_balance(&session_id).await?;
            println!("{}: {} tokens", balance.session_id, balance.balance);
            Ok(())
        }
        None => {
            eprintln!("stellos log: {}", log_path.display());
            tracing::info!(
                "stellos starting… api={} session={}",
                api.base_url(),
                session_id
            );
            app::App::new(config, api, session_id).run().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::parse_from(["stellos", "upload", "song.mp3", "--title", "Nova"]);
        match cli.command {
            Some(CliCommand::Upload { file, title, artist }) => {
                assert_eq!(file, PathBuf::from("song.mp3"));
                assert_eq!(title.as_deref(), Some("Nova"));
                assert_eq!(artist, None);
            }
            _ => panic!("expected upload"),
        }

        let cli = Cli::parse_from(["stellos", "balance", "--session", "tui-abc"]);
        assert!(matches!(cli.command, Some(CliCommand::Balance)));
        assert_eq!(cli.session.as_deref(), Some("tui-abc"));

        let cli = Cli::parse_from(["stellos", "--api-url", "http://h:1"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.api_url.as_deref(), Some("http://h:1"));
    }

    #[test]
    fn test_session_id_shape() {
        let id = new_session_id();
        assert!(id.starts_with("tui-"));
        assert_eq!(id.len(), 4 + 16);
    }
}
