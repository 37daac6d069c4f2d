mod app;
mod auth;
mod clock;
mod config;
mod error;
mod http;
mod input;
mod lyrics;
mod player;
mod spotify;
mod storage;

use anyhow::Context;
use auth::store;
use clap::{Parser, Subcommand, ValueEnum};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "landscape", version, about = "Spotify remote control with synced lyrics")]
struct Cli {
    /// Override config file path.
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Authorize with Spotify in the browser.
    Login,
    /// Forget stored tokens.
    Logout,
    /// Show login state and token expiry.
    Status,
    /// Follow playback and print lyrics as they play (default).
    Watch,
    Play,
    Pause,
    Next,
    Prev,
    /// Print the upcoming queue.
    Queue,
    /// Print lyrics for the current track.
    Lyrics,
    /// Toggle the track-change notification.
    Notify { state: Toggle },
    /// Save the Spotify app client ID to the config file.
    ClientId { client_id: String },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("landscape=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref()).context("load config")?;
    let cfg_path = match cli.config.clone() {
        Some(p) => p,
        None => config::default_config_path().context("default config path")?,
    };

    let db_path = cfg.paths.state_db();
    let storage: Arc<dyn auth::CredentialStore> = Arc::new(
        storage::Storage::open(&db_path).with_context(|| format!("open {}", db_path.display()))?,
    );
    let transport: Arc<dyn http::HttpTransport> = Arc::new(http::ReqwestTransport::new()?);
    let clock: Arc<dyn clock::Clock> = Arc::new(clock::SystemClock);

    let auth = auth::CredentialManager::new(
        cfg.spotify.clone(),
        storage.clone(),
        transport.clone(),
        clock.clone(),
    );
    let api = spotify::SpotifyClient::new(auth.clone(), transport.clone(), cfg.spotify.api_base.clone());
    let lrclib = lyrics::LrclibClient::new(transport, cfg.lyrics.base_url.clone());

    match cli.command.unwrap_or(Command::Watch) {
        Command::Login => login(&cfg, &cfg_path, &auth).await?,
        Command::Logout => {
            auth.logout();
            println!("Logged out.");
        }
        Command::Status => {
            if print_status(&auth, clock.as_ref()) {
                match api.player_state().await? {
                    Some(state) => print_player(&state),
                    None => println!("No active device."),
                }
                app::print_queue(&api.queue().await?);
            }
        }
        Command::Watch => {
            let mut app = app::App::new(api, lrclib, cfg.poll.clone(), clock);
            app.run().await?;
        }
        Command::Play => api.play().await?,
        Command::Pause => api.pause().await?,
        Command::Next => api.next().await?,
        Command::Prev => api.previous().await?,
        Command::Queue => {
            let queue = api.queue().await?;
            app::print_queue(&queue);
        }
        Command::Lyrics => {
            let Some(track) = api.player_state().await?.and_then(|s| s.item) else {
                println!("Nothing is playing.");
                return Ok(());
            };
            let lyrics = lyrics::fetch_for_track(&lrclib, &track).await;
            print_lyrics(&track, &lyrics);
        }
        Command::Notify { state } => {
            let enabled = matches!(state, Toggle::On);
            store::set_notifications(storage.as_ref(), enabled).context("save notification flag")?;
            println!("Notifications {}.", if enabled { "on" } else { "off" });
        }
        Command::ClientId { client_id } => {
            let mut cfg = cfg;
            cfg.spotify.client_id = client_id.trim().to_string();
            config::save(&cfg, Some(&cfg_path)).context("save config")?;
            println!("Updated client ID in {}.", cfg_path.display());
        }
    }

    Ok(())
}

async fn login(
    cfg: &config::Config,
    cfg_path: &std::path::Path,
    auth: &auth::CredentialManager,
) -> anyhow::Result<()> {
    if cfg.spotify.client_id.is_empty() {
        anyhow::bail!(
            "no Spotify client ID; run `landscape client-id <ID>` or set spotify.client_id in {}",
            cfg_path.display()
        );
    }

    let url = auth.begin_auth()?;
    println!("Open this URL to authorize:\n\n  {url}\n");
    let code = auth::callback::wait_for_code(auth.redirect_uri())
        .await
        .context("wait for authorization callback")?;

    match auth.exchange_code(&code).await? {
        Some(_) => {
            println!("Logged in.");
            Ok(())
        }
        None => anyhow::bail!("token exchange failed, see log for details"),
    }
}

/// Prints the token state; false when there is no session to query with.
fn print_status(auth: &auth::CredentialManager, clock: &dyn clock::Clock) -> bool {
    if auth.stored_token().is_none() {
        println!("Not logged in. Run `landscape login`.");
        return false;
    }
    match auth.expires_at() {
        Some(at) => {
            let left = at - clock.now_ms();
            if left > 0 {
                println!("Logged in, token valid for {}.", spotify::models::format_ms(left as u64));
            } else {
                println!("Logged in, token expired (refreshed on next request).");
            }
        }
        None => println!("Logged in."),
    }
    true
}

fn print_player(state: &spotify::PlayerState) {
    let Some(track) = &state.item else {
        println!("Nothing is playing.");
        return;
    };
    let fmt = spotify::models::format_ms;
    println!(
        "{} {} · {}  {}/{}",
        if state.is_playing { "▶" } else { "⏸" },
        track.name,
        track.artist_names(),
        fmt(state.progress_ms),
        fmt(track.duration_ms)
    );
}

fn print_lyrics(track: &spotify::Track, lyrics: &lyrics::LyricsData) {
    println!("{} · {}\n", track.name, track.artist_names());
    if let Some(lines) = &lyrics.synced {
        for line in lines {
            println!("[{}] {}", spotify::models::format_ms((line.time * 1000.0) as u64), line.text);
        }
    } else if let Some(plain) = &lyrics.plain {
        println!("{plain}");
    } else {
        println!("No lyrics found.");
    }
}
