pub mod actions;
pub mod events;
pub mod state;

use crate::auth::store;
use crate::clock::Clock;
use crate::config::PollConfig;
use crate::input;
use crate::lyrics::{self, LrclibClient, LyricsData};
use crate::player::{self, PollerHandle, TrackWatcher};
use crate::spotify::models::format_ms;
use crate::spotify::{PlayerState, SpotifyClient, Track};
use actions::Action;
use events::{Event, NetworkEvent, PlayerEvent};
use lru::LruCache;
use state::AppState;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

const LYRICS_CACHE_SIZE: usize = 64;

/// The `watch` loop: consumes poller events, prints what changes, and
/// forwards transport commands from stdin.
pub struct App {
    api: SpotifyClient,
    lrclib: LrclibClient,
    poll: PollConfig,
    clock: Arc<dyn Clock>,
    state: AppState,
    watcher: TrackWatcher,
    lyrics_cache: LruCache<String, LyricsData>,
    lyrics_tasks: JoinSet<()>,
    command_tasks: JoinSet<()>,
}

impl App {
    pub fn new(api: SpotifyClient, lrclib: LrclibClient, poll: PollConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            api,
            lrclib,
            poll,
            clock,
            state: AppState::new(),
            watcher: TrackWatcher::new(),
            lyrics_cache: LruCache::new(NonZeroUsize::new(LYRICS_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN)),
            lyrics_tasks: JoinSet::new(),
            command_tasks: JoinSet::new(),
        }
    }

    /// Runs until Ctrl-C, `q` or the end of the session.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        let (tx, rx) = mpsc::channel::<Event>(256);
        let _input = AbortOnDrop(input::spawn_input_task(tx.clone()));
        eprintln!("watching playback; p = play/pause, n = next, b = previous, l = queue, q = quit");
        self.watch(tx, rx, tokio::signal::ctrl_c()).await
    }

    async fn watch<F: Future>(
        &mut self,
        tx: mpsc::Sender<Event>,
        mut rx: mpsc::Receiver<Event>,
        shutdown: F,
    ) -> anyhow::Result<()> {
        // Stops both poller tasks when dropped, including on early return.
        let poller = player::spawn(self.api.clone(), &self.poll, self.clock.clone(), tx.clone());
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                ev = rx.recv() => match ev {
                    Some(ev) => self.handle_event(ev, &tx, Some(&poller)),
                    None => break,
                },
                _ = &mut shutdown => break,
            }
            if self.state.should_quit {
                break;
            }
            while self.lyrics_tasks.try_join_next().is_some() {}
            while self.command_tasks.try_join_next().is_some() {}
        }

        drop(poller);
        self.lyrics_tasks.abort_all();
        self.command_tasks.abort_all();

        match self.state.session_ended.take() {
            Some(reason) => anyhow::bail!(reason),
            None => Ok(()),
        }
    }

    fn handle_event(&mut self, ev: Event, tx: &mpsc::Sender<Event>, poller: Option<&PollerHandle>) {
        match ev {
            Event::Input(action) => self.handle_action(action, tx),
            Event::Player(PlayerEvent::Progress { progress_ms }) => {
                if let Some(line) = self.state.advance(progress_ms) {
                    println!("  {}", line.text);
                }
            }
            Event::Network(ne) => self.handle_network(ne, tx, poller),
        }
    }

    /// Transport commands run as tasks; the outcome comes back as
    /// [`NetworkEvent::CommandDone`].
    fn handle_action(&mut self, action: Action, tx: &mpsc::Sender<Event>) {
        let pause = match action {
            Action::Quit => {
                self.state.should_quit = true;
                return;
            }
            Action::ShowQueue => {
                if let Some(t) = self.state.current_track() {
                    println!("Now: {} · {}", t.name, t.artist_names());
                }
                print_queue(&self.state.queue);
                return;
            }
            Action::TogglePlay => self.state.is_playing(),
            Action::Next | Action::Previous => false,
        };

        let api = self.api.clone();
        let tx = tx.clone();
        self.command_tasks.spawn(async move {
            let result = match action {
                Action::TogglePlay if pause => api.pause().await,
                Action::TogglePlay => api.play().await,
                Action::Next => api.next().await,
                Action::Previous => api.previous().await,
                Action::Quit | Action::ShowQueue => Ok(()),
            };
            let (error, fatal) = match result {
                Ok(()) => (None, false),
                Err(e) => (Some(e.to_string()), e.is_fatal()),
            };
            let _ = tx
                .send(Event::Network(NetworkEvent::CommandDone { action, error, fatal }))
                .await;
        });
    }

    fn handle_network(&mut self, ev: NetworkEvent, tx: &mpsc::Sender<Event>, poller: Option<&PollerHandle>) {
        match ev {
            NetworkEvent::PlayerState(state) => self.on_player_state(state, tx),
            NetworkEvent::Queue(tracks) => self.state.queue = tracks,
            NetworkEvent::LyricsLoaded { track_id, lyrics } => {
                self.lyrics_cache.put(track_id.clone(), lyrics.clone());
                if self.state.set_lyrics(&track_id, lyrics) {
                    self.announce_lyrics();
                }
            }
            NetworkEvent::CommandDone { action, error, fatal } => match error {
                None => {
                    if let Some(p) = poller {
                        p.refresh_soon();
                    }
                }
                Some(reason) if fatal => {
                    self.state.session_ended = Some(reason);
                    self.state.should_quit = true;
                }
                Some(e) => {
                    tracing::warn!(?action, error = %e, "command failed");
                    eprintln!("{action:?} failed: {e}");
                }
            },
            NetworkEvent::SessionEnded(reason) => {
                self.state.session_ended = Some(reason);
                self.state.should_quit = true;
            }
        }
    }

    fn on_player_state(&mut self, state: Option<PlayerState>, tx: &mpsc::Sender<Event>) {
        if state.is_none() && self.state.player.is_some() {
            println!("No active device. Start playback in a Spotify app.");
        }
        let changed = self
            .watcher
            .observe(state.as_ref().and_then(|s| s.item.as_ref()))
            .cloned();
        self.state.player = state;

        if let Some(track) = changed {
            self.on_track_change(track, tx);
        }
    }

    /// Runs once per distinct track id.
    fn on_track_change(&mut self, track: Track, tx: &mpsc::Sender<Event>) {
        println!(
            "\n▶ {} · {} ({})",
            track.name,
            track.artist_names(),
            format_ms(track.duration_ms)
        );
        if store::notifications_enabled(self.api.auth().store().as_ref()) {
            notify(&track);
        }

        self.state.expect_lyrics(&track.id);
        if let Some(cached) = self.lyrics_cache.get(&track.id).cloned() {
            self.state.set_lyrics(&track.id, cached);
            self.announce_lyrics();
            return;
        }

        let lrclib = self.lrclib.clone();
        let tx = tx.clone();
        self.lyrics_tasks.spawn(async move {
            let lyrics = lyrics::fetch_for_track(&lrclib, &track).await;
            let _ = tx
                .send(Event::Network(NetworkEvent::LyricsLoaded {
                    track_id: track.id,
                    lyrics,
                }))
                .await;
        });
    }

    fn announce_lyrics(&self) {
        match &self.state.lyrics {
            Some(l) if l.is_synced() => {}
            Some(LyricsData { plain: Some(plain), .. }) => println!("{plain}"),
            _ => println!("  (no lyrics found)"),
        }
    }
}

/// Aborts a detached task when dropped.
struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Track-change notification: terminal bell plus a log line.
fn notify(track: &Track) {
    eprint!("\x07");
    tracing::info!(
        title = %track.name,
        artists = %track.artist_names(),
        cover = track.cover_url().unwrap_or(""),
        "now playing"
    );
}

pub fn print_queue(queue: &[Track]) {
    if queue.is_empty() {
        println!("Queue is empty.");
        return;
    }
    println!("Up next:");
    for (i, t) in queue.iter().enumerate() {
        println!("{:02}. {} · {}", i + 1, t.name, t.artist_names());
    }
}
