use super::progress::ProgressClock;
use crate::app::events::{Event, NetworkEvent, PlayerEvent};
use crate::clock::Clock;
use crate::config::PollConfig;
use crate::error::Error;
use crate::spotify::SpotifyClient;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Owns the poll and progress tasks. Dropping it stops both.
#[derive(Debug)]
pub struct PollerHandle {
    poll: JoinHandle<()>,
    tick: JoinHandle<()>,
    refresh_tx: mpsc::Sender<()>,
}

impl PollerHandle {
    /// Poll again shortly, e.g. after a transport command.
    pub fn refresh_soon(&self) {
        // A pending request already covers this one.
        let _ = self.refresh_tx.try_send(());
    }

    #[cfg(test)]
    pub fn is_finished(&self) -> bool {
        self.poll.is_finished()
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.poll.abort();
        self.tick.abort();
    }
}

pub fn spawn(
    api: SpotifyClient,
    cfg: &PollConfig,
    clock: Arc<dyn Clock>,
    tx: mpsc::Sender<Event>,
) -> PollerHandle {
    let (snapshot_tx, snapshot_rx) = watch::channel(None::<ProgressClock>);
    let (refresh_tx, refresh_rx) = mpsc::channel(1);

    let poll = tokio::spawn(poll_loop(
        api,
        cfg.interval(),
        cfg.action_settle(),
        clock.clone(),
        snapshot_tx,
        refresh_rx,
        tx.clone(),
    ));
    let tick = tokio::spawn(tick_loop(snapshot_rx, cfg.tick(), clock, tx));

    PollerHandle {
        poll,
        tick,
        refresh_tx,
    }
}

async fn poll_loop(
    api: SpotifyClient,
    every: Duration,
    settle: Duration,
    clock: Arc<dyn Clock>,
    snapshot: watch::Sender<Option<ProgressClock>>,
    mut refresh_rx: mpsc::Receiver<()>,
    tx: mpsc::Sender<Event>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            Some(()) = refresh_rx.recv() => {
                tokio::time::sleep(settle).await;
                ticker.reset();
            }
        }
        if poll_once(&api, clock.as_ref(), &snapshot, &tx).await.is_break() {
            break;
        }
    }
    tracing::debug!("poller stopped");
}

/// One fetch of player state and queue. `Break` when polling can't continue.
async fn poll_once(
    api: &SpotifyClient,
    clock: &dyn Clock,
    snapshot: &watch::Sender<Option<ProgressClock>>,
    tx: &mpsc::Sender<Event>,
) -> ControlFlow<()> {
    let (state, queue) = tokio::join!(api.player_state(), api.queue());
    let mut fatal: Option<Error> = None;

    match state {
        Ok(state) => {
            snapshot.send_replace(Some(ProgressClock::from_state(state.as_ref(), clock.now_ms())));
            if tx
                .send(Event::Network(NetworkEvent::PlayerState(state)))
                .await
                .is_err()
            {
                return ControlFlow::Break(());
            }
        }
        Err(e) if e.is_fatal() => fatal = Some(e),
        Err(e) => tracing::warn!(error = %e, "player state poll failed"),
    }

    match queue {
        Ok(tracks) => {
            if tx
                .send(Event::Network(NetworkEvent::Queue(tracks)))
                .await
                .is_err()
            {
                return ControlFlow::Break(());
            }
        }
        Err(e) if e.is_fatal() => {
            fatal.get_or_insert(e);
        }
        Err(e) => tracing::warn!(error = %e, "queue poll failed"),
    }

    match fatal {
        Some(e) => {
            tracing::warn!(error = %e, "stopping poller");
            let _ = tx
                .send(Event::Network(NetworkEvent::SessionEnded(e.to_string())))
                .await;
            ControlFlow::Break(())
        }
        None => ControlFlow::Continue(()),
    }
}

/// Emits interpolated progress every `every` while playing. When paused it
/// reports the pinned value once and waits for the next snapshot.
async fn tick_loop(
    mut snapshot: watch::Receiver<Option<ProgressClock>>,
    every: Duration,
    clock: Arc<dyn Clock>,
    tx: mpsc::Sender<Event>,
) {
    loop {
        let current = *snapshot.borrow_and_update();
        let Some(current) = current else {
            if snapshot.changed().await.is_err() {
                return;
            }
            continue;
        };

        if !current.is_playing {
            if send_progress(&tx, current.at(clock.now_ms())).await.is_break()
                || snapshot.changed().await.is_err()
            {
                return;
            }
            continue;
        }

        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if send_progress(&tx, current.at(clock.now_ms())).await.is_break() {
                        return;
                    }
                }
                changed = snapshot.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    break;
                }
            }
        }
    }
}

async fn send_progress(tx: &mpsc::Sender<Event>, progress_ms: u64) -> ControlFlow<()> {
    match tx
        .send(Event::Player(PlayerEvent::Progress { progress_ms }))
        .await
    {
        Ok(()) => ControlFlow::Continue(()),
        Err(_) => ControlFlow::Break(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::{self, CredentialStore, MemoryStore};
    use crate::auth::CredentialManager;
    use crate::config::SpotifyConfig;
    use crate::http::fake::{json, status, FakeTransport};
    use serde_json::json as j;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::time::Instant;

    /// Epoch-ms clock driven by tokio's (pausable) time.
    struct TokioClock {
        start: Instant,
        base_ms: i64,
    }

    impl Clock for TokioClock {
        fn now_ms(&self) -> i64 {
            self.base_ms + self.start.elapsed().as_millis() as i64
        }
    }

    fn tokio_clock() -> Arc<TokioClock> {
        Arc::new(TokioClock {
            start: Instant::now(),
            base_ms: 1_700_000_000_000,
        })
    }

    fn api(http: Arc<FakeTransport>) -> SpotifyClient {
        let mem = Arc::new(MemoryStore::new());
        mem.set(store::ACCESS_TOKEN, "token").unwrap();
        let auth = CredentialManager::new(
            SpotifyConfig::default(),
            mem,
            http.clone(),
            tokio_clock(),
        );
        SpotifyClient::new(auth, http, "https://api.test/v1")
    }

    fn player_json(playing: bool, progress_ms: u64) -> serde_json::Value {
        j!({
            "is_playing": playing,
            "progress_ms": progress_ms,
            "item": { "id": "A", "name": "A", "artists": [], "album": { "name": "x" }, "duration_ms": 300_000 }
        })
    }

    fn fake(playing: bool, progress_ms: u64) -> Arc<FakeTransport> {
        Arc::new(FakeTransport::new(move |req| {
            if req.url.ends_with("/queue") {
                Ok(json(200, j!({ "queue": [] })))
            } else {
                Ok(json(200, player_json(playing, progress_ms)))
            }
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_on_start_and_every_interval_until_dropped() {
        let http = fake(false, 0);
        let (tx, mut rx) = mpsc::channel(256);
        let handle = spawn(api(http.clone()), &PollConfig::default(), tokio_clock(), tx);
        let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(http.count("/queue"), 1);

        tokio::time::sleep(Duration::from_millis(6_000)).await;
        assert_eq!(http.count("/queue"), 3);

        drop(handle);
        tokio::time::sleep(Duration::from_millis(30_000)).await;
        assert_eq!(http.count("/queue"), 3);
        drain.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_is_interpolated_between_polls() {
        let http = fake(true, 10_000);
        let (tx, mut rx) = mpsc::channel(256);
        let _handle = spawn(api(http), &PollConfig::default(), tokio_clock(), tx);

        let started = Instant::now();
        let mut last = None;
        while started.elapsed() < Duration::from_millis(500) {
            if let Some(Event::Player(PlayerEvent::Progress { progress_ms })) = rx.recv().await {
                last = Some(progress_ms);
            }
        }
        let last = last.unwrap();
        assert!((10_400..=10_600).contains(&last), "progress {last}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_progress_is_pinned() {
        let http = fake(false, 42_000);
        let (tx, mut rx) = mpsc::channel(256);
        let _handle = spawn(api(http), &PollConfig::default(), tokio_clock(), tx);

        let mut progress = Vec::new();
        let deadline = Instant::now() + Duration::from_millis(7_000);
        while Instant::now() < deadline {
            tokio::select! {
                Some(ev) = rx.recv() => {
                    if let Event::Player(PlayerEvent::Progress { progress_ms }) = ev {
                        progress.push(progress_ms);
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {}
            }
        }
        // One report per poll, all equal to the server value.
        assert_eq!(progress, vec![42_000; 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_between_polls_freezes_ticking_progress() {
        let playing = Arc::new(AtomicBool::new(true));
        let flag = playing.clone();
        let http = Arc::new(FakeTransport::new(move |req| {
            if req.url.ends_with("/queue") {
                Ok(json(200, j!({ "queue": [] })))
            } else if flag.load(Ordering::SeqCst) {
                Ok(json(200, player_json(true, 10_000)))
            } else {
                Ok(json(200, player_json(false, 20_000)))
            }
        }));
        let (tx, mut rx) = mpsc::channel(256);
        let _handle = spawn(api(http), &PollConfig::default(), tokio_clock(), tx);

        let started = Instant::now();
        let flip_at = started + Duration::from_millis(2_950);
        let deadline = started + Duration::from_millis(5_900);
        let mut flipped = false;
        let mut seen: Vec<(Duration, u64)> = Vec::new();
        while Instant::now() < deadline {
            let wake = if flipped { deadline } else { flip_at };
            tokio::select! {
                Some(ev) = rx.recv() => {
                    if let Event::Player(PlayerEvent::Progress { progress_ms }) = ev {
                        seen.push((started.elapsed(), progress_ms));
                    }
                }
                _ = tokio::time::sleep_until(wake) => {
                    if !flipped {
                        playing.store(false, Ordering::SeqCst);
                        flipped = true;
                    }
                }
            }
        }

        let poll_at = Duration::from_millis(3_000);
        let ticking: Vec<u64> = seen.iter().filter(|(t, _)| *t < poll_at).map(|(_, p)| *p).collect();
        assert!(ticking.len() > 20, "ticks {}", ticking.len());
        assert!(ticking.windows(2).all(|w| w[0] < w[1]));
        assert!(seen.iter().all(|(t, _)| *t <= poll_at));
        assert_eq!(seen.last().map(|(_, p)| *p), Some(20_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_expiry_stops_polling() {
        let http = Arc::new(FakeTransport::new(|req| {
            if req.url.contains("accounts.spotify.com") {
                Ok(status(400))
            } else {
                Ok(status(401))
            }
        }));
        let (tx, mut rx) = mpsc::channel(256);
        let handle = spawn(api(http.clone()), &PollConfig::default(), tokio_clock(), tx);

        let mut ended = 0;
        let deadline = Instant::now() + Duration::from_millis(10_000);
        while Instant::now() < deadline {
            tokio::select! {
                Some(ev) = rx.recv() => {
                    if let Event::Network(NetworkEvent::SessionEnded(_)) = ev {
                        ended += 1;
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {}
            }
        }
        assert_eq!(ended, 1);
        assert!(handle.is_finished());
        // The 401 on /me/player logs out; the queue fetch then has no token to send.
        assert_eq!(http.requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_keep_polling() {
        let fail = Arc::new(AtomicBool::new(true));
        let flag = fail.clone();
        let http = Arc::new(FakeTransport::new(move |req| {
            if flag.load(Ordering::SeqCst) {
                Ok(status(502))
            } else if req.url.ends_with("/queue") {
                Ok(json(200, j!({ "queue": [] })))
            } else {
                Ok(json(200, player_json(false, 1)))
            }
        }));
        let (tx, mut rx) = mpsc::channel(256);
        let _handle = spawn(api(http), &PollConfig::default(), tokio_clock(), tx);

        tokio::time::sleep(Duration::from_millis(3_100)).await;
        assert!(rx.try_recv().is_err());

        fail.store(false, Ordering::SeqCst);
        let ev = tokio::time::timeout(Duration::from_millis(3_500), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(ev, Event::Network(NetworkEvent::PlayerState(Some(_)))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_soon_polls_after_settle_delay() {
        let http = fake(false, 0);
        let (tx, mut rx) = mpsc::channel(256);
        let handle = spawn(api(http.clone()), &PollConfig::default(), tokio_clock(), tx);
        let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(http.count("/queue"), 1);
        handle.refresh_soon();
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(http.count("/queue"), 2);
        drain.abort();
    }
}
