//! In-memory voice transport for tests.

#![allow(clippy::expect_used)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jukebox_core::AudioResource;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::voice::{
    AudioPlayer, ConnectionEvent, Listener, ListenerId, PlayerEvent, TransportError, VoiceChannel,
    VoiceConnection, VoiceGateway,
};

pub fn channel(room_id: u64) -> VoiceChannel {
    VoiceChannel {
        id: 7,
        room_id,
        name: "General".to_string(),
        joinable: true,
    }
}

struct Listeners<E> {
    next: AtomicU64,
    senders: Mutex<HashMap<ListenerId, mpsc::UnboundedSender<E>>>,
}

impl<E: Clone> Listeners<E> {
    fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            senders: Mutex::new(HashMap::new()),
        }
    }

    fn listen(&self) -> Listener<E> {
        let id = self.next.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.lock().insert(id, tx);
        Listener { id, events: rx }
    }

    fn unlisten(&self, id: ListenerId) {
        self.senders.lock().remove(&id);
    }

    fn emit(&self, event: &E) {
        for tx in self.senders.lock().values() {
            let _ = tx.send(event.clone());
        }
    }

    fn count(&self) -> usize {
        self.senders.lock().len()
    }
}

/// Gateway handing out fake connections and players, keeping every one of
/// them for inspection.
#[derive(Default)]
pub struct FakeGateway {
    connect_delay: Option<Duration>,
    connect_error: Option<String>,
    play_delay: Option<Duration>,
    play_error: Option<String>,
    connections: Mutex<Vec<Arc<FakeConnection>>>,
    players: Mutex<Vec<Arc<FakePlayer>>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn failing_connect(mut self, reason: &str) -> Self {
        self.connect_error = Some(reason.to_string());
        self
    }

    #[must_use]
    pub const fn with_play_delay(mut self, delay: Duration) -> Self {
        self.play_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn failing_play(mut self, reason: &str) -> Self {
        self.play_error = Some(reason.to_string());
        self
    }

    pub fn connections(&self) -> Vec<Arc<FakeConnection>> {
        self.connections.lock().clone()
    }

    pub fn player(&self) -> Arc<FakePlayer> {
        self.players
            .lock()
            .last()
            .cloned()
            .expect("no player was created")
    }

    /// Listeners still registered on any connection or player.
    pub fn live_listeners(&self) -> usize {
        let on_connections: usize = self.connections.lock().iter().map(|c| c.listeners.count()).sum();
        let on_players: usize = self.players.lock().iter().map(|p| p.listeners.count()).sum();
        on_connections + on_players
    }

    /// Connections that were established and never destroyed.
    pub fn open_connections(&self) -> usize {
        self.connections
            .lock()
            .iter()
            .filter(|c| !c.is_destroyed())
            .count()
    }
}

#[async_trait]
impl VoiceGateway for FakeGateway {
    async fn connect(&self, _channel: &VoiceChannel) -> Result<Arc<dyn VoiceConnection>, TransportError> {
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = &self.connect_error {
            return Err(TransportError(reason.clone()));
        }
        let connection = Arc::new(FakeConnection::new());
        self.connections.lock().push(connection.clone());
        Ok(connection)
    }

    fn create_player(&self) -> Arc<dyn AudioPlayer> {
        let player = Arc::new(FakePlayer::new(self.play_delay, self.play_error.clone()));
        self.players.lock().push(player.clone());
        player
    }
}

pub struct FakeConnection {
    listeners: Listeners<ConnectionEvent>,
    destroyed: AtomicBool,
    subscribed: AtomicBool,
}

impl FakeConnection {
    fn new() -> Self {
        Self {
            listeners: Listeners::new(),
            destroyed: AtomicBool::new(false),
            subscribed: AtomicBool::new(false),
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::SeqCst)
    }

    pub fn drop_connection(&self) {
        self.listeners.emit(&ConnectionEvent::Disconnected);
    }
}

impl VoiceConnection for FakeConnection {
    fn subscribe(&self, _player: &Arc<dyn AudioPlayer>) -> Result<(), TransportError> {
        self.subscribed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn listen(&self) -> Listener<ConnectionEvent> {
        self.listeners.listen()
    }

    fn unlisten(&self, id: ListenerId) {
        self.listeners.unlisten(id);
    }

    fn destroy(&self) -> Result<(), TransportError> {
        self.destroyed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakePlayer {
    listeners: Listeners<PlayerEvent>,
    play_delay: Option<Duration>,
    play_error: Option<String>,
    resource: Mutex<Option<Arc<AudioResource>>>,
    paused: AtomicBool,
    plays: AtomicUsize,
}

impl FakePlayer {
    fn new(play_delay: Option<Duration>, play_error: Option<String>) -> Self {
        Self {
            listeners: Listeners::new(),
            play_delay,
            play_error,
            resource: Mutex::new(None),
            paused: AtomicBool::new(false),
            plays: AtomicUsize::new(0),
        }
    }

    pub fn plays(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> Option<String> {
        self.resource.lock().as_ref().map(|r| r.source_url().to_string())
    }

    /// The current resource played to its end.
    pub fn finish(&self) {
        self.resource.lock().take();
        self.listeners.emit(&PlayerEvent::Idle);
    }

    pub fn auto_pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        self.listeners.emit(&PlayerEvent::Paused { automatic: true });
    }

    pub fn auto_unpause(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.listeners.emit(&PlayerEvent::Playing);
    }

    pub fn fail(&self, reason: &str) {
        self.listeners.emit(&PlayerEvent::Error(reason.to_string()));
    }
}

#[async_trait]
impl AudioPlayer for FakePlayer {
    async fn play(&self, resource: Arc<AudioResource>) -> Result<(), TransportError> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.play_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = &self.play_error {
            return Err(TransportError(reason.clone()));
        }
        *self.resource.lock() = Some(resource);
        self.paused.store(false, Ordering::SeqCst);
        self.listeners.emit(&PlayerEvent::Playing);
        Ok(())
    }

    fn pause(&self) -> bool {
        if self.resource.lock().is_none() || self.paused.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.listeners.emit(&PlayerEvent::Paused { automatic: false });
        true
    }

    fn unpause(&self) -> bool {
        if !self.paused.swap(false, Ordering::SeqCst) {
            return false;
        }
        self.listeners.emit(&PlayerEvent::Playing);
        true
    }

    fn stop(&self) {
        if self.resource.lock().take().is_some() {
            self.listeners.emit(&PlayerEvent::Idle);
        }
    }

    fn listen(&self) -> Listener<PlayerEvent> {
        self.listeners.listen()
    }

    fn unlisten(&self, id: ListenerId) {
        self.listeners.unlisten(id);
    }
}
