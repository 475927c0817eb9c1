//! Per-room playback state machine.
//!
//! A room is `Inactive` (no voice connection), `Idle` (connected, nothing
//! playing) or `Active`. Every status instance owns its own event listeners
//! and timers, which are released as soon as the room moves on. Events and
//! timer callbacks carry the epoch of the instance that registered them and
//! are ignored once the room has left it.
//!
//! Dequeuing and starting a track happens under the play lock. Commands that
//! find it held fail with [`PlaybackError::Busy`], player events that find it
//! held wait for it and are then checked against the current epoch, and adds
//! only enqueue.

mod status;
#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use jukebox_core::deadline::{self, Stage};
use jukebox_core::{Config, Queue, QueueFull, TimedOut, Track, TrackSnapshot};
use jukebox_resolver::{ItemFailure, PlaylistMeta, Resolution, ResolveError, Resolver, Search};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::PlaybackError;
use crate::voice::{
    ConnectionEvent, PlayerEvent, RoomId, TransportError, VoiceChannel, VoiceConnection,
    VoiceGateway,
};
use status::{Paused, Session, Status, Timer, Watch};
pub use status::{NowPlaying, PlaybackState, StatusSnapshot};

/// Delay before a timer that found a track being started looks again.
const TIMER_RETRY: Duration = Duration::from_secs(1);

type PlayGuard = OwnedMutexGuard<()>;
type Connecting = JoinHandle<Result<Arc<dyn VoiceConnection>, TransportError>>;
pub(crate) type DestroyHook = Box<dyn FnOnce(RoomId, Uuid) + Send>;

/// Result of an accepted `add` command.
#[derive(Debug, Clone, Serialize)]
pub struct AddOutcome {
    /// Tracks that made it into the queue, including one started right away.
    pub queued: Vec<TrackSnapshot>,
    pub errors: Vec<ItemFailure>,
    /// Collection details, sized to what was actually queued.
    pub playlist: Option<PlaylistMeta>,
    /// Resolved tracks left out because the queue filled up.
    pub dropped: usize,
    /// Set when this command started playback.
    pub now_playing: Option<TrackSnapshot>,
}

/// Handle to one room's playback. Clones share the same room.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    id: Uuid,
    room_id: RoomId,
    gateway: Arc<dyn VoiceGateway>,
    resolver: Arc<Resolver>,
    config: Config,
    state: Mutex<State>,
    /// Held while a track is dequeued and started.
    play_lock: Arc<AsyncMutex<()>>,
    /// Applies queue-mutating commands in arrival order.
    command_lock: AsyncMutex<()>,
    on_destroy: Mutex<Option<DestroyHook>>,
}

struct State {
    status: Status,
    queue: Queue,
    /// Bumped on every status change.
    epoch: u64,
    destroyed: bool,
}

enum Event {
    Player(PlayerEvent),
    Connection(ConnectionEvent),
}

impl Orchestrator {
    /// Create an inactive room. Must be called within a Tokio runtime.
    pub fn new(
        room_id: RoomId,
        gateway: Arc<dyn VoiceGateway>,
        resolver: Arc<Resolver>,
        config: Config,
    ) -> Self {
        let queue = Queue::new(config.max_queue_size);
        let inner = Arc::new(Inner {
            id: Uuid::new_v4(),
            room_id,
            gateway,
            resolver,
            config,
            state: Mutex::new(State {
                status: Status::Inactive { clear_timer: None },
                queue,
                epoch: 0,
                destroyed: false,
            }),
            play_lock: Arc::new(AsyncMutex::new(())),
            command_lock: AsyncMutex::new(()),
            on_destroy: Mutex::new(None),
        });
        inner.enter_inactive(&mut inner.state.lock());
        debug!(room = room_id, id = %inner.id, "Created player");
        Self { inner }
    }

    /// Identity of this instance, distinct from any later one for the same room.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn room_id(&self) -> RoomId {
        self.inner.room_id
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.state.lock().destroyed
    }

    pub(crate) fn set_destroy_hook(&self, hook: DestroyHook) {
        *self.inner.on_destroy.lock() = Some(hook);
    }

    /// Resolve `query` and queue the results, joining `channel` and starting
    /// playback when the room is not connected yet.
    pub async fn add(
        &self,
        channel: &VoiceChannel,
        query: &str,
        added_by: &str,
    ) -> Result<AddOutcome, PlaybackError> {
        let search = Search::classify(query)?;
        let query = query.trim();
        let inner = &self.inner;

        let _order = inner.command_lock.lock().await;
        inner.ensure_alive()?;

        let state = inner.state.lock().status.state();
        if state != PlaybackState::Inactive {
            return inner.enqueue(search, query, added_by, true).await;
        }
        if !channel.joinable {
            return Err(PlaybackError::ChannelNotJoinable(channel.id));
        }
        match inner.try_play_lock() {
            Some(guard) => {
                inner
                    .start_session(&guard, channel, search, query, added_by)
                    .await
            }
            None => {
                debug!(room = inner.room_id, "Playback is being started, queueing only");
                inner.enqueue(search, query, added_by, false).await
            }
        }
    }

    /// Stop the current track and start the next one. Returns the new track,
    /// or `None` when the queue ran out.
    pub async fn skip(&self) -> Result<Option<TrackSnapshot>, PlaybackError> {
        let inner = &self.inner;
        inner.ensure_alive()?;
        let guard = inner.try_play_lock().ok_or(PlaybackError::Busy)?;
        {
            let state = inner.state.lock();
            match &state.status {
                Status::Inactive { .. } => {
                    return Err(PlaybackError::InvalidState("Nothing is playing"));
                }
                Status::Active {
                    session, playing, ..
                } => {
                    info!(room = inner.room_id, track = %playing.info.title, "Skipping track");
                    session.player.stop();
                }
                Status::Idle { .. } if state.queue.is_empty() => {
                    return Err(PlaybackError::NothingToPlay { errors: Vec::new() });
                }
                Status::Idle { .. } => {}
            }
        }
        inner.play_next(&guard).await
    }

    /// Pause the current track, keeping its position.
    pub fn pause(&self) -> Result<TrackSnapshot, PlaybackError> {
        let inner = &self.inner;
        inner.ensure_alive()?;
        let _guard = inner.try_play_lock().ok_or(PlaybackError::Busy)?;

        let mut state = inner.state.lock();
        let Status::Active {
            session, playing, ..
        } = &state.status
        else {
            return Err(PlaybackError::InvalidState("Nothing is playing"));
        };
        if !session.player.pause() {
            return Err(TransportError("The player could not pause".to_string()).into());
        }
        let snapshot = playing.snapshot();
        inner.pause_locked(&mut state);
        info!(room = inner.room_id, track = %snapshot.info.title, "Paused");
        Ok(snapshot)
    }

    /// Continue the paused track, or start the queue when nothing is paused.
    pub async fn resume(&self) -> Result<TrackSnapshot, PlaybackError> {
        let inner = &self.inner;
        inner.ensure_alive()?;
        let guard = inner.try_play_lock().ok_or(PlaybackError::Busy)?;
        {
            let mut state = inner.state.lock();
            let player = match &state.status {
                Status::Inactive { .. } => {
                    return Err(PlaybackError::InvalidState("Not connected to a voice channel"));
                }
                Status::Active { .. } => return Err(PlaybackError::InvalidState("Already playing")),
                Status::Idle {
                    session,
                    last_played: Some(_),
                    ..
                } => Some(session.player.clone()),
                Status::Idle { .. } if state.queue.is_empty() => {
                    return Err(PlaybackError::NothingToPlay { errors: Vec::new() });
                }
                Status::Idle { .. } => None,
            };
            if let Some(player) = player {
                if !player.unpause() {
                    return Err(TransportError("The player could not resume".to_string()).into());
                }
                return inner
                    .resume_locked(&mut state)
                    .ok_or(PlaybackError::InvalidState("Nothing to resume"));
            }
        }
        inner
            .play_next(&guard)
            .await?
            .ok_or(PlaybackError::NothingToPlay { errors: Vec::new() })
    }

    /// Remove the queued track at zero-based `index`.
    pub async fn remove(&self, index: usize) -> Result<TrackSnapshot, PlaybackError> {
        let _order = self.inner.command_lock.lock().await;
        self.inner.ensure_alive()?;
        let removed = self.inner.state.lock().queue.remove(index);
        removed
            .map(|track| track.snapshot())
            .ok_or(PlaybackError::NotFound(index))
    }

    /// Shuffle the queue, returning its length.
    pub async fn shuffle(&self) -> Result<usize, PlaybackError> {
        let _order = self.inner.command_lock.lock().await;
        self.inner.ensure_alive()?;
        let mut state = self.inner.state.lock();
        state.queue.shuffle();
        Ok(state.queue.len())
    }

    /// Empty the queue, returning how many tracks were removed.
    pub async fn clear(&self) -> Result<usize, PlaybackError> {
        let _order = self.inner.command_lock.lock().await;
        self.inner.ensure_alive()?;
        Ok(self.inner.state.lock().queue.clear())
    }

    pub fn queue(&self) -> Vec<TrackSnapshot> {
        self.inner.state.lock().queue.snapshot()
    }

    pub fn status(&self) -> StatusSnapshot {
        let state = self.inner.state.lock();
        StatusSnapshot {
            room_id: self.inner.room_id,
            state: state.status.state(),
            channel: state.status.session().map(|s| s.channel.clone()),
            now_playing: state.status.now_playing(),
            queue_len: state.queue.len(),
            queue_duration_secs: state.queue.total_duration().as_seconds(),
        }
    }

    /// Leave the voice channel, drop the queue and unregister the room.
    /// Calling it again has no effect.
    pub fn destroy(&self) {
        self.inner.destroy();
    }
}

impl Inner {
    fn ensure_alive(&self) -> Result<(), PlaybackError> {
        if self.state.lock().destroyed {
            Err(PlaybackError::Destroyed)
        } else {
            Ok(())
        }
    }

    fn try_play_lock(&self) -> Option<PlayGuard> {
        self.play_lock.clone().try_lock_owned().ok()
    }

    fn budget(&self) -> Result<usize, PlaybackError> {
        let state = self.state.lock();
        match self.config.resolve_budget(state.queue.len()) {
            0 => Err(QueueFull {
                max_size: state.queue.max_size(),
            }
            .into()),
            budget => Ok(budget),
        }
    }

    // Status transitions. The caller holds the state lock and has already
    // taken the previous status out.

    fn take_status(state: &mut State) -> Status {
        std::mem::replace(&mut state.status, Status::Inactive { clear_timer: None })
    }

    fn enter_inactive(self: &Arc<Self>, state: &mut State) {
        state.epoch += 1;
        let clear_timer =
            self.start_timer(self.config.timeouts.clear_queue(), state.epoch, Self::on_clear_timer);
        state.status = Status::Inactive { clear_timer };
    }

    fn enter_idle(self: &Arc<Self>, state: &mut State, session: Session, last_played: Option<Paused>) {
        state.epoch += 1;
        let watch = self.watch(&session, state.epoch);
        let leave_timer =
            self.start_timer(self.config.timeouts.leave_voice(), state.epoch, Self::on_leave_timer);
        state.status = Status::Idle {
            session,
            watch,
            leave_timer,
            last_played,
        };
    }

    fn enter_active(
        self: &Arc<Self>,
        state: &mut State,
        session: Session,
        playing: Track,
        playing_since: Instant,
    ) {
        state.epoch += 1;
        let watch = self.watch(&session, state.epoch);
        state.status = Status::Active {
            session,
            watch,
            playing,
            playing_since,
        };
    }

    /// Drop the session and go back to `Inactive`.
    fn force_inactive(self: &Arc<Self>, state: &mut State, reason: &str) {
        let old = Self::take_status(state);
        let session = old.session().cloned();
        drop(old);
        if let Some(session) = session {
            session.close(self.room_id);
        }
        warn!(room = self.room_id, reason, "Left voice channel");
        self.enter_inactive(state);
    }

    /// Move a connected room to `Idle` with nothing paused.
    fn settle_idle(self: &Arc<Self>, state: &mut State) {
        match Self::take_status(state) {
            Status::Active { session, watch, .. } | Status::Idle { session, watch, .. } => {
                drop(watch);
                self.enter_idle(state, session, None);
            }
            inactive @ Status::Inactive { .. } => state.status = inactive,
        }
    }

    fn pause_locked(self: &Arc<Self>, state: &mut State) {
        match Self::take_status(state) {
            Status::Active {
                session,
                watch,
                playing,
                playing_since,
            } => {
                drop(watch);
                let paused = Paused {
                    track: playing,
                    played: playing_since.elapsed(),
                };
                self.enter_idle(state, session, Some(paused));
            }
            other => state.status = other,
        }
    }

    /// Continue the paused track with its clock moved back by the time it
    /// had already played.
    fn resume_locked(self: &Arc<Self>, state: &mut State) -> Option<TrackSnapshot> {
        match Self::take_status(state) {
            Status::Idle {
                session,
                watch,
                leave_timer,
                last_played: Some(paused),
            } => {
                drop((watch, leave_timer));
                let now = Instant::now();
                let since = now.checked_sub(paused.played).unwrap_or(now);
                let snapshot = paused.track.snapshot();
                self.enter_active(state, session, paused.track, since);
                info!(room = self.room_id, track = %snapshot.info.title, "Resumed");
                Some(snapshot)
            }
            other => {
                state.status = other;
                None
            }
        }
    }

    // Listeners and timers

    fn watch(self: &Arc<Self>, session: &Session, epoch: u64) -> Watch {
        let connection_events = session.connection.listen();
        let player_events = session.player.listen();
        let (connection_listener, mut connection_rx) = (connection_events.id, connection_events.events);
        let (player_listener, mut player_rx) = (player_events.id, player_events.events);

        let weak = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    Some(event) = player_rx.recv() => Event::Player(event),
                    Some(event) = connection_rx.recv() => Event::Connection(event),
                    else => break,
                };
                let Some(inner) = weak.upgrade() else { break };
                inner.handle_event(epoch, event);
            }
        });

        Watch {
            connection: session.connection.clone(),
            player: session.player.clone(),
            connection_listener,
            player_listener,
            task,
        }
    }

    fn start_timer(
        self: &Arc<Self>,
        limit: Option<Duration>,
        epoch: u64,
        fire: fn(&Arc<Self>, u64),
    ) -> Option<Timer> {
        let limit = limit?;
        let weak = Arc::downgrade(self);
        Some(Timer(tokio::spawn(async move {
            tokio::time::sleep(limit).await;
            if let Some(inner) = weak.upgrade() {
                fire(&inner, epoch);
            }
        })))
    }

    fn on_leave_timer(self: &Arc<Self>, epoch: u64) {
        let guard = self.try_play_lock();
        let mut state = self.state.lock();
        if state.destroyed || state.epoch != epoch {
            return;
        }
        let Status::Idle { leave_timer, .. } = &mut state.status else {
            return;
        };
        if guard.is_none() {
            *leave_timer = self.start_timer(Some(TIMER_RETRY), epoch, Self::on_leave_timer);
            return;
        }
        info!(room = self.room_id, "Leaving voice channel after inactivity");
        let old = Self::take_status(&mut state);
        let session = old.session().cloned();
        drop(old);
        if let Some(session) = session {
            session.close(self.room_id);
        }
        self.enter_inactive(&mut state);
    }

    fn on_clear_timer(self: &Arc<Self>, epoch: u64) {
        let guard = self.try_play_lock();
        {
            let mut state = self.state.lock();
            if state.destroyed || state.epoch != epoch {
                return;
            }
            let Status::Inactive { clear_timer } = &mut state.status else {
                return;
            };
            if guard.is_none() {
                *clear_timer = self.start_timer(Some(TIMER_RETRY), epoch, Self::on_clear_timer);
                return;
            }
        }
        info!(room = self.room_id, "Dropping inactive room");
        self.destroy();
    }

    fn handle_event(self: &Arc<Self>, epoch: u64, event: Event) {
        let mut state = self.state.lock();
        if state.destroyed || state.epoch != epoch {
            return;
        }
        match event {
            Event::Player(PlayerEvent::Error(reason))
            | Event::Connection(ConnectionEvent::Error(reason)) => {
                error!(room = self.room_id, %reason, "Voice transport error");
                self.force_inactive(&mut state, "transport error");
            }
            Event::Connection(ConnectionEvent::Disconnected) => {
                self.force_inactive(&mut state, "disconnected");
            }
            Event::Player(event) => match self.try_play_lock() {
                Some(guard) => self.handle_player_event(&mut state, guard, epoch, event),
                None => {
                    debug!(room = self.room_id, ?event, "Deferring player event until the play lock is free");
                    self.defer_player_event(epoch, event);
                }
            },
        }
    }

    /// Handle `event` once the current holder releases the play lock, unless
    /// the room has left the status it was raised in by then.
    fn defer_player_event(self: &Arc<Self>, epoch: u64, event: PlayerEvent) {
        let play_lock = self.play_lock.clone();
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let guard = play_lock.lock_owned().await;
            let Some(inner) = weak.upgrade() else { return };
            let mut state = inner.state.lock();
            if state.destroyed || state.epoch != epoch {
                debug!(room = inner.room_id, ?event, "Dropping stale player event");
                return;
            }
            inner.handle_player_event(&mut state, guard, epoch, event);
        });
    }

    fn handle_player_event(
        self: &Arc<Self>,
        state: &mut State,
        guard: PlayGuard,
        epoch: u64,
        event: PlayerEvent,
    ) {
        match event {
            PlayerEvent::Idle => {
                if let Status::Active { playing, .. } = &state.status {
                    debug!(room = self.room_id, track = %playing.info.title, "Track finished");
                    let inner = self.clone();
                    tokio::spawn(async move { inner.advance(guard, epoch).await });
                }
            }
            PlayerEvent::Paused { automatic } => {
                if matches!(state.status, Status::Active { .. }) {
                    info!(room = self.room_id, automatic, "Player paused");
                    self.pause_locked(state);
                }
            }
            PlayerEvent::Playing => {
                if matches!(
                    state.status,
                    Status::Idle {
                        last_played: Some(_),
                        ..
                    }
                ) {
                    self.resume_locked(state);
                }
            }
            PlayerEvent::Error(_) => {}
        }
    }

    async fn advance(self: Arc<Self>, guard: PlayGuard, epoch: u64) {
        {
            let state = self.state.lock();
            if state.destroyed || state.epoch != epoch {
                return;
            }
        }
        if let Err(e) = self.play_next(&guard).await {
            warn!(room = self.room_id, error = %e, "Could not start the next track");
        }
    }

    // Starting tracks

    /// Prepare `track` and hand it to the session's player.
    async fn start(&self, session: &Session, track: &mut Track) -> Result<(), PlaybackError> {
        let resource = track.prepare().await.map_err(PlaybackError::prepare)?;
        track.consume();
        deadline::guard(Stage::Play, self.config.timeouts.play(), session.player.play(resource))
            .await??;
        Ok(())
    }

    /// Dequeue and start the next track on the current session. Settles in
    /// `Idle` when the queue is empty or the track cannot be started.
    async fn play_next(self: &Arc<Self>, _guard: &PlayGuard) -> Result<Option<TrackSnapshot>, PlaybackError> {
        let (epoch, session, mut track) = {
            let mut state = self.state.lock();
            let Some(session) = state.status.session().cloned() else {
                return Err(PlaybackError::InvalidState("Not connected to a voice channel"));
            };
            let Some(track) = state.queue.pop_front() else {
                info!(room = self.room_id, "Queue finished");
                self.settle_idle(&mut state);
                return Ok(None);
            };
            (state.epoch, session, track)
        };

        let started = self.start(&session, &mut track).await;

        let mut state = self.state.lock();
        if state.destroyed {
            return Err(PlaybackError::Destroyed);
        }
        if state.epoch != epoch {
            session.player.stop();
            return Err(TransportError("Voice connection lost".to_string()).into());
        }
        match started {
            Ok(()) => {
                let snapshot = track.snapshot();
                info!(room = self.room_id, track = %track.info.title, "Now playing");
                drop(Self::take_status(&mut state));
                self.enter_active(&mut state, session, track, Instant::now());
                Ok(Some(snapshot))
            }
            Err(e @ PlaybackError::Transport(_)) => {
                self.force_inactive(&mut state, "player failed");
                Err(e)
            }
            Err(e) => {
                warn!(room = self.room_id, track = %track.info.title, error = %e, "Could not start track");
                session.player.stop();
                self.settle_idle(&mut state);
                Err(e)
            }
        }
    }

    // Adding

    /// Resolve and queue without connecting. Starts the queue when the room
    /// is idle with nothing paused and `may_start` is set.
    async fn enqueue(
        self: &Arc<Self>,
        search: Search,
        query: &str,
        added_by: &str,
        may_start: bool,
    ) -> Result<AddOutcome, PlaybackError> {
        let budget = self.budget()?;
        let resolution = self.resolver.resolve(&search, query, budget, added_by).await?;
        let mut outcome = self.accept(resolution)?;

        if may_start {
            if let Some(guard) = self.try_play_lock() {
                let startable = matches!(
                    self.state.lock().status,
                    Status::Idle {
                        last_played: None,
                        ..
                    }
                );
                if startable {
                    outcome.now_playing = self.play_next(&guard).await?;
                }
            }
        }
        Ok(outcome)
    }

    /// Put resolved tracks at the back of the queue.
    fn accept(&self, resolution: Resolution) -> Result<AddOutcome, PlaybackError> {
        let Resolution {
            items,
            errors,
            mut playlist,
        } = resolution;
        if items.is_empty() {
            return Err(PlaybackError::NothingToPlay { errors });
        }

        let mut state = self.state.lock();
        if state.destroyed {
            return Err(PlaybackError::Destroyed);
        }
        let mut queued: Vec<TrackSnapshot> = items.iter().map(Track::snapshot).collect();
        let rejected = state.queue.insert_all(None, items);
        queued.truncate(queued.len().saturating_sub(rejected.len()));
        if queued.is_empty() {
            return Err(QueueFull {
                max_size: state.queue.max_size(),
            }
            .into());
        }
        if let Some(playlist) = &mut playlist {
            playlist.size = queued.len();
        }
        debug!(
            room = self.room_id,
            queued = queued.len(),
            dropped = rejected.len(),
            "Queued tracks"
        );
        Ok(AddOutcome {
            queued,
            errors,
            playlist,
            dropped: rejected.len(),
            now_playing: None,
        })
    }

    /// Join `channel`, queue the resolved tracks and start the queue head.
    /// On failure everything acquired is released and the tracks this call
    /// queued are removed again.
    async fn start_session(
        self: &Arc<Self>,
        _guard: &PlayGuard,
        channel: &VoiceChannel,
        search: Search,
        query: &str,
        added_by: &str,
    ) -> Result<AddOutcome, PlaybackError> {
        let budget = self.budget()?;
        let (connection, resolution) = self
            .connect_and_resolve(channel, search, query, budget, added_by)
            .await?;

        let session = Session {
            channel: channel.clone(),
            connection,
            player: self.gateway.create_player(),
        };
        if let Err(e) = session.connection.subscribe(&session.player) {
            session.close(self.room_id);
            return Err(e.into());
        }
        let mut outcome = match self.accept(resolution) {
            Ok(outcome) => outcome,
            Err(e) => {
                session.close(self.room_id);
                return Err(e);
            }
        };
        let own: Vec<Uuid> = outcome.queued.iter().map(|t| t.uid).collect();

        let popped = {
            let mut state = self.state.lock();
            let epoch = state.epoch;
            state.queue.pop_front().map(|track| (epoch, track))
        };
        let Some((epoch, mut head)) = popped else {
            session.close(self.room_id);
            return Err(PlaybackError::InvalidState("The queue was emptied"));
        };

        let started = self.start(&session, &mut head).await;

        let mut state = self.state.lock();
        let failure = match started {
            _ if state.destroyed => Some(PlaybackError::Destroyed),
            Ok(()) if state.epoch == epoch => None,
            Ok(()) => Some(PlaybackError::InvalidState("Playback was interrupted")),
            Err(e) => Some(e),
        };
        if let Some(e) = failure {
            session.close(self.room_id);
            if !state.destroyed {
                if !own.contains(&head.uid()) {
                    state.queue.restore_front(head);
                }
                state.queue.remove_uids(&own);
                self.enter_inactive(&mut state);
            }
            warn!(room = self.room_id, channel = channel.id, error = %e, "Could not start playback");
            return Err(e);
        }

        info!(
            room = self.room_id,
            channel = channel.id,
            track = %head.info.title,
            "Joined voice channel, now playing"
        );
        outcome.now_playing = Some(head.snapshot());
        drop(Self::take_status(&mut state));
        self.enter_active(&mut state, session, head, Instant::now());
        Ok(outcome)
    }

    /// Connect and resolve at the same time. If either fails, whatever the
    /// other produced, now or later, is released.
    async fn connect_and_resolve(
        &self,
        channel: &VoiceChannel,
        search: Search,
        query: &str,
        budget: usize,
        added_by: &str,
    ) -> Result<(Arc<dyn VoiceConnection>, Resolution), PlaybackError> {
        let mut connecting: Connecting = tokio::spawn({
            let gateway = self.gateway.clone();
            let channel = channel.clone();
            async move { gateway.connect(&channel).await }
        });
        let mut resolving = tokio::spawn({
            let resolver = self.resolver.clone();
            let (query, added_by) = (query.to_string(), added_by.to_string());
            async move { resolver.resolve(&search, &query, budget, &added_by).await }
        });

        let connect_limit = self.config.timeouts.connect();
        let connect_deadline = async move {
            match connect_limit {
                Some(limit) => {
                    tokio::time::sleep(limit).await;
                    TimedOut {
                        stage: Stage::Connect,
                        limit,
                    }
                }
                None => std::future::pending().await,
            }
        };
        tokio::pin!(connect_deadline);

        let mut connection: Option<Arc<dyn VoiceConnection>> = None;
        let mut resolution: Option<Resolution> = None;
        let mut connect_settled = false;
        let mut resolve_settled = false;

        let failure: PlaybackError = loop {
            match (connection.take(), resolution.take()) {
                (Some(connection), Some(resolution)) => return Ok((connection, resolution)),
                (c, r) => {
                    connection = c;
                    resolution = r;
                }
            }

            tokio::select! {
                joined = &mut connecting, if !connect_settled => {
                    connect_settled = true;
                    match joined {
                        Ok(Ok(c)) => connection = Some(c),
                        Ok(Err(e)) => break PlaybackError::Transport(e),
                        Err(join) => break TransportError(join.to_string()).into(),
                    }
                }
                joined = &mut resolving, if !resolve_settled => {
                    resolve_settled = true;
                    match joined {
                        Ok(Ok(r)) => resolution = Some(r),
                        Ok(Err(e)) => break e.into(),
                        Err(join) => {
                            break PlaybackError::Resolve(ResolveError::Fatal(
                                jukebox_core::Error::Internal(join.to_string()),
                            ));
                        }
                    }
                }
                timed_out = &mut connect_deadline, if !connect_settled => break timed_out.into(),
            }
        };

        match connection {
            Some(connection) => release_connection(self.room_id, connection.as_ref()),
            None if !connect_settled => abandon_connection(self.room_id, connecting),
            None => {}
        }
        if !resolve_settled {
            debug!(room = self.room_id, "Abandoning resolution");
        }
        Err(failure)
    }

    fn destroy(&self) {
        {
            let mut state = self.state.lock();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            state.epoch += 1;
            let old = Self::take_status(&mut state);
            let session = old.session().cloned();
            drop(old);
            if let Some(session) = session {
                session.close(self.room_id);
            }
            let cleared = state.queue.clear();
            info!(room = self.room_id, id = %self.id, cleared, "Player destroyed");
        }
        let hook = self.on_destroy.lock().take();
        if let Some(hook) = hook {
            hook(self.room_id, self.id);
        }
    }
}

fn release_connection(room_id: RoomId, connection: &dyn VoiceConnection) {
    if let Err(e) = connection.destroy() {
        warn!(room = room_id, error = %e, "Failed to release voice connection");
    }
}

/// Destroy a connection that is still being established once it arrives.
fn abandon_connection(room_id: RoomId, connecting: Connecting) {
    tokio::spawn(async move {
        if let Ok(Ok(connection)) = connecting.await {
            debug!(room = room_id, "Releasing late voice connection");
            release_connection(room_id, connection.as_ref());
        }
    });
}
