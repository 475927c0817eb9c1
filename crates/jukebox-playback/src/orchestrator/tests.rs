#![allow(clippy::unwrap_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use jukebox_core::{Config, Stage, TimedOut};
use jukebox_resolver::testing::{video, watch_url, FakeSource, FakeVideos};
use jukebox_resolver::Resolver;

use super::*;
use crate::testing::{channel, FakeGateway};

const ROOM: RoomId = 42;
const PLAYLIST: &str = "https://www.youtube.com/playlist?list=PL1";

struct Harness {
    gateway: Arc<FakeGateway>,
    orchestrator: Orchestrator,
}

fn library() -> FakeVideos {
    FakeVideos::new()
        .with_video(video("a1", "Song A"))
        .with_video(video("b2", "Song B"))
        .with_video(video("c3", "Song C"))
        .with_playlist(
            "PL1",
            "Mix",
            vec![
                video("p1", "One"),
                video("p2", "Two"),
                video("p3", "Three"),
                video("p4", "Four"),
                video("p5", "Five"),
            ],
        )
}

fn harness_with(gateway: FakeGateway, videos: FakeVideos, source: FakeSource, config: Config) -> Harness {
    let gateway = Arc::new(gateway);
    let resolver = Arc::new(Resolver::new(Arc::new(videos), Arc::new(source), &config));
    let orchestrator = Orchestrator::new(ROOM, gateway.clone(), resolver, config);
    Harness {
        gateway,
        orchestrator,
    }
}

fn harness() -> Harness {
    harness_with(FakeGateway::new(), library(), FakeSource::new(), Config::default())
}

impl Harness {
    async fn add(&self, query: &str) -> Result<AddOutcome, PlaybackError> {
        self.orchestrator.add(&channel(ROOM), query, "alice").await
    }

    fn state(&self) -> PlaybackState {
        self.orchestrator.status().state
    }

    fn titles(&self) -> Vec<String> {
        self.orchestrator
            .queue()
            .into_iter()
            .map(|t| t.info.title)
            .collect()
    }

    fn now_playing(&self) -> Option<NowPlaying> {
        self.orchestrator.status().now_playing
    }
}

/// Let spawned tasks handle pending events.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn test_first_add_connects_and_plays() {
    let h = harness();
    let outcome = h.add(&watch_url("a1")).await.unwrap();

    assert_eq!(outcome.now_playing.unwrap().info.title, "Song A");
    assert_eq!(outcome.queued.len(), 1);
    let status = h.orchestrator.status();
    assert_eq!(status.state, PlaybackState::Active);
    assert_eq!(status.queue_len, 0);
    assert_eq!(status.channel.unwrap().id, 7);

    let connections = h.gateway.connections();
    assert_eq!(connections.len(), 1);
    assert!(connections[0].is_subscribed());
    assert_eq!(h.gateway.player().current(), Some(watch_url("a1")));
    assert_eq!(h.gateway.live_listeners(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_add_while_active_only_enqueues() {
    let h = harness();
    h.add(&watch_url("a1")).await.unwrap();
    let outcome = h.add(&watch_url("b2")).await.unwrap();

    assert!(outcome.now_playing.is_none());
    assert_eq!(h.titles(), vec!["Song B"]);
    assert_eq!(h.gateway.connections().len(), 1);
    assert_eq!(h.gateway.player().plays(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_track_end_starts_next() {
    let h = harness();
    h.add(&watch_url("a1")).await.unwrap();
    h.add(&watch_url("b2")).await.unwrap();

    h.gateway.player().finish();
    settle().await;

    assert_eq!(h.now_playing().unwrap().track.info.title, "Song B");
    assert!(h.titles().is_empty());
    assert_eq!(h.gateway.player().plays(), 2);
    assert_eq!(h.gateway.live_listeners(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_queue_idles_then_leaves() {
    let h = harness();
    h.add(&watch_url("a1")).await.unwrap();

    h.gateway.player().finish();
    settle().await;
    assert_eq!(h.state(), PlaybackState::Idle);
    assert!(h.now_playing().is_none());
    assert_eq!(h.gateway.live_listeners(), 2);
    assert_eq!(h.gateway.open_connections(), 1);

    tokio::time::sleep(Duration::from_secs(300)).await;
    settle().await;
    assert_eq!(h.state(), PlaybackState::Inactive);
    assert_eq!(h.gateway.open_connections(), 0);
    assert_eq!(h.gateway.live_listeners(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_pause_and_resume_keep_position() {
    let h = harness();
    h.add(&watch_url("a1")).await.unwrap();

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.orchestrator.pause().unwrap().info.title, "Song A");
    assert!(h.gateway.player().is_paused());
    let paused = h.now_playing().unwrap();
    assert!(paused.paused);
    assert_eq!(paused.elapsed_secs, 30);
    assert_eq!(h.state(), PlaybackState::Idle);

    tokio::time::sleep(Duration::from_secs(100)).await;
    assert_eq!(h.orchestrator.resume().await.unwrap().info.title, "Song A");
    assert_eq!(h.state(), PlaybackState::Active);
    assert_eq!(h.now_playing().unwrap().elapsed_secs, 30);

    tokio::time::sleep(Duration::from_secs(10)).await;
    let playing = h.now_playing().unwrap();
    assert!(!playing.paused);
    assert_eq!(playing.elapsed_secs, 40);
    assert_eq!(playing.remaining_secs, Some(140));
    assert_eq!(h.gateway.live_listeners(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_pause_keeps_connection_until_leave_timer() {
    let h = harness();
    h.add(&watch_url("a1")).await.unwrap();
    h.orchestrator.pause().unwrap();

    tokio::time::sleep(Duration::from_secs(299)).await;
    assert_eq!(h.state(), PlaybackState::Idle);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.state(), PlaybackState::Inactive);
    assert_eq!(h.gateway.open_connections(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_skip_plays_next_then_idles() {
    let h = harness();
    h.add(&watch_url("a1")).await.unwrap();
    h.add(&watch_url("b2")).await.unwrap();

    let next = h.orchestrator.skip().await.unwrap();
    assert_eq!(next.unwrap().info.title, "Song B");
    assert_eq!(h.gateway.player().current(), Some(watch_url("b2")));

    assert!(h.orchestrator.skip().await.unwrap().is_none());
    assert_eq!(h.state(), PlaybackState::Idle);
    assert_eq!(h.gateway.player().plays(), 2);
    assert_eq!(h.gateway.live_listeners(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_commands_need_a_session() {
    let h = harness();
    assert!(matches!(
        h.orchestrator.skip().await,
        Err(PlaybackError::InvalidState(_))
    ));
    assert!(matches!(h.orchestrator.pause(), Err(PlaybackError::InvalidState(_))));
    assert!(matches!(
        h.orchestrator.resume().await,
        Err(PlaybackError::InvalidState(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_classification_fails_before_anything_starts() {
    let h = harness();
    assert!(matches!(
        h.add("ab").await,
        Err(PlaybackError::Classify(jukebox_resolver::ClassifyError::TooShort))
    ));
    assert!(h.gateway.connections().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unjoinable_channel_is_rejected() {
    let h = harness();
    let mut locked = channel(ROOM);
    locked.joinable = false;
    let err = h
        .orchestrator
        .add(&locked, &watch_url("a1"), "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, PlaybackError::ChannelNotJoinable(7)));
    assert!(h.gateway.connections().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_connect_failure_releases_everything() {
    let h = harness_with(
        FakeGateway::new().failing_connect("no route"),
        library(),
        FakeSource::new(),
        Config::default(),
    );
    let err = h.add(&watch_url("a1")).await.unwrap_err();

    assert!(matches!(err, PlaybackError::Transport(_)));
    assert_eq!(h.state(), PlaybackState::Inactive);
    assert!(h.titles().is_empty());
    assert_eq!(h.gateway.live_listeners(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_connect_timeout_releases_late_connection() {
    let h = harness_with(
        FakeGateway::new().with_connect_delay(Duration::from_secs(60)),
        library(),
        FakeSource::new(),
        Config::default(),
    );
    let err = h.add(&watch_url("a1")).await.unwrap_err();
    assert!(matches!(
        err,
        PlaybackError::Timeout(TimedOut {
            stage: Stage::Connect,
            ..
        })
    ));
    assert!(h.titles().is_empty());
    assert!(h.gateway.connections().is_empty());

    tokio::time::sleep(Duration::from_secs(60)).await;
    settle().await;
    let connections = h.gateway.connections();
    assert_eq!(connections.len(), 1);
    assert!(connections[0].is_destroyed());
}

#[tokio::test(start_paused = true)]
async fn test_unresolvable_query_releases_connection() {
    let h = harness();
    let err = h.add(&watch_url("missing")).await.unwrap_err();

    let PlaybackError::NothingToPlay { errors } = err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(errors.len(), 1);
    settle().await;
    assert_eq!(h.gateway.open_connections(), 0);
    assert_eq!(h.state(), PlaybackState::Inactive);
}

#[tokio::test(start_paused = true)]
async fn test_prepare_failure_removes_queued_tracks() {
    let h = harness_with(
        FakeGateway::new(),
        library(),
        FakeSource::new().failing(),
        Config::default(),
    );
    let err = h.add(PLAYLIST).await.unwrap_err();

    assert!(matches!(err, PlaybackError::Prepare(_)));
    assert!(h.titles().is_empty());
    assert_eq!(h.gateway.open_connections(), 0);
    assert_eq!(h.gateway.live_listeners(), 0);
    assert_eq!(h.state(), PlaybackState::Inactive);
}

#[tokio::test(start_paused = true)]
async fn test_play_timeout_removes_queued_tracks() {
    let h = harness_with(
        FakeGateway::new().with_play_delay(Duration::from_secs(60)),
        library(),
        FakeSource::new(),
        Config::default(),
    );
    let err = h.add(PLAYLIST).await.unwrap_err();

    assert!(matches!(
        err,
        PlaybackError::Timeout(TimedOut {
            stage: Stage::Play,
            ..
        })
    ));
    assert!(h.titles().is_empty());
    assert_eq!(h.gateway.open_connections(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_transport_error_forces_inactive_then_clears() {
    let h = harness();
    h.add(&watch_url("a1")).await.unwrap();
    h.add(&watch_url("b2")).await.unwrap();

    h.gateway.player().fail("encoder crashed");
    settle().await;
    assert_eq!(h.state(), PlaybackState::Inactive);
    assert_eq!(h.gateway.open_connections(), 0);
    assert_eq!(h.gateway.live_listeners(), 0);
    assert_eq!(h.titles(), vec!["Song B"]);

    tokio::time::sleep(Duration::from_secs(900)).await;
    settle().await;
    assert!(h.orchestrator.is_destroyed());
    assert!(h.titles().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_forces_inactive() {
    let h = harness();
    h.add(&watch_url("a1")).await.unwrap();

    h.gateway.connections()[0].drop_connection();
    settle().await;
    assert_eq!(h.state(), PlaybackState::Inactive);
    assert_eq!(h.gateway.live_listeners(), 0);

    let outcome = h.add(&watch_url("b2")).await.unwrap();
    assert_eq!(outcome.now_playing.unwrap().info.title, "Song B");
    assert_eq!(h.gateway.connections().len(), 2);
    assert_eq!(h.gateway.live_listeners(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_destroy_is_idempotent_and_final() {
    let h = harness();
    h.add(&watch_url("a1")).await.unwrap();
    h.add(&watch_url("b2")).await.unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    h.orchestrator.set_destroy_hook(Box::new(move |room, _| {
        assert_eq!(room, ROOM);
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    h.orchestrator.destroy();
    h.orchestrator.destroy();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(h.orchestrator.is_destroyed());
    assert!(h.titles().is_empty());
    assert_eq!(h.gateway.open_connections(), 0);
    assert_eq!(h.gateway.live_listeners(), 0);
    assert!(matches!(h.add(&watch_url("c3")).await, Err(PlaybackError::Destroyed)));
    assert!(matches!(h.orchestrator.skip().await, Err(PlaybackError::Destroyed)));
}

#[tokio::test(start_paused = true)]
async fn test_destroy_while_paused_releases_everything() {
    let h = harness();
    h.add(&watch_url("a1")).await.unwrap();
    h.orchestrator.pause().unwrap();
    assert_eq!(h.state(), PlaybackState::Idle);

    h.orchestrator.destroy();
    settle().await;
    assert_eq!(h.gateway.live_listeners(), 0);
    assert_eq!(h.gateway.open_connections(), 0);

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(h.state(), PlaybackState::Inactive);
    assert_eq!(h.gateway.connections().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_destroy_during_start_releases_session() {
    let h = harness_with(
        FakeGateway::new().with_play_delay(Duration::from_secs(5)),
        library(),
        FakeSource::new(),
        Config::default(),
    );
    let orchestrator = h.orchestrator.clone();
    let starting = tokio::spawn(async move {
        orchestrator
            .add(&channel(ROOM), &watch_url("a1"), "alice")
            .await
    });
    settle().await;
    assert_eq!(h.gateway.open_connections(), 1);

    h.orchestrator.destroy();
    assert!(matches!(
        starting.await.unwrap(),
        Err(PlaybackError::Destroyed)
    ));
    assert_eq!(h.gateway.live_listeners(), 0);
    assert_eq!(h.gateway.open_connections(), 0);
    assert!(h.titles().is_empty());
    assert_eq!(h.state(), PlaybackState::Inactive);
}

#[tokio::test(start_paused = true)]
async fn test_play_lock_rejects_concurrent_start() {
    let h = harness_with(
        FakeGateway::new().with_play_delay(Duration::from_secs(5)),
        library(),
        FakeSource::new(),
        Config::default(),
    );
    let orchestrator = h.orchestrator.clone();
    let starting = tokio::spawn(async move {
        orchestrator
            .add(&channel(ROOM), &watch_url("a1"), "alice")
            .await
    });
    settle().await;

    assert!(matches!(h.orchestrator.pause(), Err(PlaybackError::Busy)));
    assert!(matches!(h.orchestrator.skip().await, Err(PlaybackError::Busy)));

    let outcome = starting.await.unwrap().unwrap();
    assert_eq!(outcome.now_playing.unwrap().info.title, "Song A");
    assert_eq!(h.state(), PlaybackState::Active);
}

#[tokio::test(start_paused = true)]
async fn test_track_end_while_play_lock_held_still_advances() {
    let h = harness();
    h.add(&watch_url("a1")).await.unwrap();
    h.add(&watch_url("b2")).await.unwrap();

    let held = h.orchestrator.inner.try_play_lock().unwrap();
    h.gateway.player().finish();
    settle().await;
    assert_eq!(h.now_playing().unwrap().track.info.title, "Song A");

    drop(held);
    settle().await;
    assert_eq!(h.state(), PlaybackState::Active);
    assert_eq!(h.now_playing().unwrap().track.info.title, "Song B");
    assert!(h.titles().is_empty());
    assert_eq!(h.gateway.live_listeners(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_auto_pause_while_play_lock_held_is_applied_later() {
    let h = harness();
    h.add(&watch_url("a1")).await.unwrap();

    let held = h.orchestrator.inner.try_play_lock().unwrap();
    h.gateway.player().auto_pause();
    settle().await;
    assert_eq!(h.state(), PlaybackState::Active);

    drop(held);
    settle().await;
    assert_eq!(h.state(), PlaybackState::Idle);
    assert!(h.now_playing().unwrap().paused);

    tokio::time::sleep(Duration::from_secs(301)).await;
    assert_eq!(h.state(), PlaybackState::Inactive);
    assert_eq!(h.gateway.open_connections(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_event_deferred_past_status_change_is_dropped() {
    let h = harness();
    h.add(&watch_url("a1")).await.unwrap();
    h.add(&watch_url("b2")).await.unwrap();

    // the stop inside skip raises Idle while skip holds the play lock
    let next = h.orchestrator.skip().await.unwrap();
    assert_eq!(next.unwrap().info.title, "Song B");
    settle().await;

    assert_eq!(h.state(), PlaybackState::Active);
    assert_eq!(h.now_playing().unwrap().track.info.title, "Song B");
    assert_eq!(h.gateway.player().plays(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_adds_apply_in_arrival_order() {
    let h = harness_with(
        FakeGateway::new(),
        library().with_delay(Duration::from_secs(1)),
        FakeSource::new(),
        Config::default(),
    );
    h.add(&watch_url("a1")).await.unwrap();

    let first = {
        let orchestrator = h.orchestrator.clone();
        tokio::spawn(async move { orchestrator.add(&channel(ROOM), &watch_url("b2"), "bob").await })
    };
    let second = {
        let orchestrator = h.orchestrator.clone();
        tokio::spawn(async move { orchestrator.add(&channel(ROOM), &watch_url("c3"), "carol").await })
    };
    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    assert_eq!(h.titles(), vec!["Song B", "Song C"]);
}

#[tokio::test(start_paused = true)]
async fn test_queue_cap_bounds_resolution() {
    let config = Config {
        max_queue_size: 2,
        ..Config::default()
    };
    let h = harness_with(FakeGateway::new(), library(), FakeSource::new(), config);

    let outcome = h.add(PLAYLIST).await.unwrap();
    assert_eq!(outcome.queued.len(), 2);
    assert_eq!(outcome.playlist.unwrap().size, 2);
    assert_eq!(outcome.now_playing.unwrap().info.title, "One");
    assert_eq!(h.titles(), vec!["Two"]);

    let outcome = h.add(PLAYLIST).await.unwrap();
    assert_eq!(outcome.queued.len(), 1);
    assert_eq!(h.titles(), vec!["Two", "One"]);

    assert!(matches!(
        h.add(&watch_url("c3")).await,
        Err(PlaybackError::QueueFull(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_auto_pause_and_transport_resume() {
    let h = harness();
    h.add(&watch_url("a1")).await.unwrap();
    tokio::time::sleep(Duration::from_secs(20)).await;

    h.gateway.player().auto_pause();
    settle().await;
    assert_eq!(h.state(), PlaybackState::Idle);
    let paused = h.now_playing().unwrap();
    assert!(paused.paused);
    assert_eq!(paused.elapsed_secs, 20);

    h.gateway.player().auto_unpause();
    settle().await;
    assert_eq!(h.state(), PlaybackState::Active);
    assert_eq!(h.now_playing().unwrap().elapsed_secs, 20);
    assert_eq!(h.gateway.live_listeners(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_add_while_idle_starts_unless_paused() {
    let h = harness();
    h.add(&watch_url("a1")).await.unwrap();
    h.gateway.player().finish();
    settle().await;
    assert_eq!(h.state(), PlaybackState::Idle);

    let outcome = h.add(&watch_url("b2")).await.unwrap();
    assert_eq!(outcome.now_playing.unwrap().info.title, "Song B");
    assert_eq!(h.state(), PlaybackState::Active);

    h.orchestrator.pause().unwrap();
    let outcome = h.add(&watch_url("c3")).await.unwrap();
    assert!(outcome.now_playing.is_none());
    assert_eq!(h.state(), PlaybackState::Idle);
    assert_eq!(h.titles(), vec!["Song C"]);
}

#[tokio::test(start_paused = true)]
async fn test_resume_without_pause_starts_queue() {
    let h = harness();
    h.add(&watch_url("a1")).await.unwrap();
    h.orchestrator.pause().unwrap();
    h.add(&watch_url("b2")).await.unwrap();

    // skipping a paused track drops it
    let next = h.orchestrator.skip().await.unwrap();
    assert_eq!(next.unwrap().info.title, "Song B");
    h.gateway.player().finish();
    settle().await;

    assert!(matches!(
        h.orchestrator.resume().await,
        Err(PlaybackError::NothingToPlay { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_queue_editing() {
    let h = harness();
    h.add(&watch_url("a1")).await.unwrap();
    h.add(PLAYLIST).await.unwrap();
    assert_eq!(h.titles(), vec!["One", "Two", "Three", "Four", "Five"]);

    assert_eq!(h.orchestrator.remove(0).await.unwrap().info.title, "One");
    assert!(matches!(
        h.orchestrator.remove(10).await,
        Err(PlaybackError::NotFound(10))
    ));

    assert_eq!(h.orchestrator.shuffle().await.unwrap(), 4);
    let mut shuffled = h.titles();
    shuffled.sort();
    assert_eq!(shuffled, vec!["Five", "Four", "Three", "Two"]);

    assert_eq!(h.orchestrator.status().queue_duration_secs, 4 * 180);
    assert_eq!(h.orchestrator.clear().await.unwrap(), 4);
    assert!(h.titles().is_empty());
    assert_eq!(h.state(), PlaybackState::Active);
}

#[tokio::test(start_paused = true)]
async fn test_status_serializes() {
    let h = harness();
    h.add(&watch_url("a1")).await.unwrap();

    let json = serde_json::to_value(h.orchestrator.status()).unwrap();
    assert_eq!(json["state"], "active");
    assert_eq!(json["room_id"], ROOM);
    assert_eq!(json["now_playing"]["track"]["title"], "Song A");
    assert_eq!(json["now_playing"]["remaining_secs"], 180);
}
