use super::*;
use crate::pricing::FixedRate;
use crate::protocol::decode_server_message;

fn make_state() -> RoomState {
    RoomState {
        room_id: "test".to_string(),
        sessions: HashMap::new(),
        world: GameWorld::new(None),
    }
}

fn attach(state: &mut RoomState, session_id: &str, capacity: usize) -> SessionIo {
    let (outbound, io) = session_channels(session_id, capacity);
    state.sessions.insert(session_id.to_string(), outbound);
    io
}

fn join(username: &str, stake: f64) -> JoinPayload {
    JoinPayload {
        username: username.to_string(),
        stake_amount: stake,
    }
}

fn drain_hi(io: &mut SessionIo) -> Vec<ServerMessage> {
    let mut messages = Vec::new();
    while let Ok(payload) = io.outbound_hi_rx.try_recv() {
        messages.push(decode_server_message(&payload).expect("decodes"));
    }
    messages
}

fn drain_lo(io: &mut SessionIo) -> Vec<ServerMessage> {
    let mut messages = Vec::new();
    while let Ok(payload) = io.outbound_lo_rx.try_recv() {
        messages.push(decode_server_message(&payload).expect("decodes"));
    }
    messages
}

fn test_settings() -> RoomSettings {
    RoomSettings {
        tick_interval: Duration::from_millis(16),
        max_players: 4,
        outbound_queue_capacity: 16,
        spectator_username: None,
    }
}

#[test]
fn join_accepts_joiner_and_announces_to_others() {
    let mut state = make_state();
    let mut first = attach(&mut state, "first", 16);
    assert!(state.handle_join("first", join("alpha", 0.01), 100.0));
    let mut second = attach(&mut state, "second", 16);
    drain_hi(&mut first);

    assert!(state.handle_join("second", join("  beta  ", 0.02), 100.0));

    let accepted = drain_hi(&mut second);
    assert_eq!(accepted.len(), 1);
    let ServerMessage::JoinAccepted(payload) = &accepted[0] else {
        panic!("expected join accepted, got {accepted:?}");
    };
    assert_eq!(payload.player_id, "second");
    assert!((payload.starting_cash - 2.0).abs() < 1e-9);
    assert_eq!(payload.initial_state.snakes.len(), 2);

    let announced = drain_hi(&mut first);
    assert!(matches!(
        announced.as_slice(),
        [ServerMessage::PlayerJoined(joined)] if joined.snake.username == "beta"
    ));
}

#[test]
fn rejoin_while_alive_is_ignored() {
    let mut state = make_state();
    let mut io = attach(&mut state, "p", 16);
    assert!(state.handle_join("p", join("p", 0.01), 1.0));
    drain_hi(&mut io);
    assert!(!state.handle_join("p", join("p", 0.01), 1.0));
    assert!(drain_hi(&mut io).is_empty());
}

#[test]
fn ping_is_echoed_on_priority_lane() {
    let mut state = make_state();
    let mut io = attach(&mut state, "p", 16);
    state.handle_ping("p", TimePayload { time: 1234.5 });
    let replies = drain_hi(&mut io);
    assert!(matches!(replies.as_slice(), [ServerMessage::Pong(TimePayload { time })] if *time == 1234.5));
}

#[test]
fn tick_publishes_snapshot_to_latest_frame() {
    let mut state = make_state();
    let io = attach(&mut state, "p", 16);
    state.handle_join("p", join("p", 0.01), 1.0);
    state.tick(1.0, 0);
    let frame = io.outbound_state.take_latest().expect("snapshot stored");
    let ServerMessage::GameState(snapshot) = decode_server_message(&frame).unwrap() else {
        panic!("expected game state");
    };
    assert_eq!(snapshot.total_players, 1);
    assert_eq!(snapshot.snakes[0].id, "p");
}

#[test]
fn self_reported_death_broadcasts_died_and_kill_feed() {
    let mut state = make_state();
    let mut victim = attach(&mut state, "victim", 16);
    let mut watcher = attach(&mut state, "watcher", 16);
    state.handle_join("victim", join("victim", 0.01), 10.0);
    state.handle_join("watcher", join("watcher", 0.01), 10.0);
    drain_hi(&mut victim);
    drain_hi(&mut watcher);

    state.handle_collision_report(
        "victim",
        CollisionReportPayload {
            victim_id: "victim".to_string(),
            killer_id: "victim".to_string(),
        },
        0,
    );

    for io in [&mut victim, &mut watcher] {
        let messages = drain_hi(io);
        assert!(matches!(
            messages.as_slice(),
            [ServerMessage::PlayerDied(died), ServerMessage::KillFeed(feed)]
                if died.player_id == "victim" && feed.method == "wall" && feed.victim_name == "victim"
        ));
    }
    assert!(!state.world.is_alive("victim"));
    assert!(state.sessions.contains_key("victim"));
}

#[test]
fn third_party_report_changes_nothing() {
    let mut state = make_state();
    let mut a = attach(&mut state, "a", 16);
    let _b = attach(&mut state, "b", 16);
    state.handle_join("a", join("a", 0.01), 1.0);
    state.handle_join("b", join("b", 0.01), 1.0);
    drain_hi(&mut a);
    state.handle_collision_report(
        "a",
        CollisionReportPayload {
            victim_id: "b".to_string(),
            killer_id: "b".to_string(),
        },
        0,
    );
    assert!(state.world.is_alive("b"));
    assert!(drain_hi(&mut a).is_empty());
}

#[test]
fn full_priority_lane_drops_session_and_entity() {
    let mut state = make_state();
    let _slow = attach(&mut state, "slow", 1);
    assert!(state.handle_join("slow", join("slow", 0.01), 1.0));
    assert!(state.sessions.contains_key("slow"));

    state.handle_ping("slow", TimePayload { time: 1.0 });

    assert!(!state.sessions.contains_key("slow"));
    assert!(!state.world.is_alive("slow"));
}

#[test]
fn evicted_session_cannot_rejoin_or_act() {
    let mut state = make_state();
    let _slow = attach(&mut state, "slow", 1);
    let mut other = attach(&mut state, "other", 16);
    state.handle_join("slow", join("slow", 0.01), 1.0);
    state.handle_join("other", join("other", 0.01), 1.0);
    state.handle_ping("slow", TimePayload { time: 1.0 });
    assert!(!state.sessions.contains_key("slow"));
    drain_hi(&mut other);

    assert!(!state.handle_join("slow", join("slow", 0.01), 1.0));
    state.handle_input(
        "slow",
        InputPayload {
            target_angle: 1.0,
            is_boosting: false,
            sequence: 1,
        },
    );
    state.handle_collision_report(
        "slow",
        CollisionReportPayload {
            victim_id: "slow".to_string(),
            killer_id: "slow".to_string(),
        },
        0,
    );

    assert!(!state.world.is_alive("slow"));
    assert!(state.world.is_alive("other"));
    assert!(drain_hi(&mut other).is_empty());
}

#[test]
fn disconnect_removes_entity_without_death_events() {
    let mut state = make_state();
    let mut stays = attach(&mut state, "stays", 16);
    let _leaves = attach(&mut state, "leaves", 16);
    state.handle_join("stays", join("stays", 0.01), 1.0);
    state.handle_join("leaves", join("leaves", 0.01), 1.0);
    drain_hi(&mut stays);

    state.disconnect_session("leaves");
    state.tick(1.0, 0);

    assert!(!state.world.is_alive("leaves"));
    assert!(drain_hi(&mut stays).is_empty());
}

#[test]
fn food_eaten_goes_out_on_bulk_lane() {
    let mut state = make_state();
    let mut io = attach(&mut state, "eater", 16);
    state.handle_join("eater", join("eater", 0.01), 1.0);
    let head = state.world.snake("eater").unwrap().head_position();
    let food = state
        .world
        .food_mut()
        .spawn_at(head + crate::game::math::Vec2::new(2.0, 0.0), 1.0)
        .unwrap();

    state.tick(0.0, 0);

    let eaten = drain_lo(&mut io).into_iter().any(|message| match message {
        ServerMessage::FoodEaten(payload) => payload.food_ids.contains(&food.id),
        _ => false,
    });
    assert!(eaten);
}

#[tokio::test]
async fn ping_before_join_is_answered() {
    let room = Arc::new(Room::new("room", test_settings(), Arc::new(FixedRate(1.0))));
    let mut io = room.add_session("p").await;
    room.handle_client_message("p", ClientMessage::Ping(TimePayload { time: 7.0 })).await;
    assert!(matches!(drain_hi(&mut io).as_slice(), [ServerMessage::Pong(_)]));
    assert!(!room.is_running());
}

#[tokio::test]
async fn empty_room_reports_idle_after_last_session_leaves() {
    let room = Arc::new(Room::new("room", test_settings(), Arc::new(FixedRate(1.0))));
    let _io = room.add_session("p").await;
    room.handle_client_message("p", ClientMessage::Join(join("p", 0.01))).await;
    assert!(room.is_running());
    assert!(!room.is_empty().await);

    room.remove_session("p").await;
    assert!(room.is_empty().await);
}
