//! Full-lifecycle tests for the connection state machine driven by a
//! virtual clock.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use driftline_core::{
    ConnectionAction, ConnectionConfig, ConnectionManager, ConnectionState,
    env::{Environment, test_utils::MockEnv},
};

/// Drive ticks until an `OpenTransport` fires or the budget runs out.
fn tick_until_open(
    conn: &mut ConnectionManager,
    env: &MockEnv,
    step: Duration,
    max_steps: u32,
) -> bool {
    for _ in 0..max_steps {
        env.advance(step);
        if conn.tick(env.now()).contains(&ConnectionAction::OpenTransport) {
            return true;
        }
    }
    false
}

#[test]
fn disconnect_reconnect_cycle_preserves_heartbeat_cadence() {
    let env = MockEnv::new();
    let mut conn = ConnectionManager::new(ConnectionConfig::default());

    conn.connect(env.now());
    conn.handshake_succeeded(1, env.now()).unwrap();

    // First heartbeat after one interval
    env.advance(Duration::from_secs(30));
    assert_eq!(conn.tick(env.now()), vec![ConnectionAction::Heartbeat]);

    // Transport drops; heartbeat stops while reconnecting
    conn.transport_lost("reset", env.now());
    env.advance(Duration::from_secs(1));
    assert!(!conn.tick(env.now()).contains(&ConnectionAction::Heartbeat));

    // Retry fires after the base backoff, then a fresh session re-arms
    assert!(tick_until_open(&mut conn, &env, Duration::from_secs(1), 10));
    conn.handshake_succeeded(2, env.now()).unwrap();
    assert_eq!(conn.session_id(), Some(2));

    env.advance(Duration::from_secs(29));
    assert!(conn.tick(env.now()).is_empty());
    env.advance(Duration::from_secs(1));
    assert_eq!(conn.tick(env.now()), vec![ConnectionAction::Heartbeat]);
}

#[test]
fn repeated_failures_surface_one_terminal_error() {
    let env = MockEnv::new();
    let mut conn = ConnectionManager::new(ConnectionConfig {
        max_reconnect_attempts: 3,
        ..ConnectionConfig::default()
    });

    conn.connect(env.now());

    let mut fail_actions = 0;
    for _ in 0..3 {
        let actions = conn.handshake_failed("refused", env.now()).unwrap();
        fail_actions +=
            actions.iter().filter(|a| matches!(a, ConnectionAction::Fail { .. })).count();
        if conn.state() == ConnectionState::Failed {
            break;
        }
        assert!(tick_until_open(&mut conn, &env, Duration::from_secs(1), 60));
    }

    assert_eq!(conn.state(), ConnectionState::Failed);
    assert_eq!(fail_actions, 1);

    // An explicit connect after terminal failure starts a fresh budget
    let actions = conn.connect(env.now());
    assert!(actions.contains(&ConnectionAction::OpenTransport));
    assert_eq!(conn.attempts(), 0);
}

#[test]
fn duplicate_connect_never_overlaps_sessions() {
    let env = MockEnv::new();
    let mut conn = ConnectionManager::new(ConnectionConfig::default());

    conn.connect(env.now());
    conn.handshake_succeeded(1, env.now()).unwrap();

    // Second connect closes before it reopens
    let actions = conn.connect(env.now());
    let close_idx =
        actions.iter().position(|a| matches!(a, ConnectionAction::CloseTransport { .. }));
    assert!(close_idx.is_some());
    assert!(!actions.contains(&ConnectionAction::OpenTransport));

    // The reopen arrives only after the settle delay
    assert!(tick_until_open(&mut conn, &env, Duration::from_millis(100), 10));
    conn.handshake_succeeded(2, env.now()).unwrap();
    assert_eq!(conn.session_id(), Some(2));
}

mod backoff_properties {
    use proptest::prelude::*;

    use super::*;

    proptest! {
        /// Whatever the policy parameters, measured retry delays never
        /// shrink between attempts and never exceed the cap.
        #[test]
        fn retry_delays_grow_and_stay_capped(
            base_secs in 1u64..5,
            cap_secs in 5u64..40,
            max_attempts in 2u32..6,
        ) {
            let step = Duration::from_millis(500);
            let env = MockEnv::new();
            let mut conn = ConnectionManager::new(ConnectionConfig {
                reconnect_base: Duration::from_secs(base_secs),
                reconnect_cap: Duration::from_secs(cap_secs),
                max_reconnect_attempts: max_attempts,
                ..ConnectionConfig::default()
            });
            conn.connect(env.now());

            let mut measured = Vec::new();
            loop {
                conn.handshake_failed("refused", env.now()).unwrap();
                if conn.state() == ConnectionState::Failed {
                    break;
                }
                let mut waited = Duration::ZERO;
                loop {
                    env.advance(step);
                    waited += step;
                    if conn.tick(env.now()).contains(&ConnectionAction::OpenTransport) {
                        break;
                    }
                    prop_assert!(waited < Duration::from_secs(120), "retry never fired");
                }
                measured.push(waited);
            }

            prop_assert_eq!(measured.len() as u32, max_attempts - 1);
            prop_assert!(measured.windows(2).all(|w| w[0] <= w[1]));
            let cap = Duration::from_secs(cap_secs) + step;
            prop_assert!(measured.iter().all(|d| *d <= cap));
        }
    }
}
