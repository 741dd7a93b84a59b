//! Session lifecycle against real child processes.

mod common;

use std::thread;
use std::time::Duration;

use common::WAIT;
use common::manager;
use common::spawn_sh;
use common::wait_text;
use tuivision_session::SessionError;
use tuivision_session::SessionEvent;
use tuivision_session::SessionExit;
use tuivision_session::SessionStatus;
use tuivision_session::SpawnOptions;
use tuivision_session::TextMatcher;
use tuivision_session::wait_for_screen_change;
use tuivision_session::wait_for_text;

// =============================================================================
// Spawn and Output
// =============================================================================

#[test]
fn test_spawned_output_reaches_screen() {
    let manager = manager();
    let Some(spawned) = spawn_sh(&manager, "echo hello-from-pty; sleep 5") else {
        return;
    };

    assert!(spawned.pid.is_some());
    assert_eq!((spawned.cols, spawned.rows), (80, 24));
    assert!(wait_text(&manager, &spawned.id, "hello-from-pty"));

    let session = manager.require(&spawned.id).unwrap();
    assert!(session.screen_text().contains("hello-from-pty"));
    assert!(session.is_running());
    manager.close(&spawned.id).unwrap();
}

#[test]
fn test_env_and_cwd_are_applied() {
    let manager = manager();
    let dir = std::env::temp_dir();
    let options = SpawnOptions::new("sh")
        .args(["-c", "echo \"$GREETING:$TERM\"; pwd; sleep 5"])
        .env([("GREETING".to_string(), "howdy".to_string())].into())
        .cwd(&dir);
    let Ok(spawned) = manager.spawn(options) else {
        return;
    };

    assert!(wait_text(&manager, &spawned.id, "howdy:xterm-256color"));
    manager.close(&spawned.id).unwrap();
}

#[test]
fn test_missing_program_is_a_spawn_error() {
    let manager = manager();
    let result = manager.spawn(SpawnOptions::new("/definitely/not/a/program"));
    if let Err(err) = result {
        assert!(matches!(err, SessionError::Pty(_)));
        assert_eq!(manager.session_count(), 0);
    }
}

// =============================================================================
// Input
// =============================================================================

#[test]
fn test_input_is_echoed_back() {
    let manager = manager();
    let Some(spawned) = spawn_sh(&manager, "read -r line; echo \"got:$line\"; sleep 5") else {
        return;
    };

    manager.send_input(&spawned.id, b"ping\r").unwrap();
    assert!(wait_text(&manager, &spawned.id, "got:ping"));
    manager.close(&spawned.id).unwrap();
}

// =============================================================================
// Exit and Close
// =============================================================================

#[test]
fn test_exit_code_is_recorded() {
    let manager = manager();
    let Some(spawned) = spawn_sh(&manager, "echo bye; exit 3") else {
        return;
    };
    let session = manager.require(&spawned.id).unwrap();

    let matcher = TextMatcher::new("never-printed", None).unwrap();
    let outcome = wait_for_text(session.as_ref(), &matcher, WAIT);
    assert!(!outcome.found);
    assert_eq!(outcome.exit, Some(SessionExit::Exited(Some(3))));
    assert!(outcome.screen_text.contains("bye"));

    assert_eq!(session.status(), SessionStatus::Exited { code: Some(3) });
    // Exited sessions stay registered until closed.
    let listed = manager.list();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, "exited");
    assert_eq!(listed[0].exit_code, Some(3));

    manager.close(&spawned.id).unwrap();
    assert_eq!(session.status(), SessionStatus::Exited { code: Some(3) });
}

#[test]
fn test_second_close_reports_not_found() {
    let manager = manager();
    let Some(spawned) = spawn_sh(&manager, "sleep 30") else {
        return;
    };

    manager.close(&spawned.id).unwrap();
    assert!(matches!(
        manager.close(&spawned.id),
        Err(SessionError::NotFound(_))
    ));
    assert!(manager.get(&spawned.id).is_none());
    assert!(manager.list().is_empty());
}

#[test]
fn test_close_ends_pending_wait_as_closed() {
    let manager = manager();
    let Some(spawned) = spawn_sh(&manager, "sleep 30") else {
        return;
    };
    let session = manager.require(&spawned.id).unwrap();

    let waiter = {
        let session = std::sync::Arc::clone(&session);
        thread::spawn(move || {
            let matcher = TextMatcher::new("never", None).unwrap();
            wait_for_text(session.as_ref(), &matcher, Duration::from_secs(10))
        })
    };
    thread::sleep(Duration::from_millis(100));
    manager.close(&spawned.id).unwrap();

    let outcome = waiter.join().unwrap();
    assert!(!outcome.found);
    assert!(matches!(outcome.exit, Some(SessionExit::Closed(_))));
    assert!(outcome.elapsed < Duration::from_secs(5));
    assert!(!session.is_running());
}

#[test]
fn test_exit_is_last_event_when_closed_mid_output() {
    let manager = manager();
    let Some(spawned) = spawn_sh(&manager, "yes") else {
        return;
    };
    let session = manager.require(&spawned.id).unwrap();
    let subscription = session.subscribe();

    thread::sleep(Duration::from_millis(50));
    manager.close(&spawned.id).unwrap();

    let deadline = std::time::Instant::now() + WAIT;
    let mut events = Vec::new();
    while let Ok(event) = subscription.recv_deadline(deadline) {
        events.push(event);
    }

    let exit_at = events
        .iter()
        .position(|event| matches!(event, SessionEvent::Exit(_)))
        .expect("close publishes an exit event");
    assert_eq!(exit_at, events.len() - 1, "events followed the exit");
    assert!(matches!(
        events[exit_at],
        SessionEvent::Exit(SessionExit::Closed(_))
    ));
}

#[test]
fn test_wait_on_exited_session_returns_immediately() {
    let manager = manager();
    let Some(spawned) = spawn_sh(&manager, "exit 0") else {
        return;
    };
    let session = manager.require(&spawned.id).unwrap();
    let deadline = std::time::Instant::now() + WAIT;
    while session.is_running() && std::time::Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
    }

    let outcome = wait_for_screen_change(session.as_ref(), WAIT, Duration::from_millis(50));
    assert!(!outcome.changed);
    assert_eq!(outcome.exit, Some(SessionExit::Exited(Some(0))));
    assert!(outcome.elapsed < Duration::from_secs(1));
}

// =============================================================================
// Screen Change
// =============================================================================

#[test]
fn test_screen_change_settles_after_output() {
    let manager = manager();
    let Some(spawned) = spawn_sh(&manager, "read -r _; echo one; echo two; sleep 5") else {
        return;
    };
    let session = manager.require(&spawned.id).unwrap();

    let waiter = {
        let session = std::sync::Arc::clone(&session);
        thread::spawn(move || {
            wait_for_screen_change(session.as_ref(), WAIT, Duration::from_millis(100))
        })
    };
    thread::sleep(Duration::from_millis(50));
    manager.send_input(&spawned.id, b"\r").unwrap();

    let outcome = waiter.join().unwrap();
    assert!(outcome.changed);
    assert_eq!(outcome.exit, None);
    manager.close(&spawned.id).unwrap();
}

// =============================================================================
// Resize
// =============================================================================

#[test]
fn test_resize_updates_screen_and_child() {
    let manager = manager();
    let Some(spawned) = spawn_sh(&manager, "read -r _; stty size; sleep 5") else {
        return;
    };

    manager.resize(&spawned.id, 100, 30).unwrap();
    let session = manager.require(&spawned.id).unwrap();
    assert_eq!(session.size(), (100, 30));
    assert_eq!(session.screen_state().width, 100);

    manager.send_input(&spawned.id, b"\r").unwrap();
    assert!(wait_text(&manager, &spawned.id, "30 100"));
    manager.close(&spawned.id).unwrap();
}

#[test]
fn test_resize_out_of_range_is_rejected() {
    let manager = manager();
    let Some(spawned) = spawn_sh(&manager, "sleep 5") else {
        return;
    };

    assert!(matches!(
        manager.resize(&spawned.id, 80, 0),
        Err(SessionError::InvalidDimensions { .. })
    ));
    let session = manager.require(&spawned.id).unwrap();
    assert_eq!(session.size(), (80, 24));
    manager.close(&spawned.id).unwrap();
}

// =============================================================================
// Listing and Limits
// =============================================================================

#[test]
fn test_list_is_ordered_by_creation() {
    let manager = manager();
    let Some(first) = spawn_sh(&manager, "sleep 5") else {
        return;
    };
    thread::sleep(Duration::from_millis(5));
    let Some(second) = spawn_sh(&manager, "sleep 5") else {
        manager.close(&first.id).unwrap();
        return;
    };

    let ids: Vec<_> = manager.list().into_iter().map(|info| info.id).collect();
    assert_eq!(ids, vec![first.id.clone(), second.id.clone()]);

    manager.close(&first.id).unwrap();
    let ids: Vec<_> = manager.list().into_iter().map(|info| info.id).collect();
    assert_eq!(ids, vec![second.id.clone()]);
    manager.close(&second.id).unwrap();
}

#[test]
fn test_dispose_closes_everything() {
    let manager = manager();
    let Some(spawned) = spawn_sh(&manager, "sleep 30") else {
        return;
    };
    let session = manager.require(&spawned.id).unwrap();

    manager.dispose();
    assert_eq!(manager.session_count(), 0);
    assert!(!session.is_running());
    assert!(matches!(session.status(), SessionStatus::Closed { .. }));
}

// =============================================================================
// Screenshots
// =============================================================================

#[test]
fn test_screenshot_formats() {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use tuivision_session::usecases::GetScreenshotInput;
    use tuivision_session::usecases::GetScreenshotUseCase;
    use tuivision_session::usecases::ScreenshotFormat;

    let manager = manager();
    let Some(spawned) = spawn_sh(&manager, "printf 'snap'; sleep 5") else {
        return;
    };
    assert!(wait_text(&manager, &spawned.id, "snap"));
    let usecase = GetScreenshotUseCase::new(std::sync::Arc::clone(&manager));

    let png = usecase
        .execute(GetScreenshotInput::new(spawned.id.as_str()))
        .unwrap();
    assert_eq!(png.format, ScreenshotFormat::Png);
    assert_eq!(png.mime_type, "image/png");
    assert_eq!((png.width, png.height), (80, 24));
    let bytes = STANDARD.decode(&png.data).unwrap();
    assert!(bytes.starts_with(b"\x89PNG\r\n\x1a\n"));

    let svg = usecase
        .execute(GetScreenshotInput {
            format: ScreenshotFormat::Svg,
            ..GetScreenshotInput::new(spawned.id.as_str())
        })
        .unwrap();
    assert_eq!(svg.mime_type, "image/svg+xml");
    assert!(svg.data.starts_with("<svg"));
    assert!(svg.data.contains(">s</text>"));

    let json = serde_json::to_value(&png).unwrap();
    assert_eq!(json["format"], "png");
    manager.close(&spawned.id).unwrap();
}
