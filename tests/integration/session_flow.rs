//! Full session: user actions in, backend frames out and back, visuals and
//! history observed through recording sinks.

use bytes::Bytes;
use neuro::sinks::Role;
use neuro::{FileUpload, NeuroError, Session, SessionEnd, UserAction};
use serde_json::json;
use tokio::sync::mpsc;

use crate::helpers::{FakeBackend, TIMEOUT, fast_config, recording_sinks, refused_url, wait_until};

async fn finish(handle: tokio::task::JoinHandle<SessionEnd>) -> SessionEnd {
    tokio::time::timeout(TIMEOUT, handle)
        .await
        .expect("session did not end")
        .expect("session task panicked")
}

#[tokio::test]
async fn text_turn_round_trip() {
    let mut backend = FakeBackend::start().await;
    let (sinks, screen, history) = recording_sinks();
    let mut session = Session::open(&fast_config(&backend.url), sinks, None)
        .await
        .unwrap();
    let (actions, rx) = mpsc::channel(8);
    let handle = tokio::spawn(async move { session.run(rx).await });

    actions
        .send(UserAction::SubmitText("   ".into()))
        .await
        .unwrap();
    actions
        .send(UserAction::SubmitText("hello".into()))
        .await
        .unwrap();
    assert_eq!(
        backend.next_received().await,
        json!({"type": "text_input", "payload": {"text": "hello"}})
    );

    backend.push(r#"{"type":"state_update","payload":{"state":"thinking"}}"#);
    backend.push(r#"{"type":"audio_chunk","payload":{"text":"Hi","expression":"吐舌"}}"#);
    backend.push(r#"{"type":"audio_chunk","payload":{"text":"there"}}"#);

    wait_until(|| screen.subtitles() == ["Hi", "there", ""]).await;
    let log = screen.log();
    assert_eq!(log[0], "expression:吐舌:true");
    assert_eq!(log[1], "subtitle:Hi");

    actions.send(UserAction::Shutdown).await.unwrap();
    assert_eq!(finish(handle).await, SessionEnd::Shutdown);

    let entries: Vec<_> = history
        .snapshot()
        .into_iter()
        .map(|e| (e.role, e.content))
        .collect();
    assert_eq!(
        entries,
        vec![
            (Role::User, "hello".to_owned()),
            (Role::Assistant, "Hi".to_owned()),
            (Role::Assistant, "there".to_owned()),
        ]
    );
}

#[tokio::test]
async fn new_text_while_speaking_interrupts_first() {
    let mut backend = FakeBackend::start().await;
    let (sinks, screen, _history) = recording_sinks();
    let mut config = fast_config(&backend.url);
    config.playback.reading_base_ms = 60_000;
    let mut session = Session::open(&config, sinks, None).await.unwrap();
    let (actions, rx) = mpsc::channel(8);
    let handle = tokio::spawn(async move { session.run(rx).await });

    backend.push(r#"{"type":"audio_chunk","payload":{"text":"a very long answer"}}"#);
    backend.push(r#"{"type":"audio_chunk","payload":{"text":"and more"}}"#);
    wait_until(|| screen.subtitles() == ["a very long answer"]).await;

    actions
        .send(UserAction::SubmitText("stop".into()))
        .await
        .unwrap();

    assert_eq!(
        backend.next_received().await,
        json!({"type": "interrupt", "payload": {}})
    );
    assert_eq!(
        backend.next_received().await,
        json!({"type": "text_input", "payload": {"text": "stop"}})
    );
    assert_eq!(screen.subtitles(), ["a very long answer", ""]);

    drop(actions);
    assert_eq!(finish(handle).await, SessionEnd::Shutdown);
}

#[tokio::test]
async fn uploads_and_recordings_always_interrupt() {
    let mut backend = FakeBackend::start().await;
    let (sinks, _screen, history) = recording_sinks();
    let mut session = Session::open(&fast_config(&backend.url), sinks, None)
        .await
        .unwrap();
    let (actions, rx) = mpsc::channel(8);
    let handle = tokio::spawn(async move { session.run(rx).await });

    actions
        .send(UserAction::SubmitFile(FileUpload::new(
            "cat.png",
            "image/png",
            Bytes::from_static(b"png"),
        )))
        .await
        .unwrap();
    actions.send(UserAction::BeginRecording).await.unwrap();
    actions
        .send(UserAction::SubmitRecording(Bytes::from_static(b"RIFF")))
        .await
        .unwrap();

    let interrupt = json!({"type": "interrupt", "payload": {}});
    assert_eq!(backend.next_received().await, interrupt);
    assert_eq!(
        backend.next_received().await,
        json!({"type": "text_input", "payload": {"text": "[Uploaded file: cat.png]", "image_base64": "cG5n"}})
    );
    assert_eq!(backend.next_received().await, interrupt);
    assert_eq!(backend.next_received().await, interrupt);
    assert_eq!(
        backend.next_received().await,
        json!({"type": "audio_input", "payload": {"audio_base64": "UklGRg==", "format": "audio/wav"}})
    );

    // The backend echoes the transcript of the recording.
    backend.push(r#"{"type":"text_input","payload":{"text":"what is this"}}"#);
    backend.push(r#"{"type":"error","payload":{"info":"vision model unavailable"}}"#);
    wait_until(|| history.len() == 4).await;

    let entries: Vec<_> = history
        .snapshot()
        .into_iter()
        .map(|e| (e.role, e.content))
        .collect();
    assert_eq!(
        entries,
        vec![
            (Role::User, "[Uploaded file: cat.png]".to_owned()),
            (Role::User, "[Uploaded file: voice_command.wav]".to_owned()),
            (Role::User, "what is this".to_owned()),
            (Role::System, "Error: vision model unavailable".to_owned()),
        ]
    );

    actions.send(UserAction::Shutdown).await.unwrap();
    assert_eq!(finish(handle).await, SessionEnd::Shutdown);
}

#[tokio::test]
async fn backend_drop_ends_the_session() {
    let backend = FakeBackend::start().await;
    let (sinks, screen, history) = recording_sinks();
    let mut config = fast_config(&backend.url);
    config.playback.reading_base_ms = 60_000;
    let mut session = Session::open(&config, sinks, None).await.unwrap();
    let (_actions, rx) = mpsc::channel(8);
    let handle = tokio::spawn(async move { session.run(rx).await });

    backend.push(r#"{"type":"audio_chunk","payload":{"text":"mid sentence"}}"#);
    wait_until(|| screen.subtitles() == ["mid sentence"]).await;
    backend.close();

    match finish(handle).await {
        SessionEnd::Disconnected { .. } => {}
        other => panic!("expected disconnect, got {other:?}"),
    }
    // Playback is torn down with the session.
    assert_eq!(screen.subtitles(), ["mid sentence", ""]);
    let last = history.snapshot().pop().unwrap();
    assert_eq!(last.role, Role::System);
    assert!(last.content.starts_with("Connection lost"));
}

#[tokio::test]
async fn dropping_a_running_session_stops_playback() {
    let backend = FakeBackend::start().await;
    let (sinks, screen, _history) = recording_sinks();
    let mut config = fast_config(&backend.url);
    config.playback.reading_base_ms = 60_000;
    let mut session = Session::open(&config, sinks, None).await.unwrap();
    let (_actions, rx) = mpsc::channel(8);
    let handle = tokio::spawn(async move { session.run(rx).await });

    backend.push(r#"{"type":"audio_chunk","payload":{"text":"never finished","expression":"脸红"}}"#);
    backend.push(r#"{"type":"audio_chunk","payload":{"text":"never shown"}}"#);
    wait_until(|| screen.subtitles() == ["never finished"]).await;

    handle.abort();
    assert!(handle.await.unwrap_err().is_cancelled());

    wait_until(|| screen.subtitles() == ["never finished", ""]).await;
    assert_eq!(screen.log().last().map(String::as_str), Some("reset"));
}

#[tokio::test]
async fn refused_connection_ends_immediately() {
    let (sinks, _screen, history) = recording_sinks();
    let mut session = Session::open(&fast_config(&refused_url()), sinks, None)
        .await
        .unwrap();
    let (_actions, rx) = mpsc::channel(8);

    match tokio::time::timeout(TIMEOUT, session.run(rx)).await.unwrap() {
        SessionEnd::Disconnected { reason } => assert!(reason.contains("connect")),
        other => panic!("expected disconnect, got {other:?}"),
    }
    assert_eq!(history.len(), 1);
    session.close().await;
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let (sinks, _screen, _history) = recording_sinks();
    let config = fast_config("http://127.0.0.1:8000/ws");
    match Session::open(&config, sinks, None).await {
        Err(NeuroError::Config(message)) => assert!(message.contains("ws://")),
        Err(other) => panic!("expected config error, got {other}"),
        Ok(_) => panic!("http endpoint must be rejected"),
    }
}
