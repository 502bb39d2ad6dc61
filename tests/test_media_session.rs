// Copyright (c) 2024-2026, Daily
// SPDX-License-Identifier: BSD-2-Clause

//! End-to-end media session tests.
//!
//! Both sockets are replaced by in-process channels: the test plays the
//! telephony provider and the realtime service, and watches what the session
//! writes to each side.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;

use callrelay::call_control::CallControl;
use callrelay::config::SessionConfig;
use callrelay::error::{RelayError, Result};
use callrelay::protocol::{RealtimeCommand, TelephonyCommand};
use callrelay::session::{MediaSession, SessionHandle, SessionPhase, SessionSummary};
use callrelay::transcript::{
    CorrelationKeys, InMemoryTranscriptStore, Speaker, Transcript, TranscriptStore,
};
use callrelay::transport::{
    channel_stream, Outbox, OutboxReceiver, Outgoing, RealtimeConnector, RealtimeLink,
    TelephonyLink,
};

const WAIT: Duration = Duration::from_secs(5);

/// Hands out a prepared link once, or fails the handshake.
struct FakeConnector {
    link: std::sync::Mutex<Option<RealtimeLink>>,
}

#[async_trait]
impl RealtimeConnector for FakeConnector {
    async fn connect(&self, _config: &SessionConfig) -> Result<RealtimeLink> {
        self.link
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| RelayError::Handshake("401 Unauthorized".to_string()))
    }
}

#[derive(Default)]
struct RecordingControl {
    ended: Mutex<Vec<String>>,
}

#[async_trait]
impl CallControl for RecordingControl {
    async fn end_call(&self, call_id: &str) -> Result<()> {
        self.ended.lock().await.push(call_id.to_string());
        Ok(())
    }
}

/// Never finishes hanging up; signals once it has been asked to.
#[derive(Default)]
struct StalledControl {
    asked: Notify,
}

#[async_trait]
impl CallControl for StalledControl {
    async fn end_call(&self, _call_id: &str) -> Result<()> {
        self.asked.notify_one();
        std::future::pending().await
    }
}

struct Call {
    /// Frames from the "telephony provider". `None` once the caller hung up.
    telephony_tx: Option<mpsc::UnboundedSender<Result<String>>>,
    /// What the session sent to the caller.
    telephony_rx: OutboxReceiver<TelephonyCommand>,
    /// Events from the "realtime service". `None` once that side hung up.
    realtime_tx: Option<mpsc::UnboundedSender<Result<String>>>,
    /// What the session sent to the realtime service.
    realtime_rx: OutboxReceiver<RealtimeCommand>,
    store: Arc<InMemoryTranscriptStore>,
    handle: SessionHandle,
    task: JoinHandle<Result<SessionSummary>>,
}

/// Everything left once the session task has returned.
struct Finished {
    result: Result<SessionSummary>,
    store: Arc<InMemoryTranscriptStore>,
    handle: SessionHandle,
    telephony_rx: OutboxReceiver<TelephonyCommand>,
    realtime_rx: OutboxReceiver<RealtimeCommand>,
}

impl Finished {
    /// Remaining realtime commands, excluding the final close.
    fn realtime_messages(&mut self) -> Vec<RealtimeCommand> {
        std::iter::from_fn(|| self.realtime_rx.try_recv())
            .filter_map(|item| match item {
                Outgoing::Message(command) => Some(command),
                Outgoing::Close => None,
            })
            .collect()
    }

    fn telephony_closed(&mut self) -> bool {
        std::iter::from_fn(|| self.telephony_rx.try_recv()).any(|item| item == Outgoing::Close)
    }
}

impl Call {
    fn start(config: SessionConfig, configure: impl FnOnce(MediaSession) -> MediaSession) -> Self {
        Self::start_with(config, configure, true, Arc::new(InMemoryTranscriptStore::new()))
    }

    fn start_with(
        config: SessionConfig,
        configure: impl FnOnce(MediaSession) -> MediaSession,
        handshake_ok: bool,
        store: Arc<InMemoryTranscriptStore>,
    ) -> Self {
        let (telephony_outbox, telephony_rx) = Outbox::channel("telephony");
        let (telephony_tx, frames) = mpsc::unbounded_channel();
        let telephony = TelephonyLink {
            outbox: telephony_outbox,
            frames: channel_stream(frames),
        };

        let (realtime_outbox, realtime_rx) = Outbox::channel("realtime");
        let (realtime_tx, events) = mpsc::unbounded_channel();
        let link = RealtimeLink {
            outbox: realtime_outbox,
            events: channel_stream(events),
        };
        let connector = Arc::new(FakeConnector {
            link: std::sync::Mutex::new(handshake_ok.then_some(link)),
        });

        let session = configure(MediaSession::new(config, store.clone()));
        let handle = session.handle();
        let task = tokio::spawn(async move { session.run(telephony, connector.as_ref()).await });

        Self {
            telephony_tx: Some(telephony_tx),
            telephony_rx,
            realtime_tx: Some(realtime_tx),
            realtime_rx,
            store,
            handle,
            task,
        }
    }

    fn telephony(&self, frame: serde_json::Value) {
        self.telephony_raw(Ok(frame.to_string()));
    }

    fn telephony_raw(&self, item: Result<String>) {
        self.telephony_tx
            .as_ref()
            .expect("caller already hung up")
            .send(item)
            .unwrap();
    }

    /// The caller's socket goes away without a `stop` frame.
    fn close_telephony(&mut self) {
        self.telephony_tx = None;
    }

    fn realtime(&self, event: serde_json::Value) {
        self.realtime_raw(&event.to_string());
    }

    fn realtime_raw(&self, text: &str) {
        self.realtime_item(Ok(text.to_string()));
    }

    fn realtime_item(&self, item: Result<String>) {
        self.realtime_tx
            .as_ref()
            .expect("realtime side already closed")
            .send(item)
            .unwrap();
    }

    /// The realtime service closes its socket.
    fn close_realtime(&mut self) {
        self.realtime_tx = None;
    }

    fn media(&self, timestamp: u64, payload: &str) {
        self.telephony(json!({
            "event": "media",
            "streamSid": "S1",
            "media": {"track": "inbound", "timestamp": timestamp.to_string(), "payload": payload}
        }));
    }

    async fn to_realtime(&mut self) -> Outgoing<RealtimeCommand> {
        tokio::time::timeout(WAIT, self.realtime_rx.recv())
            .await
            .expect("timed out waiting for realtime command")
            .expect("realtime outbox dropped")
    }

    async fn to_telephony(&mut self) -> Outgoing<TelephonyCommand> {
        tokio::time::timeout(WAIT, self.telephony_rx.recv())
            .await
            .expect("timed out waiting for telephony command")
            .expect("telephony outbox dropped")
    }

    /// Consume the session.update sent on connect and wait for `Active`.
    async fn connected(&mut self) {
        match self.to_realtime().await {
            Outgoing::Message(RealtimeCommand::SessionUpdate { session }) => {
                assert_eq!(session.turn_detection.kind, "server_vad");
            }
            other => panic!("expected session.update, got {other:?}"),
        }
        let mut phase = self.handle.watch_phase();
        tokio::time::timeout(WAIT, phase.wait_for(|p| *p == SessionPhase::Active))
            .await
            .expect("timed out waiting for Active")
            .unwrap();
    }

    /// Send `start` and wait until the inbound relay has processed it.
    async fn begin(&mut self, start: serde_json::Value) {
        self.telephony(start);
        self.media(0, "AA==");
        assert_eq!(
            self.to_realtime().await,
            Outgoing::Message(RealtimeCommand::append("AA=="))
        );
    }

    async fn finished(self) -> Finished {
        let result = tokio::time::timeout(WAIT, self.task)
            .await
            .expect("session did not finish")
            .unwrap();
        Finished {
            result,
            store: self.store,
            handle: self.handle,
            telephony_rx: self.telephony_rx,
            realtime_rx: self.realtime_rx,
        }
    }
}

fn start_frame() -> serde_json::Value {
    json!({
        "event": "start",
        "sequenceNumber": "1",
        "start": {"streamSid": "S1", "callSid": "CA1", "accountSid": "AC1", "tracks": ["inbound"]},
        "streamSid": "S1"
    })
}

fn audio_delta(item_id: &str, payload: &str) -> serde_json::Value {
    json!({
        "type": "response.audio.delta",
        "response_id": "r1",
        "item_id": item_id,
        "output_index": 0,
        "content_index": 0,
        "delta": payload
    })
}

fn speech_started() -> serde_json::Value {
    json!({"type": "input_audio_buffer.speech_started", "audio_start_ms": 1200, "item_id": "u1"})
}

fn transcription(text: &str) -> serde_json::Value {
    json!({
        "type": "conversation.item.input_audio_transcription.completed",
        "item_id": "u1",
        "content_index": 0,
        "transcript": text
    })
}

/// start, three media frames, then one assistant audio delta.
async fn speak_then_respond(call: &mut Call) {
    call.telephony(start_frame());
    for (ts, payload) in [(0, "AAE="), (20, "AgM="), (40, "BAU=")] {
        call.media(ts, payload);
    }
    for payload in ["AAE=", "AgM=", "BAU="] {
        assert_eq!(
            call.to_realtime().await,
            Outgoing::Message(RealtimeCommand::append(payload))
        );
    }

    call.realtime(audio_delta("X", "/w=="));
    assert_eq!(
        call.to_telephony().await,
        Outgoing::Message(TelephonyCommand::media("S1", "/w=="))
    );
    assert_eq!(
        call.to_telephony().await,
        Outgoing::Message(TelephonyCommand::mark("S1", "responsePart"))
    );
}

#[tokio::test]
async fn test_caller_audio_forwarded_in_order() {
    let mut call = Call::start(SessionConfig::new("sk-test"), |s| s);
    call.connected().await;

    call.telephony(json!({"event": "connected", "protocol": "Call", "version": "1.0.0"}));
    call.telephony(start_frame());
    for (ts, payload) in [(0, "AAE="), (20, "AgM="), (40, "BAU=")] {
        call.media(ts, payload);
    }
    for payload in ["AAE=", "AgM=", "BAU="] {
        assert_eq!(
            call.to_realtime().await,
            Outgoing::Message(RealtimeCommand::append(payload))
        );
    }

    let snap = call.handle.snapshot().await;
    assert_eq!(snap.latest_media_timestamp_ms, 40);
    assert_eq!(snap.stream_id.as_deref(), Some("S1"));
    assert_eq!(snap.call_id.as_deref(), Some("CA1"));
}

#[tokio::test]
async fn test_first_delta_anchors_response() {
    let mut call = Call::start(SessionConfig::new("sk-test"), |s| s);
    call.connected().await;
    speak_then_respond(&mut call).await;

    let snap = call.handle.snapshot().await;
    assert_eq!(snap.response_start_timestamp_ms, Some(40));
    assert_eq!(snap.pending_marks, 1);
    assert_eq!(snap.current_item_id.as_deref(), Some("X"));
}

#[tokio::test]
async fn test_barge_in_truncates_and_clears() {
    let mut call = Call::start(SessionConfig::new("sk-test"), |s| s);
    call.connected().await;
    speak_then_respond(&mut call).await;

    call.media(200, "BgY=");
    assert_eq!(
        call.to_realtime().await,
        Outgoing::Message(RealtimeCommand::append("BgY="))
    );
    call.realtime(speech_started());

    assert_eq!(
        call.to_realtime().await,
        Outgoing::Message(RealtimeCommand::truncate("X", 160))
    );
    assert_eq!(
        call.to_telephony().await,
        Outgoing::Message(TelephonyCommand::clear("S1"))
    );

    let snap = call.handle.snapshot().await;
    assert_eq!(snap.pending_marks, 0);
    assert_eq!(snap.current_item_id, None);
    assert_eq!(snap.response_start_timestamp_ms, None);

    // A second speech_started with nothing in flight does nothing.
    call.realtime(speech_started());
    call.realtime(audio_delta("Y", "/w=="));
    assert_eq!(
        call.to_telephony().await,
        Outgoing::Message(TelephonyCommand::media("S1", "/w=="))
    );
    assert_eq!(call.realtime_rx.try_recv(), None);
}

#[tokio::test]
async fn test_mark_acknowledgement_drains_queue() {
    let mut call = Call::start(SessionConfig::new("sk-test"), |s| s);
    call.connected().await;
    speak_then_respond(&mut call).await;

    call.telephony(json!({"event": "mark", "streamSid": "S1", "mark": {"name": "responsePart"}}));
    call.media(60, "AA==");
    call.to_realtime().await;
    assert_eq!(call.handle.snapshot().await.pending_marks, 0);

    // Audio was played out in full, so there is nothing to truncate.
    call.realtime(speech_started());
    call.close_realtime();

    let mut done = call.finished().await;
    assert!(done.result.is_ok());
    assert!(done.realtime_messages().is_empty());
    assert!(done.telephony_closed());
}

#[tokio::test]
async fn test_blank_transcription_not_recorded() {
    let mut call = Call::start(SessionConfig::new("sk-test"), |s| s);
    call.connected().await;
    call.begin(start_frame()).await;

    call.realtime(transcription(""));
    call.realtime(transcription("  "));
    call.realtime(json!({"type": "rate_limits.updated", "rate_limits": []}));
    call.realtime_raw("{not json");
    call.close_realtime();

    let done = call.finished().await;
    let summary = done.result.unwrap();
    assert_eq!(done.handle.phase(), SessionPhase::Closed);
    assert!(summary.transcript.is_empty());
    assert_eq!(done.store.writes().await, 0);
    assert!(done.store.transcript("CA1").await.is_none());
}

#[tokio::test]
async fn test_transcript_persisted_on_close() {
    let mut call = Call::start(SessionConfig::new("sk-test"), |s| s);
    call.connected().await;
    call.begin(start_frame()).await;

    call.realtime(transcription("Do you have vegetarian options?"));
    call.realtime(json!({
        "type": "response.done",
        "response": {
            "id": "r1",
            "status": "completed",
            "output": [{"id": "i1", "role": "assistant", "content": [
                {"type": "audio", "transcript": "Yes, several."},
                {"type": "audio", "transcript": ""}
            ]}]
        }
    }));
    call.close_realtime();

    let mut done = call.finished().await;
    let summary = done.result.as_ref().unwrap().clone();
    assert_eq!(done.handle.phase(), SessionPhase::Closed);
    assert!(done.telephony_closed());

    let stored = done.store.transcript("CA1").await.expect("transcript flushed");
    assert_eq!(stored, summary.transcript);
    let lines: Vec<String> = stored.iter().map(|e| e.line()).collect();
    assert_eq!(
        lines,
        vec!["User: Do you have vegetarian options?", "Assistant: Yes, several."]
    );
}

#[tokio::test]
async fn test_stop_closes_realtime_and_drops_later_media() {
    let mut call = Call::start(SessionConfig::new("sk-test"), |s| s);
    call.connected().await;
    call.begin(start_frame()).await;

    call.telephony(json!({"event": "stop", "streamSid": "S1"}));
    call.media(20, "AQ==");
    call.media(40, "Ag==");
    assert_eq!(call.to_realtime().await, Outgoing::Close);

    let mut done = call.finished().await;
    assert!(done.result.is_ok());
    assert_eq!(done.handle.phase(), SessionPhase::Closed);
    assert!(done.realtime_messages().is_empty());
    assert!(done.telephony_closed());
}

#[tokio::test]
async fn test_handshake_failure_closes_session() {
    let call = Call::start_with(
        SessionConfig::new("sk-test"),
        |s| s,
        false,
        Arc::new(InMemoryTranscriptStore::new()),
    );

    let mut done = call.finished().await;
    assert!(matches!(done.result, Err(RelayError::Handshake(_))));
    assert_eq!(done.handle.phase(), SessionPhase::Closed);
    assert!(done.telephony_closed());
    assert!(done.realtime_messages().is_empty());
}

#[tokio::test]
async fn test_greeting_prompts_assistant_first() {
    let config = SessionConfig::new("sk-test").with_greeting("Hello! Welcome to Bella Roma.");
    let mut call = Call::start(config, |s| s);

    assert!(matches!(
        call.to_realtime().await,
        Outgoing::Message(RealtimeCommand::SessionUpdate { .. })
    ));
    match call.to_realtime().await {
        Outgoing::Message(RealtimeCommand::ConversationItemCreate { item }) => {
            assert_eq!(item.role, "user");
            assert!(item.content[0].text.contains("Hello! Welcome to Bella Roma."));
        }
        other => panic!("expected conversation.item.create, got {other:?}"),
    }
    assert_eq!(
        call.to_realtime().await,
        Outgoing::Message(RealtimeCommand::ResponseCreate)
    );
}

#[tokio::test]
async fn test_hangup_phrase_ends_call() {
    let control = Arc::new(RecordingControl::default());
    let control_for_session = control.clone();
    let mut call = Call::start(SessionConfig::new("sk-test"), move |s| {
        s.with_call_control(control_for_session)
    });
    call.connected().await;
    call.begin(start_frame()).await;
    call.realtime(transcription("That's all, goodbye."));

    let mut done = call.finished().await;
    assert!(done.result.is_ok());
    assert_eq!(done.handle.phase(), SessionPhase::Closed);
    assert!(done.telephony_closed());
    assert_eq!(*control.ended.lock().await, vec!["CA1".to_string()]);

    let stored = done.store.transcript("CA1").await.unwrap();
    assert_eq!(stored.last().unwrap().line(), "User: That's all, goodbye.");
}

#[tokio::test]
async fn test_preassigned_call_id_used_without_call_sid() {
    let mut call = Call::start(SessionConfig::new("sk-test"), |s| s.with_call_id("CA-outbound"));
    call.connected().await;
    call.begin(json!({"event": "start", "start": {"streamSid": "S9"}})).await;
    call.realtime(transcription("Hi"));
    call.close_realtime();

    let done = call.finished().await;
    let summary = done.result.unwrap();
    assert_eq!(summary.call_id.as_deref(), Some("CA-outbound"));
    assert_eq!(summary.stream_id.as_deref(), Some("S9"));
    let stored = done.store.transcript("CA-outbound").await.unwrap();
    assert_eq!(stored[0].line(), "User: Hi");
}

#[tokio::test]
async fn test_telephony_disconnect_closes_realtime() {
    let mut call = Call::start(SessionConfig::new("sk-test"), |s| s);
    call.connected().await;
    call.begin(start_frame()).await;

    call.close_telephony();
    assert_eq!(call.to_realtime().await, Outgoing::Close);

    let mut done = call.finished().await;
    assert!(done.result.is_ok());
    assert_eq!(done.handle.phase(), SessionPhase::Closed);
    assert!(done.telephony_closed());
}

#[tokio::test]
async fn test_telephony_socket_error_closes_realtime() {
    let mut call = Call::start(SessionConfig::new("sk-test"), |s| s);
    call.connected().await;
    call.begin(start_frame()).await;

    call.telephony_raw(Err(RelayError::SocketClosed("telephony")));
    assert_eq!(call.to_realtime().await, Outgoing::Close);

    let mut done = call.finished().await;
    assert!(done.result.is_ok());
    assert_eq!(done.handle.phase(), SessionPhase::Closed);
    assert!(done.realtime_messages().is_empty());
    assert!(done.telephony_closed());
}

#[tokio::test]
async fn test_realtime_socket_error_closes_session() {
    let mut call = Call::start(SessionConfig::new("sk-test"), |s| s);
    call.connected().await;
    call.begin(start_frame()).await;

    call.realtime(transcription("Can I book for Friday?"));
    call.realtime_item(Err(RelayError::SocketClosed("realtime")));

    let mut done = call.finished().await;
    let summary = done.result.as_ref().unwrap().clone();
    assert_eq!(done.handle.phase(), SessionPhase::Closed);
    assert!(done.telephony_closed());
    assert_eq!(summary.transcript.len(), 1);
    assert_eq!(done.store.transcript("CA1").await.unwrap(), summary.transcript);
}

#[tokio::test]
async fn test_caller_hangup_during_stalled_call_control() {
    let control = Arc::new(StalledControl::default());
    let control_for_session = control.clone();
    let mut call = Call::start(SessionConfig::new("sk-test"), move |s| {
        s.with_call_control(control_for_session)
    });
    call.connected().await;
    call.begin(start_frame()).await;

    call.realtime(transcription("ok goodbye"));
    tokio::time::timeout(WAIT, control.asked.notified())
        .await
        .expect("call control was never asked to end the call");
    call.close_telephony();

    let done = call.finished().await;
    assert!(done.result.is_ok());
    assert_eq!(done.handle.phase(), SessionPhase::Closed);
    let stored = done.store.transcript("CA1").await.unwrap();
    assert_eq!(stored.last().unwrap().line(), "User: ok goodbye");
}

#[tokio::test]
async fn test_reconnected_stream_resumes_stored_transcript() {
    let store = Arc::new(InMemoryTranscriptStore::new());
    let mut earlier = Transcript::new();
    earlier.append(Speaker::Assistant, "Bella Roma, how can I help?");
    earlier.append(Speaker::User, "A table for four, please.");
    let keys = CorrelationKeys {
        call_id: "CA1".to_string(),
        stream_id: Some("S0".to_string()),
    };
    store.append_transcript(&keys, earlier.entries()).await.unwrap();

    let mut call = Call::start_with(SessionConfig::new("sk-test"), |s| s, true, store);
    call.connected().await;
    call.begin(start_frame()).await;
    call.realtime(transcription("Sorry, we got cut off."));
    call.close_realtime();

    let done = call.finished().await;
    let summary = done.result.unwrap();
    let lines: Vec<String> = summary.transcript.iter().map(|e| e.line()).collect();
    assert_eq!(
        lines,
        vec![
            "Assistant: Bella Roma, how can I help?",
            "User: A table for four, please.",
            "User: Sorry, we got cut off.",
        ]
    );
    assert_eq!(done.store.transcript("CA1").await.unwrap(), summary.transcript);
}
