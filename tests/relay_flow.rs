//! Relay Flow Tests
//!
//! Drives `CallRelay::run` the way the WebSocket handler does, with channels
//! standing in for the socket and test doubles standing in for the language
//! model. Covers ordering, interrupts, failures and teardown.

mod fixtures;

use std::time::Duration;

use futures::channel::mpsc as inbound_mpsc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use fixtures::*;
use voice_relay_gateway::handlers::relay::{CallRelay, MessageRoute, OutgoingMessage};
use voice_relay_gateway::{BoxedCompletion, SessionStore, Turn};

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

struct Call {
    inbound: inbound_mpsc::UnboundedSender<String>,
    outbound: mpsc::Receiver<MessageRoute>,
    task: JoinHandle<()>,
}

impl Call {
    fn start(sessions: &SessionStore, provider: BoxedCompletion, shutdown: CancellationToken) -> Self {
        let (in_tx, in_rx) = inbound_mpsc::unbounded();
        let (out_tx, out_rx) = mpsc::channel(64);
        let relay = CallRelay::new(sessions.clone(), provider, TEST_SYSTEM_PROMPT, out_tx);
        let task = tokio::spawn(relay.run(in_rx, shutdown));
        Self {
            inbound: in_tx,
            outbound: out_rx,
            task,
        }
    }

    fn send(&self, raw: String) {
        self.inbound
            .unbounded_send(raw)
            .expect("relay should still be reading");
    }

    async fn recv(&mut self) -> MessageRoute {
        timeout(RECV_TIMEOUT, self.outbound.recv())
            .await
            .expect("Timed out waiting for outbound message")
            .expect("Outbound channel closed")
    }

    async fn recv_text(&mut self) -> (String, bool) {
        match self.recv().await {
            MessageRoute::Outgoing(OutgoingMessage::Text { token, last }) => (token, last),
            other => panic!("Expected text message, got {other:?}"),
        }
    }

    /// Collect tokens up to and including the `last: true` terminator.
    async fn recv_reply(&mut self) -> Vec<(String, bool)> {
        let mut reply = Vec::new();
        loop {
            let (token, last) = self.recv_text().await;
            reply.push((token, last));
            if last {
                return reply;
            }
        }
    }

    async fn hang_up(self) {
        drop(self.inbound);
        timeout(RECV_TIMEOUT, self.task)
            .await
            .expect("Relay did not stop after disconnect")
            .expect("Relay task panicked");
    }
}

fn text(token: &str, last: bool) -> (String, bool) {
    (token.to_string(), last)
}

#[tokio::test]
async fn test_prompt_reply_round_trip() {
    let sessions = SessionStore::new();
    let provider = ScriptedCompletion::new(vec![vec![Step::Delta("Hi"), Step::Delta(" there")]]);
    let mut call = Call::start(&sessions, provider.clone(), CancellationToken::new());

    call.send(setup_json("CA100"));
    call.send(prompt_json("Hello?"));

    assert_eq!(
        call.recv_reply().await,
        vec![text("Hi", false), text(" there", false), text("", true)]
    );
    assert_eq!(
        sessions.snapshot("CA100").unwrap(),
        vec![
            Turn::system(TEST_SYSTEM_PROMPT),
            Turn::user("Hello?"),
            Turn::assistant("Hi there"),
        ]
    );
    assert_eq!(provider.transcripts().len(), 1);

    call.hang_up().await;
    assert!(!sessions.contains("CA100"));
}

#[tokio::test]
async fn test_each_prompt_adds_one_user_and_one_assistant_turn() {
    let sessions = SessionStore::new();
    let mut call = Call::start(&sessions, std::sync::Arc::new(EchoCompletion), CancellationToken::new());

    call.send(setup_json("CA101"));
    for question in ["one", "two", "three"] {
        call.send(prompt_json(question));
    }
    for question in ["one", "two", "three"] {
        assert_eq!(
            call.recv_reply().await,
            vec![text("echo: ", false), text(question, false), text("", true)]
        );
    }

    let turns = sessions.snapshot("CA101").unwrap();
    assert_eq!(turns.len(), 7);
    assert_eq!(turns[5], Turn::user("three"));
    assert_eq!(turns[6], Turn::assistant("echo: three"));

    call.hang_up().await;
}

#[tokio::test]
async fn test_interrupt_mid_stream_commits_heard_prefix() {
    let sessions = SessionStore::new();
    let provider = GatedCompletion::new();
    let gate = provider.gate();
    let mut call = Call::start(&sessions, provider.clone(), CancellationToken::new());

    call.send(setup_json("CA102"));
    call.send(prompt_json("Tell me something"));

    gate.unbounded_send(Ok("hello".to_string())).unwrap();
    assert_eq!(call.recv_text().await, text("hello", false));

    call.send(interrupt_json("hello"));
    gate.unbounded_send(Ok(" world".to_string())).unwrap();
    drop(gate);

    assert_eq!(
        call.recv_reply().await,
        vec![text(" world", false), text("", true)]
    );
    let turns = sessions.snapshot("CA102").unwrap();
    assert_eq!(turns.len(), 3);
    assert_eq!(turns[2], Turn::assistant("hello"));

    call.hang_up().await;
}

#[tokio::test]
async fn test_interrupt_after_reply_truncates_committed_turn() {
    let sessions = SessionStore::new();
    let provider = ScriptedCompletion::new(vec![vec![Step::Delta("hello world")]]);
    let mut call = Call::start(&sessions, provider, CancellationToken::new());

    call.send(setup_json("CA103"));
    call.send(prompt_json("Greet me"));
    call.recv_reply().await;

    call.send(interrupt_json("hello"));
    // Dropped without touching the transcript
    call.send("{}".to_string());
    call.send(prompt_json("again"));
    call.recv_reply().await;

    let turns = sessions.snapshot("CA103").unwrap();
    assert_eq!(turns[2], Turn::assistant("hello"));
    assert_eq!(turns[3], Turn::user("again"));

    call.hang_up().await;
}

#[tokio::test]
async fn test_disconnect_mid_stream_removes_session() {
    let sessions = SessionStore::new();
    let provider = GatedCompletion::new();
    let gate = provider.gate();
    let mut call = Call::start(&sessions, provider.clone(), CancellationToken::new());

    call.send(setup_json("CA104"));
    call.send(prompt_json("Tell me a long story"));
    gate.unbounded_send(Ok("Once".to_string())).unwrap();
    assert_eq!(call.recv_text().await, text("Once", false));

    call.hang_up().await;
    assert!(!sessions.contains("CA104"));

    // The stream was dropped with the relay, so nothing can commit late
    assert!(gate.unbounded_send(Ok(" upon a time".to_string())).is_err());
    assert!(sessions.is_empty());
}

#[tokio::test]
async fn test_shutdown_closes_relay_and_removes_session() {
    let sessions = SessionStore::new();
    let provider = GatedCompletion::new();
    let _gate = provider.gate();
    let shutdown = CancellationToken::new();
    let mut call = Call::start(&sessions, provider.clone(), shutdown.child_token());

    call.send(setup_json("CA105"));
    call.send(prompt_json("Are you there?"));

    // Wait until the relay has picked up the setup
    timeout(RECV_TIMEOUT, async {
        while !sessions.contains("CA105") {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("setup was never applied");

    shutdown.cancel();

    assert_eq!(call.recv().await, MessageRoute::Close);
    timeout(RECV_TIMEOUT, call.task)
        .await
        .expect("Relay did not stop on shutdown")
        .unwrap();
    assert!(!sessions.contains("CA105"));
}

#[tokio::test]
async fn test_adapter_failure_keeps_connection_usable() {
    let sessions = SessionStore::new();
    let provider = ScriptedCompletion::new(vec![
        vec![Step::Delta("Hi"), Step::Fail("upstream reset")],
        vec![Step::Delta("Back again")],
    ]);
    let mut call = Call::start(&sessions, provider, CancellationToken::new());

    call.send(setup_json("CA106"));
    call.send(prompt_json("first"));
    assert_eq!(
        call.recv_reply().await,
        vec![text("Hi", false), text("", true)]
    );

    call.send(prompt_json("second"));
    assert_eq!(
        call.recv_reply().await,
        vec![text("Back again", false), text("", true)]
    );

    let turns = sessions.snapshot("CA106").unwrap();
    assert_eq!(turns[2], Turn::assistant("Hi"));
    assert_eq!(turns[4], Turn::assistant("Back again"));

    call.hang_up().await;
}

#[tokio::test]
async fn test_garbage_before_setup_is_ignored() {
    let sessions = SessionStore::new();
    let provider = ScriptedCompletion::new(vec![vec![Step::Delta("ok")]]);
    let mut call = Call::start(&sessions, provider.clone(), CancellationToken::new());

    call.send("not json at all".to_string());
    call.send(r#"{"type":"dtmf","digit":"3"}"#.to_string());
    call.send(prompt_json("too early"));
    call.send(setup_json("CA107"));
    call.send(prompt_json("now"));

    assert_eq!(
        call.recv_reply().await,
        vec![text("ok", false), text("", true)]
    );
    assert_eq!(
        provider.transcripts(),
        vec![vec![Turn::system(TEST_SYSTEM_PROMPT), Turn::user("now")]]
    );

    call.hang_up().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_calls_are_isolated() {
    let sessions = SessionStore::new();
    let mut calls = Vec::new();
    for i in 0..8 {
        let call = Call::start(&sessions, std::sync::Arc::new(EchoCompletion), CancellationToken::new());
        call.send(setup_json(&format!("CA2{i:02}")));
        call.send(prompt_json(&format!("caller {i}")));
        calls.push(call);
    }

    for (i, call) in calls.iter_mut().enumerate() {
        let reply = call.recv_reply().await;
        assert_eq!(reply[1], text(&format!("caller {i}"), false));
    }
    assert_eq!(sessions.len(), 8);

    for (i, call) in calls.into_iter().enumerate() {
        let call_sid = format!("CA2{i:02}");
        assert_eq!(
            sessions.snapshot(&call_sid).unwrap().last(),
            Some(&Turn::assistant(format!("echo: caller {i}")))
        );
        call.hang_up().await;
        assert!(!sessions.contains(&call_sid));
    }
    assert!(sessions.is_empty());
}
