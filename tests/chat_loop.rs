//! End-to-end behavior of the chat loop against a scripted transport.

mod common;

use std::sync::Arc;

use anthroshell::chat::{ChatLoop, ChatState, Colorizer, FAREWELL, ShellConfig, TurnOutcome, WriterSink};
use anthroshell::{Message, MessageRole, StreamOutcome};

use common::{HI, Reply, STOP, ScriptedLines, ScriptedTransport, delta};

fn chat(transport: &ScriptedTransport) -> ChatLoop<ScriptedTransport> {
    ChatLoop::new(Arc::new(ShellConfig::new()), transport.clone())
        .with_colorizer(Colorizer::with_color(false))
}

async fn shown(sink: &WriterSink<Vec<u8>>) -> String {
    let writer = sink.writer();
    let bytes = writer.lock().await;
    String::from_utf8_lossy(&bytes).into_owned()
}

#[tokio::test]
async fn hello_then_quit() {
    let transport = ScriptedTransport::new(vec![Reply::Body(vec![HI.to_string(), STOP.to_string()])]);
    let mut chat = chat(&transport);
    let mut lines = ScriptedLines::new(&["hello", "quit"]);
    let mut sink = WriterSink::new(Vec::new());

    chat.run(&mut lines, &mut sink).await.unwrap();

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].messages, vec![Message::user("<cmd>hello</cmd>")]);
    assert_eq!(requests[0].model, "claude-3-opus-20240229");
    assert_eq!(requests[0].system, "Assistant is in a CLI mood today.");
    assert_eq!(requests[0].max_tokens, 256);
    assert!(requests[0].stream);

    assert_eq!(shown(&sink).await, format!("hi\n{FAREWELL}\n"));
    assert_eq!(
        chat.transcript().messages(),
        &[Message::user("<cmd>hello</cmd>"), Message::assistant("hi")]
    );
    assert_eq!(lines.prompts, vec!["$> ".to_string(), "$> ".to_string()]);
    assert_eq!(chat.state(), ChatState::Exiting);
}

#[tokio::test]
async fn exit_sends_nothing() {
    let transport = ScriptedTransport::new(vec![]);
    let mut chat = chat(&transport);
    let mut sink = WriterSink::new(Vec::new());

    let outcome = chat.step("exit", &mut sink).await.unwrap();

    assert!(matches!(outcome, TurnOutcome::Exit));
    assert!(transport.requests().is_empty());
    assert!(chat.transcript().is_empty());
    assert_eq!(shown(&sink).await, format!("{FAREWELL}\n"));
}

#[tokio::test]
async fn exit_match_is_exact() {
    let transport = ScriptedTransport::new(vec![Reply::Body(vec![STOP.to_string()])]);
    let mut chat = chat(&transport);
    let mut sink = WriterSink::new(Vec::new());

    let outcome = chat.step("QUIT", &mut sink).await.unwrap();

    assert!(matches!(outcome, TurnOutcome::Answered(_)));
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn completed_turn_adds_two_messages() {
    let body = format!("{}{}{}", delta("Hello, "), delta("world"), STOP);
    let transport = ScriptedTransport::new(vec![Reply::Body(vec![body])]);
    let mut chat = chat(&transport);
    let mut sink = WriterSink::new(Vec::new());

    let before = chat.transcript().len();
    let outcome = chat.step("greet", &mut sink).await.unwrap();

    let TurnOutcome::Answered(report) = outcome else {
        panic!("expected an answered turn");
    };
    assert_eq!(report.outcome, StreamOutcome::Complete);
    assert_eq!(chat.transcript().len(), before + 2);
    let messages = chat.transcript().messages();
    assert_eq!(messages[0].role, MessageRole::User);
    assert_eq!(messages[1], Message::assistant("Hello, world"));
}

#[tokio::test]
async fn failed_turn_keeps_dangling_user_message() {
    let transport = ScriptedTransport::new(vec![
        Reply::Refuse,
        Reply::Body(vec![HI.to_string(), STOP.to_string()]),
    ]);
    let mut chat = chat(&transport);
    let mut sink = WriterSink::new(Vec::new());

    let outcome = chat.step("first", &mut sink).await.unwrap();
    assert!(matches!(outcome, TurnOutcome::Failed(_)));
    assert_eq!(chat.transcript().len(), 1);
    assert_eq!(chat.state(), ChatState::AwaitingInput);

    chat.step("second", &mut sink).await.unwrap();

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(
        requests[1].messages,
        vec![
            Message::user("<cmd>first</cmd>"),
            Message::user("<cmd>second</cmd>")
        ]
    );
    assert_eq!(chat.transcript().len(), 3);
    assert_eq!(
        shown(&sink).await,
        "Error: Connection error: connection refused\nhi\n"
    );
}

#[tokio::test]
async fn malformed_frame_does_not_stop_the_turn() {
    let body = format!("{}data: {{\"type\":\"content_block_delta\",\n{}{}", delta("a"), delta("b"), STOP);
    let transport = ScriptedTransport::new(vec![Reply::Body(vec![body])]);
    let mut chat = chat(&transport);
    let mut sink = WriterSink::new(Vec::new());

    let TurnOutcome::Answered(report) = chat.step("x", &mut sink).await.unwrap() else {
        panic!("expected an answered turn");
    };
    assert_eq!(report.stats.malformed, 1);
    assert_eq!(chat.transcript().last(), Some(&Message::assistant("ab")));
}

#[tokio::test]
async fn stream_without_stop_is_partial() {
    let transport = ScriptedTransport::new(vec![Reply::Body(vec![delta("never finished")])]);
    let mut chat = chat(&transport);
    let mut sink = WriterSink::new(Vec::new());

    let TurnOutcome::Answered(report) = chat.step("x", &mut sink).await.unwrap() else {
        panic!("expected an answered turn");
    };
    assert_eq!(
        report.outcome,
        StreamOutcome::Partial {
            discarded: "never finished".to_string()
        }
    );
    assert_eq!(chat.transcript().len(), 1);
    assert_eq!(shown(&sink).await, "");
}

#[tokio::test]
async fn read_error_mid_stream_is_reported() {
    let transport = ScriptedTransport::new(vec![
        Reply::BodyThenError(vec![delta("half")]),
        Reply::Body(vec![HI.to_string(), STOP.to_string()]),
    ]);
    let mut chat = chat(&transport);
    let mut lines = ScriptedLines::new(&["one", "two"]);
    let mut sink = WriterSink::new(Vec::new());

    chat.run(&mut lines, &mut sink).await.unwrap();

    assert_eq!(
        shown(&sink).await,
        format!("Error: Streaming error: connection reset by peer\nhi\n{FAREWELL}\n")
    );
    assert_eq!(transport.requests().len(), 2);
    assert_eq!(chat.transcript().len(), 3);
}

#[tokio::test]
async fn end_of_input_says_farewell() {
    let transport = ScriptedTransport::new(vec![]);
    let mut chat = chat(&transport);
    let mut lines = ScriptedLines::new(&[]);
    let mut sink = WriterSink::new(Vec::new());

    chat.run(&mut lines, &mut sink).await.unwrap();

    assert_eq!(shown(&sink).await, format!("{FAREWELL}\n"));
    assert!(transport.requests().is_empty());
    assert_eq!(chat.state(), ChatState::Exiting);
}

#[tokio::test]
async fn colors_are_applied_to_replies_and_errors() {
    let body = format!("{}{}", delta("try <cmd>ls</cmd>"), STOP);
    let transport = ScriptedTransport::new(vec![Reply::Body(vec![body]), Reply::Refuse]);
    let mut chat = ChatLoop::new(Arc::new(ShellConfig::new()), transport.clone());
    let mut sink = WriterSink::new(Vec::new());

    chat.step("a", &mut sink).await.unwrap();
    chat.step("b", &mut sink).await.unwrap();

    assert_eq!(
        shown(&sink).await,
        "try \x1b[36mls\x1b[0m\n\x1b[31mError: Connection error: connection refused\x1b[0m\n"
    );
}

#[tokio::test]
async fn configured_values_reach_the_request() {
    let config = ShellConfig::new()
        .with_model("claude-3-haiku-20240307")
        .with_system_prompt("Be terse.")
        .with_max_tokens(64)
        .with_shell_prompt("ai> ");
    let transport = ScriptedTransport::new(vec![Reply::Body(vec![STOP.to_string()])]);
    let mut chat = ChatLoop::new(Arc::new(config), transport.clone());
    let mut lines = ScriptedLines::new(&["hi", "exit"]);
    let mut sink = WriterSink::new(Vec::new());

    chat.run(&mut lines, &mut sink).await.unwrap();

    let request = &transport.requests()[0];
    assert_eq!(request.model, "claude-3-haiku-20240307");
    assert_eq!(request.system, "Be terse.");
    assert_eq!(request.max_tokens, 64);
    assert_eq!(lines.prompts[0], "ai> ");
    assert_eq!(chat.transcript().last(), Some(&Message::assistant("")));
}
