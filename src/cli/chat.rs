//! Interactive chat over either transport.
//!
//! Streamed text goes to stdout. When the agent asks for approval the next
//! input line is read as the answer (`y`, `n`, or `n <reason>`).

use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::approval::{
    AutoResendDecider, ConfirmationRouter, StreamToolOutput, ToolOutputSink, Transports,
    CONFIRMATION_TOOL_NAME,
};
use crate::config::AppConfig;
use crate::error::{AgentwireError, AgentwireResult, StreamError};
use crate::http_stream::HttpStreamClient;
use crate::models::{ApprovalDecision, ToolInvocation};
use crate::session::Conversation;
use crate::sse::ProtocolEvent;
use crate::stream::{ConnectionManager, PumpOutcome, SequenceItem, TurnSequence};
use crate::traits::DuplexChannel;
use crate::websocket::WsClient;

/// Parse an approval answer. `None` if the line is not one.
pub fn parse_decision(line: &str) -> Option<ApprovalDecision> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    match word.to_lowercase().as_str() {
        "y" | "yes" => Some(ApprovalDecision::approve()),
        "n" | "no" => Some(ApprovalDecision::deny(
            (!rest.is_empty()).then(|| rest.to_string()),
        )),
        _ => None,
    }
}

/// One-line description of a tool call for the approval prompt.
pub fn describe_tool(invocation: &ToolInvocation) -> String {
    if invocation.tool_name == CONFIRMATION_TOOL_NAME {
        let original = invocation
            .input
            .get("originalFunctionCall")
            .or_else(|| invocation.input.get("original_function_call"));
        if let Some(call) = original {
            let name = call.get("name").and_then(|n| n.as_str()).unwrap_or("tool");
            let args = call.get("args").cloned().unwrap_or_else(|| json!({}));
            return format!("{}({})", name, args);
        }
    }
    format!("{}({})", invocation.tool_name, invocation.input)
}

fn print_event(event: &ProtocolEvent) {
    match event {
        ProtocolEvent::TextDelta { delta, .. } => {
            print!("{}", delta);
            flush_stdout();
        }
        ProtocolEvent::TextEnd { .. } => println!(),
        ProtocolEvent::ToolOutputError { error_text, .. } => {
            eprintln!("[tool error] {}", error_text)
        }
        ProtocolEvent::Error { error_text } => eprintln!("[agent error] {}", error_text),
        _ => {}
    }
}

fn flush_stdout() {
    use std::io::Write;
    let _ = std::io::stdout().flush();
}

fn prompt_approval(invocation: &ToolInvocation) {
    print!("\nApprove {}? [y/n] ", describe_tool(invocation));
    flush_stdout();
}

fn stdin_lines() -> Lines<BufReader<Stdin>> {
    BufReader::new(tokio::io::stdin()).lines()
}

async fn next_item(
    events: &mut Option<mpsc::UnboundedReceiver<SequenceItem>>,
) -> Option<SequenceItem> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Chat session over the duplex channel.
struct WsChat {
    manager: ConnectionManager,
    channel: Arc<dyn DuplexChannel>,
    conversation: Conversation,
    decider: AutoResendDecider,
    router: ConfirmationRouter,
    events: Option<mpsc::UnboundedReceiver<SequenceItem>>,
    /// Tool call whose approval the next input line answers
    awaiting: Option<String>,
}

impl WsChat {
    fn submit(&mut self) {
        match self.manager.submit(&self.conversation.turn_request()) {
            Ok(TurnSequence::Opened { events, id }) => {
                debug!(sequence_id = id, "Reading turn from new sequence");
                self.events = Some(events);
            }
            Ok(TurnSequence::Reused { .. }) => {}
            Err(e) => eprintln!("{}", e.user_message()),
        }
    }

    fn on_line(&mut self, line: &str) -> bool {
        if let Some(tool_call_id) = self.awaiting.clone() {
            match parse_decision(line) {
                Some(decision) => {
                    self.awaiting = None;
                    self.on_decision(&tool_call_id, decision);
                    self.prompt_next_approval();
                }
                None => print!("Please answer y or n: "),
            }
            flush_stdout();
            return true;
        }

        match line.trim() {
            "" => {}
            "/quit" | "/exit" => return false,
            "/stop" => {
                self.manager.interrupt(Some("user cancelled"));
                self.events = None;
            }
            text => {
                self.conversation.push_user_text(text);
                self.submit();
            }
        }
        true
    }

    fn on_decision(&mut self, tool_call_id: &str, decision: ApprovalDecision) {
        let Some(invocation) = self
            .conversation
            .last_message()
            .and_then(|m| m.tool_invocation(tool_call_id))
            .cloned()
        else {
            warn!(tool_call_id, "Approval target disappeared");
            return;
        };

        if let Err(e) = self.conversation.respond_to_approval(tool_call_id, &decision) {
            eprintln!("{}", e);
            return;
        }

        if invocation.tool_name == CONFIRMATION_TOOL_NAME {
            let outcome =
                self.router
                    .route(&invocation, &decision, Transports::duplex(&self.channel));
            if let Some(err) = outcome.error {
                eprintln!("{}", AgentwireError::from(err).user_message());
                return;
            }
            // The router already delivered this answer.
            self.decider.mark_sent(self.conversation.messages());
            return;
        }

        self.maybe_resend();
    }

    fn maybe_resend(&mut self) {
        if self.decider.decide(self.conversation.messages()) {
            info!("Resending conversation");
            self.submit();
        }
    }

    fn prompt_next_approval(&mut self) {
        if self.awaiting.is_some() {
            return;
        }
        let next = self
            .conversation
            .pending_approvals()
            .first()
            .map(|inv| (*inv).clone());
        if let Some(invocation) = next {
            prompt_approval(&invocation);
            self.awaiting = Some(invocation.tool_call_id);
        }
    }

    fn on_item(&mut self, item: Option<SequenceItem>) {
        match item {
            Some(Ok(event)) => {
                self.conversation.apply(&event);
                print_event(&event);
                match event {
                    ProtocolEvent::ToolApprovalRequest { .. } => self.prompt_next_approval(),
                    ProtocolEvent::Finish | ProtocolEvent::Done => self.maybe_resend(),
                    _ => {}
                }
            }
            Some(Err(e)) => {
                eprintln!("\n{}", e.user_message());
                self.awaiting = None;
                self.events = None;
            }
            None => self.events = None,
        }
    }
}

/// Run an interactive chat over the WebSocket transport.
pub async fn run_ws_chat(config: &AppConfig) -> AgentwireResult<()> {
    let mut client = WsClient::connect(config.ws_client_config()).await?;
    let ws_channel = client.channel();
    ws_channel.wait_open().await?;

    let channel: Arc<dyn DuplexChannel> = Arc::new(ws_channel);
    let mut chat = WsChat {
        manager: ConnectionManager::new(channel.clone(), config.manager_config()),
        channel,
        conversation: Conversation::new(uuid::Uuid::new_v4().to_string()),
        decider: AutoResendDecider::new(),
        router: ConfirmationRouter::new(),
        events: None,
        awaiting: None,
    };
    let mut lines = stdin_lines();

    println!("Connected to {}. Type a message, /stop to interrupt, /quit to exit.", config.ws_url);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if !chat.on_line(&line) {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
            item = next_item(&mut chat.events) => chat.on_item(item),
            outcome = chat.manager.pump(client.incoming_receiver()) => {
                match outcome {
                    PumpOutcome::TimedOut(err) => {
                        eprintln!("\n{}", err.user_message());
                        chat.awaiting = None;
                    }
                    PumpOutcome::Disconnected => {
                        return Err(StreamError::ConnectionLost {
                            message: "server closed the connection".to_string(),
                        }
                        .into());
                    }
                    PumpOutcome::KeepaliveSent(false) => {
                        debug!("Keepalive skipped, channel not open")
                    }
                    PumpOutcome::Ingested(_) | PumpOutcome::KeepaliveSent(true) => {}
                }
            }
        }
    }

    client.shutdown();
    Ok(())
}

/// Run an interactive chat over the HTTP event-stream transport.
pub async fn run_http_chat(config: &AppConfig) -> AgentwireResult<()> {
    let client =
        HttpStreamClient::with_connect_timeout(config.http_url.clone(), config.connect_timeout())?;
    let conversation = Arc::new(Mutex::new(Conversation::new(
        uuid::Uuid::new_v4().to_string(),
    )));
    let mut decider = AutoResendDecider::new();
    let router = ConfirmationRouter::new();
    let mut lines = stdin_lines();

    let sink_conversation = conversation.clone();
    let sink: Arc<ToolOutputSink> = Arc::new(move |output: StreamToolOutput| -> Result<(), String> {
        sink_conversation
            .lock()
            .map_err(|_| "conversation lock poisoned".to_string())?
            .add_tool_output(&output.tool_call_id, output.output)
            .map_err(|e| e.to_string())
    });

    println!("Streaming from {}. Type a message, /quit to exit.", config.http_url);

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read stdin: {}", e);
                break;
            }
        };
        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            text => {
                lock(&conversation).push_user_text(text);
            }
        }

        loop {
            let request = lock(&conversation).turn_request();
            let mut events = match client.stream_turn(&request).await {
                Ok(events) => events,
                Err(e) => {
                    eprintln!("{}", AgentwireError::from(e).user_message());
                    break;
                }
            };

            while let Some(item) = events.next().await {
                match item {
                    Ok(event) => {
                        lock(&conversation).apply(&event);
                        print_event(&event);
                    }
                    Err(e) => {
                        eprintln!("\n{}", AgentwireError::from(e).user_message());
                        break;
                    }
                }
            }

            let pending: Vec<ToolInvocation> = lock(&conversation)
                .pending_approvals()
                .into_iter()
                .cloned()
                .collect();
            for invocation in pending {
                let decision = loop {
                    prompt_approval(&invocation);
                    match lines.next_line().await {
                        Ok(Some(answer)) => {
                            if let Some(decision) = parse_decision(&answer) {
                                break decision;
                            }
                        }
                        _ => return Ok(()),
                    }
                };

                if invocation.tool_name == CONFIRMATION_TOOL_NAME {
                    let outcome = router.route(&invocation, &decision, Transports::stream(&sink));
                    if let Some(err) = outcome.error {
                        eprintln!("{}", AgentwireError::from(err).user_message());
                    }
                } else if let Err(e) =
                    lock(&conversation).respond_to_approval(&invocation.tool_call_id, &decision)
                {
                    eprintln!("{}", e);
                }
            }

            let resend = decider.decide(lock(&conversation).messages());
            if !resend {
                break;
            }
            info!("Resending conversation");
        }
    }

    Ok(())
}

fn lock(conversation: &Mutex<Conversation>) -> std::sync::MutexGuard<'_, Conversation> {
    conversation.lock().unwrap_or_else(|e| e.into_inner())
}
