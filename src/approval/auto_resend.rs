//! Decides whether the conversation must be resent to the backend.
//!
//! The decision looks only at the last message. It returns `true` when the
//! assistant message has reached a state the backend needs to see (tool
//! outputs are ready, or every pending approval has been answered) and no
//! identical resend has already happened. The ledger of past resends is what
//! keeps an unchanged history from triggering an endless resend loop.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::models::{Message, PartError, Role, ToolInvocation, ToolState};

/// What a ledger entry was recorded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum LedgerKind {
    /// Resend after approvals were answered
    Approvals,
    /// Resend after tool outputs became available
    Outputs,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LedgerKey {
    message_id: String,
    kind: LedgerKind,
    /// Sorted
    tool_call_ids: Vec<String>,
}

impl LedgerKey {
    fn new<'a>(
        message_id: &str,
        kind: LedgerKind,
        invocations: impl Iterator<Item = &'a ToolInvocation>,
    ) -> Self {
        let mut tool_call_ids: Vec<String> =
            invocations.map(|inv| inv.tool_call_id.clone()).collect();
        tool_call_ids.sort();
        Self {
            message_id: message_id.to_string(),
            kind,
            tool_call_ids,
        }
    }
}

/// Failures while inspecting history. These never escape `decide`.
#[derive(Debug)]
enum DecisionError {
    DuplicateToolCallId {
        message_id: String,
        tool_call_id: String,
    },
    InvalidPart(PartError),
    Malformed(String),
}

impl std::fmt::Display for DecisionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecisionError::DuplicateToolCallId {
                message_id,
                tool_call_id,
            } => write!(
                f,
                "message {} has duplicate toolCallId {}",
                message_id, tool_call_id
            ),
            DecisionError::InvalidPart(err) => write!(f, "{}", err),
            DecisionError::Malformed(msg) => write!(f, "malformed history: {}", msg),
        }
    }
}

impl From<PartError> for DecisionError {
    fn from(err: PartError) -> Self {
        DecisionError::InvalidPart(err)
    }
}

/// Stateful wrapper around the resend decision, owning the loop-guard ledger.
///
/// One decider per conversation; the ledger lives as long as the session.
#[derive(Debug, Default)]
pub struct AutoResendDecider {
    ledger: HashSet<LedgerKey>,
}

impl AutoResendDecider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `history` should be resent now.
    ///
    /// Never fails: any problem with the history yields `false`.
    pub fn decide(&mut self, history: &[Message]) -> bool {
        match self.evaluate(history) {
            Ok(resend) => resend,
            Err(e) => {
                warn!("Auto-resend check failed, not resending: {}", e);
                false
            }
        }
    }

    /// Same as [`decide`](Self::decide) for a JSON-encoded message list.
    pub fn decide_json(&mut self, history: &str) -> bool {
        match serde_json::from_str::<Vec<Message>>(history) {
            Ok(messages) => self.decide(&messages),
            Err(e) => {
                warn!(
                    "Auto-resend check failed, not resending: {}",
                    DecisionError::Malformed(e.to_string())
                );
                false
            }
        }
    }

    /// Number of recorded resends.
    pub fn ledger_len(&self) -> usize {
        self.ledger.len()
    }

    pub fn reset(&mut self) {
        self.ledger.clear();
    }

    /// Forget every entry for one message.
    pub fn prune_message(&mut self, message_id: &str) {
        let before = self.ledger.len();
        self.ledger.retain(|key| key.message_id != message_id);
        let removed = before - self.ledger.len();
        if removed > 0 {
            debug!(message_id, removed, "Pruned resend ledger");
        }
    }

    fn evaluate(&mut self, history: &[Message]) -> Result<bool, DecisionError> {
        let last = match history.last() {
            Some(message) if message.role == Role::Assistant => message,
            _ => return Ok(false),
        };

        let mut seen = HashSet::new();
        for invocation in last.tool_invocations() {
            invocation.validate()?;
            if !seen.insert(invocation.tool_call_id.as_str()) {
                return Err(DecisionError::DuplicateToolCallId {
                    message_id: last.id.clone(),
                    tool_call_id: invocation.tool_call_id.clone(),
                });
            }
        }

        // The assistant has answered in text; the cycle for this message is over.
        if last.has_text() {
            self.prune_message(&last.id);
            return Ok(false);
        }

        if last
            .tool_invocations()
            .any(|inv| inv.state == ToolState::ApprovalRequested)
        {
            return Ok(false);
        }

        let (outputs_key, approvals_key) = ledger_keys(last);
        if outputs_key.is_none() && approvals_key.is_none() {
            return Ok(false);
        }

        // Either kind of progress on the message is enough; a new approval
        // after an output was already resent still goes out.
        let mut resend = false;
        if let Some(key) = outputs_key {
            resend |= self.record(key);
        }
        if let Some(key) = approvals_key {
            if self.ledger.contains(&key) {
                debug!(message_id = %last.id, "Approvals already resent");
            } else if last.tool_invocations().any(ToolInvocation::has_error) {
                debug!(message_id = %last.id, "Tool failed, not resending approvals");
            } else {
                resend |= self.record(key);
            }
        }
        Ok(resend)
    }

    /// Record the last message's current outputs and answered approvals as
    /// already delivered, without deciding anything.
    ///
    /// Used when the answer reached the backend some other way, so the
    /// unchanged history is not resent on top of it.
    pub fn mark_sent(&mut self, history: &[Message]) {
        let Some(last) = history.last().filter(|m| m.role == Role::Assistant) else {
            return;
        };
        let (outputs_key, approvals_key) = ledger_keys(last);
        for key in outputs_key.into_iter().chain(approvals_key) {
            self.record(key);
        }
    }

    /// Record a resend; `false` if the same key was already recorded.
    fn record(&mut self, key: LedgerKey) -> bool {
        if self.ledger.contains(&key) {
            debug!(message_id = %key.message_id, kind = ?key.kind, "Resend already recorded");
            return false;
        }
        debug!(
            message_id = %key.message_id,
            kind = ?key.kind,
            tool_call_ids = ?key.tool_call_ids,
            "Recording resend"
        );
        self.ledger.insert(key);
        true
    }
}

/// Ledger keys for the outputs and the answered approvals of `message`,
/// `None` where the message has none of that kind.
fn ledger_keys(message: &Message) -> (Option<LedgerKey>, Option<LedgerKey>) {
    let outputs = message
        .tool_invocations()
        .any(ToolInvocation::has_output)
        .then(|| {
            LedgerKey::new(
                &message.id,
                LedgerKind::Outputs,
                message.tool_invocations().filter(|inv| inv.has_output()),
            )
        });
    let responded = |inv: &&ToolInvocation| inv.state == ToolState::ApprovalResponded;
    let approvals = message
        .tool_invocations()
        .any(|inv| responded(&inv))
        .then(|| {
            LedgerKey::new(
                &message.id,
                LedgerKind::Approvals,
                message.tool_invocations().filter(responded),
            )
        });
    (outputs, approvals)
}
