//! Inbound stream handling.
//!
//! - `receiver` - approval/turn state machine over decoded events
//! - `manager` - owns the duplex channel, inbound sequences and the
//!   approval response deadline

pub mod manager;
pub mod receiver;

pub use manager::{ConnectionManager, ManagerConfig, PumpOutcome, SequenceItem, TurnSequence};
pub use receiver::{
    ApprovalRequest, ApprovalRequestedCallback, ApprovalStreamClosedCallback, EventReceiver,
    ReceiverSignal, ReceiverState,
};
