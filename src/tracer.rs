use serde::Serialize;

use crate::{
    common::{Address, Hex, Word},
    frame::CallKind,
};

#[derive(Debug, Clone, Serialize)]
pub enum EventData {
    CallEnter {
        kind: CallKind,
        from: Address,
        to: Address,
        value: Word,
        gas: u64,
    },
    CallExit {
        success: bool,
        gas_remaining: u64,
        output: Hex,
    },
    Step {
        pc: usize,
        opcode: u8,
        name: &'static str,
        gas_cost: u64,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub depth: usize,
    pub data: EventData,
}

/// Observer of the interpreter's progress. The default implementation drops
/// everything; tracing never affects execution or gas.
#[allow(unused_variables)] // default impl ignores all arguments
pub trait EventTracer {
    fn push(&mut self, event: Event) {}
    fn take(&mut self) -> Vec<Event> {
        vec![]
    }
}

#[derive(Default)]
pub struct NoopTracer;

impl EventTracer for NoopTracer {}

/// Buffers every event for later inspection.
#[derive(Default)]
pub struct CollectingTracer {
    events: Vec<Event>,
}

impl EventTracer for CollectingTracer {
    fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    fn take(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }
}

/// Emits each event as a structured debug line.
#[cfg(feature = "tracing")]
#[derive(Default)]
pub struct LoggingTracer;

#[cfg(feature = "tracing")]
impl EventTracer for LoggingTracer {
    fn push(&mut self, event: Event) {
        match serde_json::to_string(&event) {
            Ok(json) => tracing::debug!(target: "ferrite::trace", "{json}"),
            Err(error) => tracing::warn!(target: "ferrite::trace", "unserializable event: {error}"),
        }
    }
}
