//! Audit queue — non-blocking event logging decoupled from the Control hot
//! path.
//!
//! Grounded on the teacher's `adaptive_engine::audit` module: a lock-free
//! `ArrayQueue` sized for a worst-case burst, with an explicit `Full` result
//! rather than a silent drop, so a caller can decide whether a saturated
//! queue should halt the pipeline. Event types are renamed for this domain's
//! decision points (Shield veto, Risk abstain, adapter apply/rollback, probe
//! admission) instead of the teacher's proposal/rollback vocabulary.

use std::io::Write;
use std::sync::Arc;

use crossbeam_queue::ArrayQueue;

#[derive(Clone, Debug, PartialEq)]
pub enum EventType {
    ShieldVeto,
    RiskAbstain,
    AdapterApply,
    AdapterRollback,
    ProbeStart,
    ProbeExpire,
    EventPackAssembled,
}

/// Structured audit event. `t` is the trigger time in the producing band's
/// clock, not wall-clock time.
#[derive(Clone, Debug)]
pub struct AuditEvent {
    pub event_type: EventType,
    pub t: f64,
    pub payload: String,
}

impl AuditEvent {
    pub fn new(event_type: EventType, t: f64) -> Self {
        Self {
            event_type,
            t,
            payload: String::new(),
        }
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into();
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum EnqueueResult {
    Ok,
    HighWaterMark,
    Full,
}

/// Lock-free, bounded audit queue. `enqueue` never blocks; a full queue
/// returns `Full` rather than silently dropping the event, leaving the
/// decision of what to do about backpressure to the caller.
pub struct AuditQueue {
    queue: Arc<ArrayQueue<AuditEvent>>,
    capacity: usize,
    high_water_mark: usize,
}

impl AuditQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Arc::new(ArrayQueue::new(capacity)),
            capacity,
            high_water_mark: (capacity * 80) / 100,
        }
    }

    pub fn enqueue(&self, event: AuditEvent) -> EnqueueResult {
        match self.queue.push(event) {
            Ok(()) => {
                if self.queue.len() >= self.high_water_mark {
                    EnqueueResult::HighWaterMark
                } else {
                    EnqueueResult::Ok
                }
            }
            Err(_) => EnqueueResult::Full,
        }
    }

    pub fn drain(&self) -> Vec<AuditEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.queue.pop() {
            events.push(event);
        }
        events
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Decouples the queue from wherever events end up. `JsonlFileSink` is the
/// only provided implementation; a caller wanting structured stdout instead
/// should drain the queue through `tracing` directly.
pub trait AuditSink {
    fn write_events(&mut self, events: &[AuditEvent]) -> std::io::Result<()>;
}

fn event_type_tag(event_type: &EventType) -> &'static str {
    match event_type {
        EventType::ShieldVeto => "shield_veto",
        EventType::RiskAbstain => "risk_abstain",
        EventType::AdapterApply => "adapter_apply",
        EventType::AdapterRollback => "adapter_rollback",
        EventType::ProbeStart => "probe_start",
        EventType::ProbeExpire => "probe_expire",
        EventType::EventPackAssembled => "event_pack_assembled",
    }
}

/// Appends one JSON object per line per event. Intended to be drained from a
/// background thread, never from the Control tick itself.
pub struct JsonlFileSink {
    file: std::fs::File,
}

impl JsonlFileSink {
    pub fn create(path: &std::path::Path) -> std::io::Result<Self> {
        Ok(Self {
            file: std::fs::File::create(path)?,
        })
    }
}

impl AuditSink for JsonlFileSink {
    fn write_events(&mut self, events: &[AuditEvent]) -> std::io::Result<()> {
        for event in events {
            let line = serde_json::json!({
                "event_type": event_type_tag(&event.event_type),
                "t": event.t,
                "payload": event.payload,
            });
            writeln!(self.file, "{line}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_and_drain_preserve_order() {
        let queue = AuditQueue::new(10);
        queue.enqueue(AuditEvent::new(EventType::ShieldVeto, 1.0));
        queue.enqueue(AuditEvent::new(EventType::RiskAbstain, 2.0));

        let events = queue.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventType::ShieldVeto);
        assert!(queue.is_empty());
    }

    #[test]
    fn full_queue_reports_full_not_silent_drop() {
        let queue = AuditQueue::new(2);
        queue.enqueue(AuditEvent::new(EventType::ProbeStart, 0.0));
        queue.enqueue(AuditEvent::new(EventType::ProbeStart, 0.1));

        let result = queue.enqueue(AuditEvent::new(EventType::ProbeStart, 0.2));
        assert_eq!(result, EnqueueResult::Full);
    }

    #[test]
    fn high_water_mark_fires_at_80_percent() {
        let queue = AuditQueue::new(10);
        for i in 0..7 {
            queue.enqueue(AuditEvent::new(EventType::AdapterApply, i as f64));
        }
        let result = queue.enqueue(AuditEvent::new(EventType::AdapterApply, 8.0));
        assert_eq!(result, EnqueueResult::HighWaterMark);
    }

    #[test]
    fn jsonl_sink_writes_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let mut sink = JsonlFileSink::create(&path).unwrap();

        let queue = AuditQueue::new(10);
        queue.enqueue(AuditEvent::new(EventType::ShieldVeto, 1.0).with_payload("v_cap>0.25"));
        queue.enqueue(AuditEvent::new(EventType::AdapterRollback, 2.0));

        sink.write_events(&queue.drain()).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.contains("shield_veto"));
        assert!(contents.contains("v_cap>0.25"));
    }
}
