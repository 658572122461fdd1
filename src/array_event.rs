//! Array event bank: one record per reporting telescope plus the array trigger.

use crate::array_trigger::{ArrayTriggerRecord, ARRAY_TRIGGER_NODE};
use crate::config_mask::ConfigMask;
use crate::error::{Diagnostic, Result, ResultExt};
use crate::event::EventRecord;
use crate::wire::{ByteReader, WriteLeExt};

/// Telescope records an array event can hold; node 255 is reserved.
pub const MAX_EVENTS: usize = ARRAY_TRIGGER_NODE as usize - 1;

const HAS_RUN: u8 = 1;
const HAS_TRIGGER: u8 = 2;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArrayEvent {
    run_number: Option<u32>,
    events: Vec<EventRecord>,
    trigger: Option<ArrayTriggerRecord>,
}

impl ArrayEvent {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_number(&self) -> Option<u32> {
        self.run_number
    }

    pub fn set_run_number(&mut self, run: u32) {
        self.run_number = Some(run);
    }

    /// Event number of the trigger if present, else of the first record.
    pub fn event_number(&self) -> Option<u32> {
        self.trigger
            .as_ref()
            .map(ArrayTriggerRecord::event_number)
            .or_else(|| self.events.first().map(EventRecord::event_number))
    }

    pub fn num_events(&self) -> usize {
        self.events.len()
    }

    /// Add a telescope record. A record already present for the same node is
    /// replaced and returned.
    pub fn add_event(&mut self, event: EventRecord) -> Result<Option<EventRecord>> {
        if event.node_number() == ARRAY_TRIGGER_NODE {
            return Err(Diagnostic::usage(format!(
                "node {ARRAY_TRIGGER_NODE} is reserved for the array trigger"
            )));
        }
        if let Some(slot) = self
            .events
            .iter_mut()
            .find(|e| e.node_number() == event.node_number())
        {
            return Ok(Some(std::mem::replace(slot, event)));
        }
        if self.events.len() >= MAX_EVENTS {
            return Err(Diagnostic::usage(format!(
                "array event already holds {MAX_EVENTS} telescope records"
            )));
        }
        self.events.push(event);
        Ok(None)
    }

    /// Record reported by telescope `node`, `None` if it did not report.
    pub fn event_by_node_number(&self, node: u8) -> Option<&EventRecord> {
        self.events.iter().find(|e| e.node_number() == node)
    }

    pub fn event_by_node_number_mut(&mut self, node: u8) -> Option<&mut EventRecord> {
        self.events.iter_mut().find(|e| e.node_number() == node)
    }

    pub fn remove_event(&mut self, node: u8) -> Option<EventRecord> {
        let at = self.events.iter().position(|e| e.node_number() == node)?;
        Some(self.events.remove(at))
    }

    pub fn events(&self) -> impl Iterator<Item = &EventRecord> {
        self.events.iter()
    }

    #[track_caller]
    pub fn event_at(&self, index: usize) -> Result<&EventRecord> {
        Diagnostic::check_index("event", index, self.events.len())?;
        Ok(&self.events[index])
    }

    pub fn has_trigger(&self) -> bool {
        self.trigger.is_some()
    }

    #[track_caller]
    pub fn trigger(&self) -> Result<&ArrayTriggerRecord> {
        self.trigger
            .as_ref()
            .ok_or_else(|| Diagnostic::bank_not_present("array event has no array trigger"))
    }

    #[track_caller]
    pub fn trigger_mut(&mut self) -> Result<&mut ArrayTriggerRecord> {
        self.trigger
            .as_mut()
            .ok_or_else(|| Diagnostic::bank_not_present("array event has no array trigger"))
    }

    /// Install the trigger, returning the one it replaces.
    pub fn set_trigger(&mut self, trigger: ArrayTriggerRecord) -> Option<ArrayTriggerRecord> {
        self.trigger.replace(trigger)
    }

    pub fn take_trigger(&mut self) -> Option<ArrayTriggerRecord> {
        self.trigger.take()
    }

    /// Telescopes the array trigger says took part.
    pub fn expected_telescopes(&self) -> ConfigMask {
        self.trigger
            .iter()
            .flat_map(|t| t.trigger_telescopes().iter().map(|&id| id as usize))
            .collect()
    }

    /// Telescopes that delivered a record.
    pub fn present_telescopes(&self) -> ConfigMask {
        self.events.iter().map(|e| usize::from(e.node_number())).collect()
    }

    /// A trigger is present and exactly the triggered telescopes reported.
    pub fn is_sane(&self) -> bool {
        self.trigger.is_some() && self.expected_telescopes() == self.present_telescopes()
    }

    pub(crate) fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        let mut presence = 0;
        if self.run_number.is_some() {
            presence |= HAS_RUN;
        }
        if self.trigger.is_some() {
            presence |= HAS_TRIGGER;
        }
        out.put_u8(presence);
        out.put_u32_le(self.run_number.unwrap_or_default());
        // Bounded by MAX_EVENTS in add_event.
        out.put_u8(self.events.len() as u8);

        for event in &self.events {
            let start = out.len();
            out.put_u32_le(0);
            event
                .encode_into(out)
                .with_comment(|| format!("while encoding telescope {}", event.node_number()))?;
            let len = u32::try_from(out.len() - start - 4).map_err(|_| {
                Diagnostic::usage(format!(
                    "telescope {} record exceeds 4 GiB",
                    event.node_number()
                ))
            })?;
            out[start..start + 4].copy_from_slice(&len.to_le_bytes());
        }
        if let Some(trigger) = &self.trigger {
            trigger.encode_into(out).comment("while encoding array trigger")?;
        }
        Ok(())
    }

    pub(crate) fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        let presence = r.u8()?;
        let run = r.u32_le()?;
        let num_events = usize::from(r.u8()?);
        if num_events > MAX_EVENTS {
            return Err(Diagnostic::corruption(format!(
                "array event claims {num_events} telescope records"
            )));
        }
        let mut ev = Self {
            run_number: (presence & HAS_RUN != 0).then_some(run),
            events: Vec::with_capacity(num_events),
            trigger: None,
        };
        for i in 0..num_events {
            let len = r.u32_le()? as usize;
            let record = EventRecord::decode_exact(r.take(len)?)
                .with_comment(|| format!("while decoding telescope record {i}"))?;
            if record.node_number() == ARRAY_TRIGGER_NODE {
                return Err(Diagnostic::corruption(format!(
                    "telescope record {i} uses the reserved array trigger node"
                )));
            }
            if ev.event_by_node_number(record.node_number()).is_some() {
                return Err(Diagnostic::corruption(format!(
                    "array event has two records for node {}",
                    record.node_number()
                )));
            }
            ev.events.push(record);
        }
        if presence & HAS_TRIGGER != 0 {
            ev.trigger = Some(ArrayTriggerRecord::decode(r).comment("while decoding array trigger")?);
        }
        Ok(ev)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn event_for(node: u8) -> EventRecord {
        let mut e = EventRecord::with_sizes(4, 0, 8, 1);
        e.set_node_number(node);
        e.set_event_number(17);
        e.set_hit_bit(3, true).unwrap();
        e.set_sample(0, 2, node).unwrap();
        e
    }

    #[test]
    fn missing_node_is_none() {
        let mut ae = ArrayEvent::new();
        ae.add_event(event_for(0)).unwrap();
        ae.add_event(event_for(3)).unwrap();
        assert!(ae.event_by_node_number(1).is_none());
        assert_eq!(ae.event_by_node_number(3).unwrap(), &event_for(3));
    }

    #[test]
    fn same_node_replaces_previous_record() {
        let mut ae = ArrayEvent::new();
        assert!(ae.add_event(event_for(2)).unwrap().is_none());
        let mut newer = event_for(2);
        newer.set_event_number(18);
        let old = ae.add_event(newer).unwrap().unwrap();
        assert_eq!(old.event_number(), 17);
        assert_eq!(ae.num_events(), 1);
        assert_eq!(ae.event_by_node_number(2).unwrap().event_number(), 18);
        assert_eq!(ae.remove_event(2).unwrap().event_number(), 18);
        assert!(ae.remove_event(2).is_none());
    }

    #[test]
    fn reserved_node_and_capacity() {
        let mut ae = ArrayEvent::new();
        let err = ae.add_event(event_for(ARRAY_TRIGGER_NODE)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
        for node in 0..MAX_EVENTS {
            let mut e = EventRecord::new();
            e.set_node_number(node as u8);
            ae.add_event(e).unwrap();
        }
        assert_eq!(ae.num_events(), MAX_EVENTS);
        let err = ae.add_event(event_for(254)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    fn encode_unchecked(events: Vec<EventRecord>) -> Vec<u8> {
        let ae = ArrayEvent {
            run_number: None,
            events,
            trigger: None,
        };
        let mut out = Vec::new();
        ae.encode_into(&mut out).unwrap();
        out
    }

    #[test]
    fn decode_rejects_duplicate_node() {
        let bytes = encode_unchecked(vec![event_for(1), event_for(1)]);
        let err = ArrayEvent::decode(&mut ByteReader::new(&bytes, "array event")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corruption);
        assert!(err.message().contains("two records"));
    }

    #[test]
    fn decode_rejects_reserved_node() {
        let bytes = encode_unchecked(vec![event_for(ARRAY_TRIGGER_NODE)]);
        let err = ArrayEvent::decode(&mut ByteReader::new(&bytes, "array event")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corruption);
        assert!(err.message().contains("reserved"));
    }

    #[test]
    fn sanity_compares_trigger_and_reports() {
        let mut ae = ArrayEvent::new();
        assert!(!ae.is_sane());
        ae.add_event(event_for(0)).unwrap();
        ae.add_event(event_for(2)).unwrap();
        let mut at = ArrayTriggerRecord::with_sizes(0, 2);
        at.set_trigger_telescope_id(0, 0).unwrap();
        at.set_trigger_telescope_id(1, 2).unwrap();
        ae.set_trigger(at);
        assert!(ae.is_sane());
        assert_eq!(ae.expected_telescopes().to_string(), "0,2");
        ae.remove_event(2);
        assert!(!ae.is_sane());
        assert_eq!(ae.trigger().unwrap().num_trigger_telescopes(), 2);
    }

    #[test]
    fn encode_decode_keeps_records() {
        let mut ae = ArrayEvent::new();
        ae.set_run_number(12);
        ae.add_event(event_for(5)).unwrap();
        ae.add_event(event_for(1)).unwrap();
        let mut buf = Vec::new();
        ae.encode_into(&mut buf).unwrap();
        let mut r = ByteReader::new(&buf, "array event");
        let back = ArrayEvent::decode(&mut r).unwrap();
        r.finish().unwrap();
        assert_eq!(back, ae);
        assert!(!back.has_trigger());
        assert_eq!(back.trigger().unwrap_err().kind(), ErrorKind::BankNotPresent);
    }
}
