//! Packet: the per-event container of typed banks.
//!
//! A packet holds at most one bank of each [`BankKind`]. Banks are kept in a
//! `BTreeMap` so serialization and iteration follow kind order. Packets
//! returned by a reader also remember the run and packet index they were
//! read from; those are not part of the encoded body.

use std::collections::BTreeMap;

use crate::array_event::ArrayEvent;
use crate::error::{Diagnostic, Result, ResultExt};
use crate::simulation::{CorsikaSimulationData, SimulationData, SimulationHeader};
use crate::wire::{ByteReader, WriteLeExt};

/// Closed set of bank kinds. The discriminant is the on-disk tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum BankKind {
    ArrayEvent = 1,
    SimulationData = 2,
    CorsikaSimulationData = 3,
    SimulationHeader = 4,
}

impl BankKind {
    pub const ALL: [BankKind; 4] = [
        BankKind::ArrayEvent,
        BankKind::SimulationData,
        BankKind::CorsikaSimulationData,
        BankKind::SimulationHeader,
    ];

    #[must_use]
    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|k| *k as u8 == tag)
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            BankKind::ArrayEvent => "ArrayEvent",
            BankKind::SimulationData => "SimulationData",
            BankKind::CorsikaSimulationData => "CorsikaSimulationData",
            BankKind::SimulationHeader => "SimulationHeader",
        }
    }

    fn version(self) -> u16 {
        match self {
            BankKind::ArrayEvent => 1,
            BankKind::SimulationData => SimulationData::VERSION,
            BankKind::CorsikaSimulationData => CorsikaSimulationData::VERSION,
            BankKind::SimulationHeader => SimulationHeader::VERSION,
        }
    }
}

/// One typed bank.
#[derive(Debug, Clone, PartialEq)]
pub enum Bank {
    ArrayEvent(ArrayEvent),
    SimulationData(SimulationData),
    CorsikaSimulationData(CorsikaSimulationData),
    SimulationHeader(SimulationHeader),
}

impl Bank {
    #[must_use]
    pub fn kind(&self) -> BankKind {
        match self {
            Bank::ArrayEvent(_) => BankKind::ArrayEvent,
            Bank::SimulationData(_) => BankKind::SimulationData,
            Bank::CorsikaSimulationData(_) => BankKind::CorsikaSimulationData,
            Bank::SimulationHeader(_) => BankKind::SimulationHeader,
        }
    }

    fn encode_payload(&self, out: &mut Vec<u8>) -> Result<()> {
        match self {
            Bank::ArrayEvent(ae) => ae.encode_into(out)?,
            Bank::SimulationData(sim) => {
                out.reserve(SimulationData::ENCODED_LEN);
                sim.encode_into(out);
            }
            Bank::CorsikaSimulationData(cors) => {
                out.reserve(CorsikaSimulationData::ENCODED_LEN);
                cors.encode_into(out);
            }
            Bank::SimulationHeader(header) => header.encode_into(out)?,
        }
        Ok(())
    }

    fn decode_payload(kind: BankKind, payload: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(payload, kind.name());
        let bank = match kind {
            BankKind::ArrayEvent => Bank::ArrayEvent(ArrayEvent::decode(&mut r)?),
            BankKind::SimulationData => Bank::SimulationData(SimulationData::decode(&mut r)?),
            BankKind::CorsikaSimulationData => {
                Bank::CorsikaSimulationData(CorsikaSimulationData::decode(&mut r)?)
            }
            BankKind::SimulationHeader => Bank::SimulationHeader(SimulationHeader::decode(&mut r)?),
        };
        r.finish()?;
        Ok(bank)
    }
}

/// Types that can live in a packet as a bank.
pub trait BankPayload: Sized {
    const KIND: BankKind;

    fn from_bank(bank: &Bank) -> Option<&Self>;
    fn from_bank_mut(bank: &mut Bank) -> Option<&mut Self>;
    fn into_bank(self) -> Bank;
}

macro_rules! bank_payload {
    ($ty:ty, $variant:ident) => {
        impl BankPayload for $ty {
            const KIND: BankKind = BankKind::$variant;

            fn from_bank(bank: &Bank) -> Option<&Self> {
                match bank {
                    Bank::$variant(b) => Some(b),
                    _ => None,
                }
            }

            fn from_bank_mut(bank: &mut Bank) -> Option<&mut Self> {
                match bank {
                    Bank::$variant(b) => Some(b),
                    _ => None,
                }
            }

            fn into_bank(self) -> Bank {
                Bank::$variant(self)
            }
        }

        impl From<$ty> for Bank {
            fn from(b: $ty) -> Self {
                b.into_bank()
            }
        }
    };
}

bank_payload!(ArrayEvent, ArrayEvent);
bank_payload!(SimulationData, SimulationData);
bank_payload!(CorsikaSimulationData, CorsikaSimulationData);
bank_payload!(SimulationHeader, SimulationHeader);

/// Banks recorded for one packet index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Packet {
    banks: BTreeMap<BankKind, Bank>,
    origin: Option<(u32, u32)>,
}

impl Packet {
    /// Empty packet, as written for skipped indices.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.banks.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.banks.len()
    }

    /// Store `bank`, returning the bank of the same kind it replaces.
    pub fn insert(&mut self, bank: Bank) -> Option<Bank> {
        self.banks.insert(bank.kind(), bank)
    }

    /// Typed form of [`Packet::insert`].
    pub fn put<T: BankPayload>(&mut self, bank: T) -> Option<Bank> {
        self.insert(bank.into_bank())
    }

    #[must_use]
    pub fn has<T: BankPayload>(&self) -> bool {
        self.banks.contains_key(&T::KIND)
    }

    /// The bank of type `T`, or `None`.
    #[must_use]
    pub fn bank<T: BankPayload>(&self) -> Option<&T> {
        self.banks.get(&T::KIND).and_then(T::from_bank)
    }

    /// The bank of type `T`; fails with `BankNotPresent` if absent.
    #[track_caller]
    pub fn get<T: BankPayload>(&self) -> Result<&T> {
        match self.bank::<T>() {
            Some(b) => Ok(b),
            None => Err(Diagnostic::bank_not_present(format!(
                "packet has no {} bank",
                T::KIND.name()
            ))),
        }
    }

    #[track_caller]
    pub fn get_mut<T: BankPayload>(&mut self) -> Result<&mut T> {
        match self.banks.get_mut(&T::KIND).and_then(T::from_bank_mut) {
            Some(b) => Ok(b),
            None => Err(Diagnostic::bank_not_present(format!(
                "packet has no {} bank",
                T::KIND.name()
            ))),
        }
    }

    /// Run number of the file this packet was read from.
    #[must_use]
    pub fn run_number(&self) -> Option<u32> {
        self.origin.map(|(run, _)| run)
    }

    /// Packet index (the event number) this packet was read from.
    #[must_use]
    pub fn event_number(&self) -> Option<u32> {
        self.origin.map(|(_, index)| index)
    }

    pub(crate) fn set_origin(&mut self, run_number: u32, index: u32) {
        self.origin = Some((run_number, index));
    }

    pub fn remove(&mut self, kind: BankKind) -> Option<Bank> {
        self.banks.remove(&kind)
    }

    /// Banks in kind order.
    pub fn banks(&self) -> impl Iterator<Item = &Bank> {
        self.banks.values()
    }

    pub fn put_array_event(&mut self, ae: ArrayEvent) {
        self.put(ae);
    }

    #[must_use]
    pub fn has_array_event(&self) -> bool {
        self.has::<ArrayEvent>()
    }

    #[track_caller]
    pub fn array_event(&self) -> Result<&ArrayEvent> {
        self.get()
    }

    #[track_caller]
    pub fn array_event_mut(&mut self) -> Result<&mut ArrayEvent> {
        self.get_mut()
    }

    pub fn put_simulation_data(&mut self, sim: SimulationData) {
        self.put(sim);
    }

    #[must_use]
    pub fn has_simulation_data(&self) -> bool {
        self.has::<SimulationData>()
    }

    #[track_caller]
    pub fn simulation_data(&self) -> Result<&SimulationData> {
        self.get()
    }

    pub fn put_corsika_simulation_data(&mut self, cors: CorsikaSimulationData) {
        self.put(cors);
    }

    #[must_use]
    pub fn has_corsika_simulation_data(&self) -> bool {
        self.has::<CorsikaSimulationData>()
    }

    #[track_caller]
    pub fn corsika_simulation_data(&self) -> Result<&CorsikaSimulationData> {
        self.get()
    }

    pub fn put_simulation_header(&mut self, header: SimulationHeader) {
        self.put(header);
    }

    #[must_use]
    pub fn has_simulation_header(&self) -> bool {
        self.has::<SimulationHeader>()
    }

    #[track_caller]
    pub fn simulation_header(&self) -> Result<&SimulationHeader> {
        self.get()
    }

    /// Serialize the packet body: bank count, then each bank framed by kind,
    /// version and payload length.
    pub(crate) fn encode_body(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        out.put_u8(self.banks.len() as u8);
        for bank in self.banks.values() {
            let kind = bank.kind();
            out.put_u8(kind as u8);
            out.put_u16_le(kind.version());
            let len_at = out.len();
            out.put_u32_le(0);
            bank.encode_payload(&mut out)
                .with_comment(|| format!("while encoding {} bank", kind.name()))?;
            let len = u32::try_from(out.len() - len_at - 4)
                .map_err(|_| Diagnostic::usage(format!("{} bank exceeds 4 GiB", kind.name())))?;
            out[len_at..len_at + 4].copy_from_slice(&len.to_le_bytes());
        }
        Ok(out)
    }

    pub(crate) fn decode_body(body: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(body, "packet body");
        let count = r.u8()?;
        let mut packet = Self::new();
        for _ in 0..count {
            let tag = r.u8()?;
            let version = r.u16_le()?;
            let len = r.u32_le()? as usize;
            let payload = r.take(len)?;
            let Some(kind) = BankKind::from_tag(tag) else {
                tracing::warn!(tag, len, "skipping bank of unknown kind");
                continue;
            };
            if version > kind.version() {
                return Err(Diagnostic::corruption(format!(
                    "{} bank version {version} is newer than supported {}",
                    kind.name(),
                    kind.version()
                )));
            }
            let bank = Bank::decode_payload(kind, payload)
                .with_comment(|| format!("while decoding {} bank", kind.name()))?;
            if packet.insert(bank).is_some() {
                return Err(Diagnostic::corruption(format!(
                    "packet holds two {} banks",
                    kind.name()
                )));
            }
        }
        r.finish()?;
        Ok(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn get_absent_bank_fails_with_bank_not_present() {
        let packet = Packet::new();
        assert!(!packet.has_array_event());
        assert!(packet.bank::<SimulationData>().is_none());
        let err = packet.array_event().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BankNotPresent);
    }

    #[test]
    fn put_replaces_same_kind() {
        let mut packet = Packet::new();
        packet.put_simulation_data(SimulationData {
            energy_gev: 100.0,
            ..Default::default()
        });
        let old = packet.put(SimulationData {
            energy_gev: 250.0,
            ..Default::default()
        });
        assert!(matches!(old, Some(Bank::SimulationData(s)) if s.energy_gev == 100.0));
        assert_eq!(packet.len(), 1);
        assert_eq!(packet.simulation_data().unwrap().energy_gev, 250.0);
    }

    #[test]
    fn body_round_trip_keeps_kind_order() {
        let mut packet = Packet::new();
        packet.put_corsika_simulation_data(CorsikaSimulationData {
            shower_id: 7,
            ..Default::default()
        });
        packet.put_array_event(ArrayEvent::new());
        let body = packet.encode_body().unwrap();
        let back = Packet::decode_body(&body).unwrap();
        assert_eq!(back, packet);
        let kinds: Vec<_> = back.banks().map(Bank::kind).collect();
        assert_eq!(kinds, vec![BankKind::ArrayEvent, BankKind::CorsikaSimulationData]);
    }

    #[test]
    fn unknown_bank_is_skipped() {
        let mut body = vec![2u8];
        body.put_u8(200);
        body.put_u16_le(1);
        body.put_u32_le(3);
        body.put_bytes(&[9, 9, 9]);
        body.put_u8(BankKind::CorsikaSimulationData as u8);
        body.put_u16_le(1);
        body.put_u32_le(CorsikaSimulationData::ENCODED_LEN as u32);
        CorsikaSimulationData::default().encode_into(&mut body);

        let packet = Packet::decode_body(&body).unwrap();
        assert_eq!(packet.len(), 1);
        assert!(packet.has_corsika_simulation_data());
    }

    #[test]
    fn duplicate_bank_is_corruption() {
        let mut body = vec![2u8];
        for _ in 0..2 {
            body.put_u8(BankKind::SimulationData as u8);
            body.put_u16_le(1);
            body.put_u32_le(SimulationData::ENCODED_LEN as u32);
            SimulationData::default().encode_into(&mut body);
        }
        let err = Packet::decode_body(&body).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corruption);
    }

    #[test]
    fn newer_bank_version_is_corruption() {
        let mut body = vec![1u8];
        body.put_u8(BankKind::CorsikaSimulationData as u8);
        body.put_u16_le(CorsikaSimulationData::VERSION + 1);
        body.put_u32_le(CorsikaSimulationData::ENCODED_LEN as u32);
        CorsikaSimulationData::default().encode_into(&mut body);

        let err = Packet::decode_body(&body).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corruption);
        assert!(err.message().contains("newer"));
    }

    #[test]
    fn simulation_header_bank_round_trip() {
        let mut packet = Packet::new();
        assert!(!packet.has_simulation_header());
        packet.put_simulation_header(SimulationHeader {
            simulation_package: SimulationHeader::PACKAGE_KASCADE,
            simulator: "ISU".into(),
            sim_config_file: "seed 7".into(),
            ..SimulationHeader::default()
        });
        packet.put_array_event(ArrayEvent::new());

        let back = Packet::decode_body(&packet.encode_body().unwrap()).unwrap();
        assert_eq!(back, packet);
        assert_eq!(back.simulation_header().unwrap().simulator, "ISU");
        let kinds: Vec<_> = back.banks().map(Bank::kind).collect();
        assert_eq!(kinds, vec![BankKind::ArrayEvent, BankKind::SimulationHeader]);
        assert_eq!(back.run_number(), None);
    }
}
