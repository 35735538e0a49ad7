//! Per-address set of typed breakpoints with saved original bytes
//! (spec.md §3, §4.5).
//!
//! Grounded on `original_source/debug/client/gdb/BreakpointHandler.cpp`:
//! original bytes are captured exactly once per address ("don't save the
//! original data more than once") and restored only once every breakpoint
//! kind at that address has been removed.

use std::collections::BTreeMap;

use crate::error::Error;
use crate::model::{Breakpoint, BreakpointKind};

/// All breakpoints currently installed, keyed by address.
#[derive(Debug, Default)]
pub struct BreakpointTable {
    by_address: BTreeMap<u64, Slot>,
    next_id: u32,
}

#[derive(Debug, Default)]
struct Slot {
    original_bytes: Option<Vec<u8>>,
    entries: Vec<Breakpoint>,
}

impl BreakpointTable {
    pub fn new() -> Self {
        BreakpointTable {
            by_address: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Returns `Some(bytes)` if `original_bytes` for `address` has already
    /// been captured by an earlier `add` at the same address.
    pub fn original_bytes(&self, address: u64) -> Option<&[u8]> {
        self.by_address
            .get(&address)
            .and_then(|slot| slot.original_bytes.as_deref())
    }

    /// Records the original bytes replaced by the trap opcode at `address`.
    /// A no-op if already captured (captured exactly once regardless of
    /// how many breakpoint kinds end up at that address).
    pub fn store_original_bytes(&mut self, address: u64, bytes: Vec<u8>) {
        let slot = self.by_address.entry(address).or_default();
        if slot.original_bytes.is_none() {
            slot.original_bytes = Some(bytes);
        }
    }

    /// Adds a breakpoint of `kind` at `address`. Fails if one of that kind
    /// already exists there (spec.md §3 invariant: at most one per kind per
    /// address).
    pub fn add(
        &mut self,
        address: u64,
        kind: BreakpointKind,
        auto_resume: bool,
        send_registers: bool,
        condition: Option<crate::condition::Expr>,
    ) -> Result<u32, Error> {
        let slot = self.by_address.entry(address).or_default();
        if slot.entries.iter().any(|bp| bp.kind == kind) {
            return Err(Error::CouldntSetBreakpoint);
        }

        let id = self.next_id;
        self.next_id += 1;

        slot.entries.push(Breakpoint {
            kind,
            address,
            id,
            auto_resume,
            send_registers,
            original_bytes: slot.original_bytes.clone().unwrap_or_default(),
            condition,
        });

        Ok(id)
    }

    /// Removes the breakpoint of `kind` at `address`. Returns the original
    /// bytes iff this was the last entry at that address (the caller should
    /// then restore them to target memory); returns `None` if other kinds
    /// remain there.
    pub fn remove(&mut self, address: u64, kind: BreakpointKind) -> Result<Option<Vec<u8>>, Error> {
        let slot = self
            .by_address
            .get_mut(&address)
            .ok_or(Error::NoBreakpointAtAddress(address))?;

        let pos = slot
            .entries
            .iter()
            .position(|bp| bp.kind == kind)
            .ok_or(Error::NoBreakpointAtAddress(address))?;
        slot.entries.remove(pos);

        if slot.entries.is_empty() {
            let original = slot.original_bytes.clone();
            self.by_address.remove(&address);
            Ok(original)
        } else {
            Ok(None)
        }
    }

    /// Looks up all breakpoints installed at `address`.
    pub fn lookup(&self, address: u64) -> &[Breakpoint] {
        self.by_address
            .get(&address)
            .map(|slot| slot.entries.as_slice())
            .unwrap_or(&[])
    }

    pub fn lookup_kind(&self, address: u64, kind: BreakpointKind) -> Option<&Breakpoint> {
        self.lookup(address).iter().find(|bp| bp.kind == kind)
    }

    /// Attaches or clears the condition on an already-installed breakpoint.
    pub fn set_condition(
        &mut self,
        address: u64,
        kind: BreakpointKind,
        condition: Option<crate::condition::Expr>,
    ) -> Result<(), Error> {
        let slot = self
            .by_address
            .get_mut(&address)
            .ok_or(Error::NoBreakpointAtAddress(address))?;
        let bp = slot
            .entries
            .iter_mut()
            .find(|bp| bp.kind == kind)
            .ok_or(Error::NoBreakpointAtAddress(address))?;
        bp.condition = condition;
        Ok(())
    }

    /// Iterates over every installed breakpoint, across all addresses.
    pub fn iter(&self) -> impl Iterator<Item = &Breakpoint> {
        self.by_address.values().flat_map(|slot| slot.entries.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_remove_restores_original_bytes_captured_before_add() {
        let mut table = BreakpointTable::new();
        table.store_original_bytes(0x1000, vec![0x90, 0x90]);
        table.add(0x1000, BreakpointKind::Simple, false, false, None).unwrap();

        let restored = table.remove(0x1000, BreakpointKind::Simple).unwrap();
        assert_eq!(restored, Some(vec![0x90, 0x90]));
    }

    #[test]
    fn at_most_one_breakpoint_of_each_kind_per_address() {
        let mut table = BreakpointTable::new();
        table.add(0x1000, BreakpointKind::Simple, false, false, None).unwrap();
        assert!(table.add(0x1000, BreakpointKind::Simple, false, false, None).is_err());
    }

    #[test]
    fn distinct_kinds_at_same_address_capture_original_bytes_once() {
        let mut table = BreakpointTable::new();
        table.store_original_bytes(0x2000, vec![0xCC]);
        // A second store_original_bytes call at the same address (as would
        // happen if a second kind is installed) must not overwrite it.
        table.store_original_bytes(0x2000, vec![0xFF]);
        assert_eq!(table.original_bytes(0x2000), Some(&[0xCC][..]));

        table.add(0x2000, BreakpointKind::Simple, false, false, None).unwrap();
        table.add(0x2000, BreakpointKind::Echo, true, true, None).unwrap();
        assert_eq!(table.lookup(0x2000).len(), 2);
    }

    #[test]
    fn removal_only_restores_after_last_kind_removed() {
        let mut table = BreakpointTable::new();
        table.store_original_bytes(0x3000, vec![0xAA]);
        table.add(0x3000, BreakpointKind::Simple, false, false, None).unwrap();
        table.add(0x3000, BreakpointKind::Echo, true, true, None).unwrap();

        let first = table.remove(0x3000, BreakpointKind::Simple).unwrap();
        assert_eq!(first, None, "other kind still installed, bytes not restored yet");

        let second = table.remove(0x3000, BreakpointKind::Echo).unwrap();
        assert_eq!(second, Some(vec![0xAA]));
    }

    #[test]
    fn remove_at_unknown_address_is_an_error() {
        let mut table = BreakpointTable::new();
        assert!(table.remove(0x9999, BreakpointKind::Simple).is_err());
    }
}
