//! Captured address space of the inspected process
//!
//! A snapshot stores memory as a list of regions, each a start address plus
//! raw bytes. Reads only succeed when the whole pointer lies inside a single
//! region; anything straddling a gap or a region edge is a failed read, just
//! as it would be against a live process with unmapped pages.

use clrstack_common::Address;
use log::info;

use crate::domain::SnapshotError;

/// Address range `[start, end)` in the inspected process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRange {
    pub start: u64,
    pub end: u64,
}

impl MemoryRange {
    /// Check if an address falls within this memory range
    #[must_use]
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }

    /// Check if `[addr, addr + len)` lies entirely within this memory range
    #[must_use]
    pub fn contains_span(&self, addr: u64, len: u64) -> bool {
        self.contains(addr) && addr.checked_add(len).is_some_and(|end| end <= self.end)
    }

    #[must_use]
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// One captured block of memory
#[derive(Debug, Clone)]
pub struct MemoryRegion {
    range: MemoryRange,
    bytes: Vec<u8>,
}

impl MemoryRegion {
    /// Decode a region from its hex-encoded bytes
    ///
    /// # Errors
    /// Returns an error if `hex_bytes` is not valid hex or the region would
    /// extend past the end of the address space
    pub fn from_hex(start: Address, hex_bytes: &str) -> Result<Self, SnapshotError> {
        let bytes = hex::decode(hex_bytes.trim())
            .map_err(|e| SnapshotError::InvalidHex { start, reason: e.to_string() })?;
        let end = start.checked_add(bytes.len() as u64).ok_or_else(|| SnapshotError::InvalidHex {
            start,
            reason: "region extends past the end of the address space".to_string(),
        })?;

        Ok(Self { range: MemoryRange { start, end }, bytes })
    }

    #[must_use]
    pub fn range(&self) -> MemoryRange {
        self.range
    }

    fn read(&self, addr: Address, len: usize) -> Option<&[u8]> {
        if !self.range.contains_span(addr, len as u64) {
            return None;
        }
        let offset = usize::try_from(addr - self.range.start).ok()?;
        self.bytes.get(offset..offset + len)
    }
}

/// All captured regions, sorted by start address
#[derive(Debug, Clone, Default)]
pub struct AddressSpace {
    regions: Vec<MemoryRegion>,
}

impl AddressSpace {
    #[must_use]
    pub fn new(mut regions: Vec<MemoryRegion>) -> Self {
        regions.retain(|r| !r.range.is_empty());
        regions.sort_by_key(|r| r.range.start);

        let total: u64 = regions.iter().map(|r| r.range.len()).sum();
        info!("Address space: {} regions, {} KB captured", regions.len(), total / 1024);

        Self { regions }
    }

    /// Read a little-endian pointer of `pointer_size` bytes (4 or 8)
    #[must_use]
    pub fn read_pointer(&self, addr: Address, pointer_size: usize) -> Option<Address> {
        // Regions may overlap: try every region starting at or before `addr`,
        // latest start first
        let candidates = self.regions.partition_point(|r| r.range.start <= addr);
        let bytes = self.regions[..candidates]
            .iter()
            .rev()
            .find_map(|r| r.read(addr, pointer_size))?;

        match pointer_size {
            4 => <[u8; 4]>::try_from(bytes).ok().map(|b| u64::from(u32::from_le_bytes(b))),
            8 => <[u8; 8]>::try_from(bytes).ok().map(u64::from_le_bytes),
            _ => None,
        }
    }
}
