//! Named flash-area map.
//!
//! A flash area is one named, contiguous region of one underlying `Flash`
//! device. The map exists because the core only ever operates on areas by a
//! stable identifier (`BOOTLOADER`, `PRIMARY(i)`, ...), never on raw device
//! offsets; board code is the only place a device/offset pair is chosen.

use core::cell::RefCell;

use heapless::Vec;

use crate::{Error, Flash, Result};

/// Compile-time cap on sectors tracked per slot. An area whose sector count
/// would exceed this fails `register`/`open`, which the `boot` crate surfaces
/// as `Error::BadFlashMap`.
pub const MAX_IMG_SECTORS: usize = 256;

/// Stable area identifiers (spec Data Model §3).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub enum AreaId {
    Bootloader,
    Primary(u8),
    Secondary(u8),
    Scratch,
    SwapStatus,
}

/// Whether a device's erased state reads back as all-zero or all-one bytes.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ErasePolarity {
    Zero,
    Ff,
}

impl ErasePolarity {
    pub fn value(self) -> u8 {
        match self {
            ErasePolarity::Zero => 0x00,
            ErasePolarity::Ff => 0xff,
        }
    }
}

/// One area's static geometry.
#[derive(Debug, Copy, Clone)]
pub struct AreaGeometry {
    pub id: AreaId,
    pub device_id: u8,
    pub base_offset: usize,
    pub size: usize,
    pub erase_size: usize,
    pub erase_value: ErasePolarity,
    pub write_alignment: usize,
}

impl AreaGeometry {
    /// Number of erase sectors in this area.
    pub fn sector_count(&self) -> Result<usize> {
        if self.erase_size == 0 || self.size % self.erase_size != 0 {
            return Err(Error::NotAligned);
        }
        let n = self.size / self.erase_size;
        if n > MAX_IMG_SECTORS {
            return Err(Error::OutOfBounds);
        }
        Ok(n)
    }

    /// `{offset, size}` pairs for every sector, offsets relative to the
    /// area's own base, not the underlying device.
    pub fn sector_iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let n = if self.erase_size == 0 { 0 } else { self.size / self.erase_size };
        (0..n).map(move |i| (i * self.erase_size, self.erase_size))
    }
}

/// A handle on one open area, borrowing the backing device for its
/// lifetime. Letting the handle drop is "close" — there is no separate
/// close call, so a stuck-open borrow is a compile error, not a runtime
/// leak.
pub struct AreaHandle<'a, F: Flash> {
    geometry: AreaGeometry,
    flash: &'a RefCell<F>,
}

impl<'a, F: Flash> AreaHandle<'a, F> {
    pub fn id(&self) -> AreaId {
        self.geometry.id
    }

    pub fn size(&self) -> usize {
        self.geometry.size
    }

    pub fn erase_size(&self) -> usize {
        self.geometry.erase_size
    }

    pub fn align(&self) -> usize {
        self.geometry.write_alignment
    }

    pub fn erase_val(&self) -> u8 {
        self.geometry.erase_value.value()
    }

    pub fn sector_iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.geometry.sector_iter()
    }

    fn abs(&self, off: usize) -> Result<usize> {
        self.geometry.base_offset.checked_add(off).ok_or(Error::OutOfBounds)
    }

    pub fn read(&self, off: usize, buf: &mut [u8]) -> Result<()> {
        if off.checked_add(buf.len()).map_or(true, |end| end > self.geometry.size) {
            return Err(Error::OutOfBounds);
        }
        let abs = self.abs(off)?;
        self.flash.borrow_mut().read(abs, buf)
    }

    pub fn write(&self, off: usize, buf: &[u8]) -> Result<()> {
        let align = self.geometry.write_alignment;
        if off % align != 0 || buf.len() % align != 0 {
            return Err(Error::NotAligned);
        }
        if off.checked_add(buf.len()).map_or(true, |end| end > self.geometry.size) {
            return Err(Error::OutOfBounds);
        }
        let abs = self.abs(off)?;
        self.flash.borrow_mut().write(abs, buf)
    }

    pub fn erase(&self, off: usize, len: usize) -> Result<()> {
        let gran = self.geometry.erase_size;
        if off % gran != 0 || len % gran != 0 {
            return Err(Error::NotAligned);
        }
        if off.checked_add(len).map_or(true, |end| end > self.geometry.size) {
            return Err(Error::OutOfBounds);
        }
        let abs = self.abs(off)?;
        self.flash.borrow_mut().erase(abs, abs + len)
    }

    /// True if `buf`, read from `off`, is entirely the area's erase value
    /// (i.e. "unwritten" per spec's erase_val-based, not 0xff-fixed, rule).
    pub fn is_erased(&self, off: usize, len: usize) -> Result<bool> {
        let mut byte = [0u8; 1];
        for i in off..off + len {
            self.read(i, &mut byte)?;
            if byte[0] != self.erase_val() {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// A registry of named areas, each borrowing its backing device. Up to 8
/// areas may be registered, which is enough for the largest layout named in
/// spec.md (`BOOTLOADER`, `SCRATCH`, `SWAP_STATUS`, plus primary/secondary
/// for up to 2 images).
pub struct FlashMap<'a, F: Flash> {
    areas: Vec<(AreaGeometry, &'a RefCell<F>), 8>,
}

impl<'a, F: Flash> FlashMap<'a, F> {
    pub fn new() -> Self {
        FlashMap { areas: Vec::new() }
    }

    /// Register an area backed by `flash`. Fails if the map is full or the
    /// area's sector count would exceed `MAX_IMG_SECTORS`.
    pub fn register(&mut self, geometry: AreaGeometry, flash: &'a RefCell<F>) -> Result<()> {
        geometry.sector_count()?;
        self.areas.push((geometry, flash)).map_err(|_| Error::OutOfBounds)
    }

    pub fn open(&self, id: AreaId) -> Result<AreaHandle<'a, F>> {
        let (geometry, flash) = self.areas.iter().find(|(g, _)| g.id == id).ok_or(Error::OutOfBounds)?;
        Ok(AreaHandle { geometry: *geometry, flash })
    }
}

impl<'a, F: Flash> Default for FlashMap<'a, F> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sector_iter_matches_count() {
        let g = AreaGeometry {
            id: AreaId::Primary(0),
            device_id: 0,
            base_offset: 0,
            size: 4096 * 4,
            erase_size: 4096,
            erase_value: ErasePolarity::Ff,
            write_alignment: 4,
        };
        assert_eq!(g.sector_count().unwrap(), 4);
        assert_eq!(g.sector_iter().count(), 4);
    }

    #[test]
    fn oversized_sector_count_rejected() {
        let g = AreaGeometry {
            id: AreaId::Primary(0),
            device_id: 0,
            base_offset: 0,
            size: (MAX_IMG_SECTORS + 1) * 4096,
            erase_size: 4096,
            erase_value: ErasePolarity::Ff,
            write_alignment: 4,
        };
        assert_eq!(g.sector_count(), Err(Error::OutOfBounds));
    }
}
