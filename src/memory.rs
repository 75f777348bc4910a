// Flat 64 KiB memory image and the bus the interpreter writes through.
// Writes into $D400-$D7FF never reach RAM; they are forwarded to the
// sound chip instead.

use crate::sid_device::SidChip;

pub const MEMORY_SIZE: usize = 0x1_0000;

// ─────────────────────────────────────────────────────────────────────────────
//  Fixed addresses
// ─────────────────────────────────────────────────────────────────────────────

pub const SID_BASE: u16 = 0xD400;
pub const SID_WINDOW_MASK: u16 = 0xFC00;
pub const SID_REG_MASK: u16 = 0x1F;
/// Highest documented register; writes above it are also digi writes.
pub const SID_LAST_REG_ADDR: u16 = 0xD418;
pub const SID_VOL_REG: u8 = 0x18;

/// Software IRQ vector many tunes point at their play routine during init.
pub const IRQ_VECTOR: u16 = 0x0314;

/// CIA1 timer A latch, low/high.
pub const CIA1_TIMER_A_LO: u16 = 0xDC04;
pub const CIA1_TIMER_A_HI: u16 = 0xDC05;

pub const RESET_VECTOR: u16 = 0xFFFC;
pub const STACK_BASE: u16 = 0x0100;

/// Whether a write to `addr` lands in the sound-chip window.
#[inline]
pub fn is_sid_address(addr: u16) -> bool {
    addr & SID_WINDOW_MASK == SID_BASE
}

// ─────────────────────────────────────────────────────────────────────────────
//  Memory image
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Memory {
    ram: Box<[u8]>,
}

impl Memory {
    pub fn new() -> Self {
        Self {
            ram: vec![0u8; MEMORY_SIZE].into_boxed_slice(),
        }
    }

    #[inline]
    pub fn read(&self, addr: u16) -> u8 {
        self.ram[addr as usize]
    }

    /// Little-endian word at `addr`, `addr + 1` (wrapping).
    pub fn read_u16(&self, addr: u16) -> u16 {
        let lo = self.read(addr) as u16;
        let hi = self.read(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    /// Raw store, bypassing the sound-chip window.
    #[inline]
    pub fn write(&mut self, addr: u16, value: u8) {
        self.ram[addr as usize] = value;
    }

    /// Copy `data` to `start`. Bytes that would fall past $FFFF are
    /// dropped; returns the number of bytes stored.
    pub fn load(&mut self, start: u16, data: &[u8]) -> usize {
        let start = start as usize;
        let end = (start + data.len()).min(MEMORY_SIZE);
        let len = end - start;
        self.ram[start..end].copy_from_slice(&data[..len]);
        if len < data.len() {
            log::warn!(
                "image at ${:04X} overruns 64K, {} bytes dropped",
                start,
                data.len() - len
            );
        }
        len
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.ram
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memory")
            .field("size", &self.ram.len())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
//  Bus
// ─────────────────────────────────────────────────────────────────────────────

/// The interpreter's view of memory for one call: the image plus the chip
/// borrowed for the duration of that call.
pub struct SidBus<'a> {
    mem: &'a mut Memory,
    sid: Option<&'a mut dyn SidChip>,
}

impl<'a> SidBus<'a> {
    pub fn new(mem: &'a mut Memory, sid: Option<&'a mut dyn SidChip>) -> Self {
        Self { mem, sid }
    }

    /// A bus with no chip attached; every write goes to RAM.
    pub fn detached(mem: &'a mut Memory) -> Self {
        Self { mem, sid: None }
    }

    /// Reads are never intercepted: the window returns whatever RAM holds.
    #[inline]
    pub fn read(&self, addr: u16) -> u8 {
        self.mem.read(addr)
    }

    pub fn write(&mut self, addr: u16, value: u8) {
        match self.sid {
            Some(ref mut sid) if is_sid_address(addr) => {
                sid.poke((addr & SID_REG_MASK) as u8, value);
                if addr > SID_LAST_REG_ADDR {
                    log::trace!("digi write ${addr:04X} = ${value:02X}");
                    sid.poke_digi(addr, value);
                }
            }
            _ => self.mem.write(addr, value),
        }
    }

    pub fn memory(&self) -> &Memory {
        self.mem
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sid_device::mock::{RecordingChip, Write};

    #[test]
    fn test_sid_window_is_intercepted() {
        let mut mem = Memory::new();
        let mut chip = RecordingChip::new(44_100);
        {
            let mut bus = SidBus::new(&mut mem, Some(&mut chip));
            for k in 0..=23u16 {
                bus.write(SID_BASE + k, 0x40 + k as u8);
            }
        }
        for k in 0..=23u16 {
            assert_eq!(mem.read(SID_BASE + k), 0, "RAM touched at +{k}");
        }
        let expected: Vec<Write> = (0..=23u8).map(|k| Write::Poke(k, 0x40 + k)).collect();
        assert_eq!(chip.writes, expected);
    }

    #[test]
    fn test_digi_writes_hit_both_paths() {
        let mut mem = Memory::new();
        let mut chip = RecordingChip::new(44_100);
        {
            let mut bus = SidBus::new(&mut mem, Some(&mut chip));
            bus.write(0xD418, 0x0F);
            for addr in 0xD419..=0xD41Fu16 {
                bus.write(addr, 0x05);
            }
        }
        assert_eq!(chip.writes[0], Write::Poke(0x18, 0x0F));
        let rest = &chip.writes[1..];
        assert_eq!(rest.len(), 14);
        for (i, addr) in (0xD419..=0xD41Fu16).enumerate() {
            assert_eq!(rest[i * 2], Write::Poke((addr & 0x1F) as u8, 0x05));
            assert_eq!(rest[i * 2 + 1], Write::Digi(addr, 0x05));
        }
    }

    #[test]
    fn test_window_mirrors_and_edges() {
        let mut mem = Memory::new();
        let mut chip = RecordingChip::new(44_100);
        {
            let mut bus = SidBus::new(&mut mem, Some(&mut chip));
            bus.write(0xD7E4, 0x11); // mirror of $D404
            bus.write(0xD3FF, 0x22);
            bus.write(0xD800, 0x33);
        }
        assert_eq!(chip.writes[0], Write::Poke(0x04, 0x11));
        assert_eq!(chip.writes[1], Write::Digi(0xD7E4, 0x11));
        assert_eq!(chip.writes.len(), 2);
        assert_eq!(mem.read(0xD3FF), 0x22);
        assert_eq!(mem.read(0xD800), 0x33);
    }

    #[test]
    fn test_reads_see_ram_not_chip() {
        let mut mem = Memory::new();
        mem.write(0xD404, 0x99);
        let mut chip = RecordingChip::new(44_100);
        let mut bus = SidBus::new(&mut mem, Some(&mut chip));
        bus.write(0xD404, 0x41);
        assert_eq!(bus.read(0xD404), 0x99);
    }

    #[test]
    fn test_detached_bus_writes_ram() {
        let mut mem = Memory::new();
        SidBus::detached(&mut mem).write(0xD400, 0x12);
        assert_eq!(mem.read(0xD400), 0x12);
    }

    #[test]
    fn test_load_truncates_at_top() {
        let mut mem = Memory::new();
        assert_eq!(mem.load(0xFFFE, &[1, 2, 3, 4]), 2);
        assert_eq!(mem.read(0xFFFE), 1);
        assert_eq!(mem.read(0xFFFF), 2);
        assert_eq!(mem.read(0x0000), 0);
        assert_eq!(mem.read_u16(0xFFFE), 0x0201);
    }
}
