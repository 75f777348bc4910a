// Sound-chip collaborator interface.
//
// The interpreter never synthesises audio itself. Writes into the
// $D400 window are forwarded here, and the player pulls rendered
// samples back out through `render_into`.

use serde::{Deserialize, Serialize};

/// Master clock of the emulated machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SidClock {
    #[default]
    Pal,
    Ntsc,
}

impl SidClock {
    pub const PAL_HZ: u32 = 985_248;
    pub const NTSC_HZ: u32 = 1_022_730;

    pub fn hz(self) -> u32 {
        match self {
            SidClock::Pal => Self::PAL_HZ,
            SidClock::Ntsc => Self::NTSC_HZ,
        }
    }
}

/// SID chip revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChipModel {
    #[default]
    Mos6581,
    Mos8580,
}

impl ChipModel {
    /// Parse "6581" / "8580" (with or without the "mos" prefix).
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_lowercase();
        match s.trim_start_matches("mos") {
            "6581" => Some(ChipModel::Mos6581),
            "8580" => Some(ChipModel::Mos8580),
            _ => None,
        }
    }
}

/// Common interface for sound-chip backends driven by the interpreter.
pub trait SidChip {
    fn clock(&self) -> SidClock;
    fn model(&self) -> ChipModel;

    /// Output sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Output samples produced per chip clock tick.
    fn samples_per_tick(&self) -> f64 {
        self.sample_rate() as f64 / self.clock().hz() as f64
    }

    /// Write `value` to register `reg` (0..=31).
    fn poke(&mut self, reg: u8, value: u8);

    /// Sample-replay write for addresses $D419..=$D41F.
    fn poke_digi(&mut self, address: u16, value: u8);

    /// Render up to `count` mono samples into `buffer[offset..]`.
    /// Returns the number actually written; 0 means the chip is exhausted.
    fn render_into(&mut self, count: usize, buffer: &mut [i16], offset: usize) -> usize;
}

/// Silent chip: accepts every write and renders zeros.
#[derive(Debug, Clone)]
pub struct NullSid {
    sample_rate: u32,
    clock: SidClock,
}

impl NullSid {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            clock: SidClock::Pal,
        }
    }
}

impl SidChip for NullSid {
    fn clock(&self) -> SidClock {
        self.clock
    }

    fn model(&self) -> ChipModel {
        ChipModel::Mos6581
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn poke(&mut self, _reg: u8, _value: u8) {}

    fn poke_digi(&mut self, _address: u16, _value: u8) {}

    fn render_into(&mut self, count: usize, buffer: &mut [i16], offset: usize) -> usize {
        let end = offset.saturating_add(count).min(buffer.len());
        if offset >= end {
            return 0;
        }
        buffer[offset..end].fill(0);
        end - offset
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_rates() {
        assert_eq!(SidClock::Pal.hz(), 985_248);
        assert_eq!(SidClock::Ntsc.hz(), 1_022_730);
    }

    #[test]
    fn test_model_parse() {
        assert_eq!(ChipModel::parse("8580"), Some(ChipModel::Mos8580));
        assert_eq!(ChipModel::parse("MOS6581"), Some(ChipModel::Mos6581));
        assert_eq!(ChipModel::parse("6502"), None);
    }

    #[test]
    fn test_null_sid_renders_silence() {
        let mut sid = NullSid::new(44_100);
        let mut buf = [7i16; 8];
        assert_eq!(sid.render_into(4, &mut buf, 2), 4);
        assert_eq!(buf, [7, 7, 0, 0, 0, 0, 7, 7]);
        assert_eq!(sid.render_into(10, &mut buf, 6), 2);
        assert!((sid.samples_per_tick() - 44_100.0 / 985_248.0).abs() < 1e-12);
    }
}
