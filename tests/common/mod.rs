#![allow(dead_code)]

use sidvm::{ChipModel, SidChip, SidClock};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    Poke(u8, u8),
    Digi(u16, u8),
}

/// Chip double: records writes, renders a constant level, optionally runs dry.
#[derive(Debug)]
pub struct RecordingChip {
    pub writes: Vec<Write>,
    pub sample_rate: u32,
    pub budget: Option<usize>,
    pub rendered: usize,
}

impl RecordingChip {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            writes: Vec::new(),
            sample_rate,
            budget: None,
            rendered: 0,
        }
    }

    pub fn pokes_to(&self, reg: u8) -> Vec<u8> {
        self.writes
            .iter()
            .filter_map(|w| match *w {
                Write::Poke(r, v) if r == reg => Some(v),
                _ => None,
            })
            .collect()
    }
}

impl SidChip for RecordingChip {
    fn clock(&self) -> SidClock {
        SidClock::Pal
    }

    fn model(&self) -> ChipModel {
        ChipModel::Mos6581
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn poke(&mut self, reg: u8, value: u8) {
        self.writes.push(Write::Poke(reg, value));
    }

    fn poke_digi(&mut self, address: u16, value: u8) {
        self.writes.push(Write::Digi(address, value));
    }

    fn render_into(&mut self, count: usize, buffer: &mut [i16], offset: usize) -> usize {
        let mut n = count.min(buffer.len().saturating_sub(offset));
        if let Some(ref mut left) = self.budget {
            n = n.min(*left);
            *left -= n;
        }
        buffer[offset..offset + n].fill(100);
        self.rendered += n;
        n
    }
}

/// v2 PSID image with `code` loaded at `load`.
pub fn psid(load: u16, init: u16, play: u16, songs: u8, start: u8, speed: u8, code: &[u8]) -> Vec<u8> {
    let mut d = vec![0u8; 0x7C];
    d[0..4].copy_from_slice(b"PSID");
    d[0x05] = 2;
    d[0x07] = 0x7C;
    d[0x08..0x0A].copy_from_slice(&load.to_be_bytes());
    d[0x0A..0x0C].copy_from_slice(&init.to_be_bytes());
    d[0x0C..0x0E].copy_from_slice(&play.to_be_bytes());
    d[0x0F] = songs;
    d[0x11] = start;
    d[0x15] = speed;
    d[0x16..0x16 + 9].copy_from_slice(b"Test Tune");
    d[0x36..0x36 + 8].copy_from_slice(b"Somebody");
    d[0x56..0x56 + 4].copy_from_slice(b"1989");
    d.extend_from_slice(code);
    d
}
