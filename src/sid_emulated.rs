// Software SID using resid-rs.
//
//   Output passes through a model of the C64 mainboard RC output stage:
//     - Low-pass:  R=10kΩ, C=1000pF  → cutoff ~15.9kHz
//     - High-pass: R=10kΩ, C=10μF    → cutoff ~1.6Hz  (DC blocker)
//
// resid-rs renders by clock delta:
//   while delta > 0 {
//       let (samples, next_delta) = resid.sample(delta, &mut buffer[..], 1);
//       delta = next_delta;
//   }
// `render_into` drives that loop until the requested sample count is reached.

use resid::{SamplingMethod, Sid};

use crate::memory::{SID_REG_MASK, SID_VOL_REG};
use crate::sid_device::{ChipModel, SidChip, SidClock};

/// Give up on a render after this many `sample()` calls without finishing.
const MAX_SAMPLE_LOOPS: u32 = 50_000;

// ─────────────────────────────────────────────────────────────────────────────
//  Board output filter
// ─────────────────────────────────────────────────────────────────────────────
//
//  Circuit (from libresidfp docs):
//      SID out → 1kΩ → ─┬─ 1000pF → GND    (LP, ~15.9 kHz)
//                        └─ 10kΩ  → C 10μF → amp  (HP, ~1.59 Hz)
//
//  Fixed point, one step per output sample:
//      Vi   = input << 11
//      dVlp = (w0lp_1_s7  * (Vi  - Vlp)) >> 7
//      dVhp = (w0hp_1_s17 * (Vlp - Vhp)) >> 17
//      output = (Vlp - Vhp) >> 11

#[derive(Debug, Clone)]
struct ExternalFilter {
    vlp: i32,
    vhp: i32,
    /// LP coefficient: dt/(dt+RC_lp) × 2⁷.
    w0lp_1_s7: i32,
    /// HP coefficient: dt/(dt+RC_hp) × 2¹⁷.
    w0hp_1_s17: i32,
}

impl ExternalFilter {
    /// Coefficients for one step per output sample at `sample_rate`.
    fn new(sample_rate: u32) -> Self {
        let dt = 1.0 / sample_rate.max(1) as f64;
        // LP: R = 10 kΩ, C = 1000 pF
        let rc_lp: f64 = 10_000.0 * 1_000e-12;
        // HP: R = 10 kΩ, C = 10 μF
        let rc_hp: f64 = 10_000.0 * 10e-6;
        Self {
            vlp: 0,
            vhp: 0,
            w0lp_1_s7: ((dt / (dt + rc_lp)) * 128.0 + 0.5) as i32,
            w0hp_1_s17: ((dt / (dt + rc_hp)) * 131_072.0 + 0.5) as i32,
        }
    }

    fn reset(&mut self) {
        self.vlp = 0;
        self.vhp = 0;
    }

    #[inline(always)]
    fn clock(&mut self, input: i16) -> i16 {
        // i64 products: at audio rates the LP coefficient is large enough
        // to overflow i32 on full-scale steps.
        let vi = (input as i64) << 11;
        let dvlp = (self.w0lp_1_s7 as i64 * (vi - self.vlp as i64)) >> 7;
        let dvhp = (self.w0hp_1_s17 as i64 * (self.vlp as i64 - self.vhp as i64)) >> 17;
        self.vlp += dvlp as i32;
        self.vhp += dvhp as i32;
        ((self.vlp - self.vhp) >> 11).clamp(i16::MIN as i32, i16::MAX as i32) as i16
    }
}

// ─────────────────────────────────────────────────────────────────────────────
//  Send wrapper for resid::Sid  (Sid is !Send due to internal Rc)
// ─────────────────────────────────────────────────────────────────────────────

struct SendSid(Sid);

// The Rc inside Sid is never cloned out of it; the whole chip moves
// between threads as one value.
unsafe impl Send for SendSid {}

impl SendSid {
    fn new(model: ChipModel) -> Self {
        Self(Sid::new(resid_model(model)))
    }

    fn inner(&mut self) -> &mut Sid {
        &mut self.0
    }
}

fn resid_model(model: ChipModel) -> resid::ChipModel {
    match model {
        ChipModel::Mos6581 => resid::ChipModel::Mos6581,
        ChipModel::Mos8580 => resid::ChipModel::Mos8580,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
//  EmulatedSid
// ─────────────────────────────────────────────────────────────────────────────

pub struct EmulatedSid {
    sid: SendSid,
    ext: ExternalFilter,
    use_ext_filter: bool,

    clock: SidClock,
    model: ChipModel,
    sample_rate: u32,

    /// Last value written to the volume/filter-mode register.
    volume_reg: u8,
}

impl EmulatedSid {
    pub fn new(clock: SidClock, model: ChipModel, sample_rate: u32) -> Result<Self, String> {
        if sample_rate == 0 || sample_rate >= clock.hz() {
            return Err(format!(
                "sample rate {sample_rate} Hz not usable with a {} Hz chip clock",
                clock.hz()
            ));
        }

        let mut sid = SendSid::new(model);
        sid.inner()
            .set_sampling_parameters(SamplingMethod::Fast, clock.hz(), sample_rate);

        log::info!(
            "SID opened: {:?}, clock={}Hz, output={}Hz",
            model,
            clock.hz(),
            sample_rate
        );

        Ok(Self {
            sid,
            ext: ExternalFilter::new(sample_rate),
            use_ext_filter: true,
            clock,
            model,
            sample_rate,
            volume_reg: 0,
        })
    }

    /// Enable or bypass the board output filter.
    pub fn set_external_filter(&mut self, enabled: bool) {
        self.use_ext_filter = enabled;
        self.ext.reset();
    }

    pub fn external_filter(&self) -> bool {
        self.use_ext_filter
    }

    pub fn reset(&mut self) {
        self.sid.inner().reset();
        self.ext.reset();
        self.volume_reg = 0;
    }

    /// Zero the master volume.
    pub fn mute(&mut self) {
        self.volume_reg = 0;
        self.sid.inner().write(SID_VOL_REG, 0x00);
        self.ext.reset();
    }
}

impl SidChip for EmulatedSid {
    fn clock(&self) -> SidClock {
        self.clock
    }

    fn model(&self) -> ChipModel {
        self.model
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn poke(&mut self, reg: u8, value: u8) {
        if reg == SID_VOL_REG {
            self.volume_reg = value;
        }
        self.sid.inner().write(reg, value);
    }

    /// 4-bit sample replay: the low nibble lands in the volume register,
    /// the filter-mode bits of the last real volume write are kept.
    fn poke_digi(&mut self, address: u16, value: u8) {
        if (address & SID_REG_MASK) as u8 <= SID_VOL_REG {
            return;
        }
        let vol = (self.volume_reg & 0xF0) | (value & 0x0F);
        self.sid.inner().write(SID_VOL_REG, vol);
    }

    fn render_into(&mut self, count: usize, buffer: &mut [i16], offset: usize) -> usize {
        let end = offset.saturating_add(count).min(buffer.len());
        if offset >= end {
            return 0;
        }

        let cycles_per_sample = self.clock.hz() / self.sample_rate + 1;
        let mut pos = offset;
        let mut loops = 0u32;
        while pos < end {
            let want = (end - pos) as u32;
            let delta = want.saturating_mul(cycles_per_sample);
            let (n, _left) = self.sid.inner().sample(delta, &mut buffer[pos..end], 1);
            pos += n;
            loops += 1;
            if loops > MAX_SAMPLE_LOOPS {
                log::warn!("resid made no progress, {} samples short", end - pos);
                break;
            }
        }

        if self.use_ext_filter {
            for s in &mut buffer[offset..pos] {
                *s = self.ext.clock(*s);
            }
        }
        pos - offset
    }
}

impl Drop for EmulatedSid {
    fn drop(&mut self) {
        self.mute();
        log::debug!("software SID shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chip() -> EmulatedSid {
        EmulatedSid::new(SidClock::Pal, ChipModel::Mos6581, 44_100).unwrap()
    }

    #[test]
    fn test_rejects_unusable_rate() {
        assert!(EmulatedSid::new(SidClock::Pal, ChipModel::Mos6581, 0).is_err());
        assert!(EmulatedSid::new(SidClock::Ntsc, ChipModel::Mos8580, 2_000_000).is_err());
    }

    #[test]
    fn test_render_exact_count() {
        let mut sid = chip();
        let mut buf = vec![0i16; 1000];
        assert_eq!(sid.render_into(882, &mut buf, 100), 882);
        assert_eq!(sid.render_into(500, &mut buf, 900), 100);
        assert_eq!(sid.render_into(10, &mut buf, 1000), 0);
        assert_eq!(sid.render_into(0, &mut buf, 0), 0);
    }

    #[test]
    fn test_tone_is_audible() {
        let mut sid = chip();
        sid.set_external_filter(false);
        // Voice 1: 440-ish Hz sawtooth, instant attack, full sustain.
        sid.poke(0x00, 0x00);
        sid.poke(0x01, 0x1D);
        sid.poke(0x05, 0x00);
        sid.poke(0x06, 0xF0);
        sid.poke(0x18, 0x0F);
        sid.poke(0x04, 0x21);
        let mut buf = vec![0i16; 4410];
        assert_eq!(sid.render_into(4410, &mut buf, 0), 4410);
        let min = *buf.iter().min().unwrap();
        let max = *buf.iter().max().unwrap();
        assert!(max as i32 - min as i32 > 1000, "range {min}..{max}");
    }

    #[test]
    fn test_digi_keeps_filter_mode_bits() {
        let mut sid = chip();
        sid.poke(0x18, 0x3F);
        sid.poke_digi(0xD41D, 0x07);
        assert_eq!(sid.volume_reg, 0x3F);
        // mirror of a normal register: not a digi write
        sid.poke_digi(0xD7E4, 0x07);
        sid.mute();
        assert_eq!(sid.volume_reg, 0);
    }

    #[test]
    fn test_external_filter_blocks_dc() {
        let mut f = ExternalFilter::new(44_100);
        let mut last = 0;
        for _ in 0..200_000 {
            last = f.clock(10_000);
        }
        assert!(last.abs() < 100, "DC leaked: {last}");
    }

    #[test]
    fn test_chip_moves_across_threads() {
        let sid = chip();
        let handle = std::thread::spawn(move || sid.sample_rate());
        assert_eq!(handle.join().unwrap(), 44_100);
    }
}
