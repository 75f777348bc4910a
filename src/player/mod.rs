// Playback scheduler. Owns the memory image, the CPU and the sound chip
// for one tune, calls the play routine once per frame and turns the
// CIA timer value into a sample count for the chip to render.

pub mod sid_file;

use crate::cpu::Cpu;
use crate::memory::{Memory, SidBus, CIA1_TIMER_A_LO, IRQ_VECTOR, SID_VOL_REG};
use crate::sid_device::SidChip;
use sid_file::{SidFile, SidHeader};

// ─────────────────────────────────────────────────────────────────────────────
//  Timing constants
// ─────────────────────────────────────────────────────────────────────────────

/// Frame length used for vertical-blank tunes and as the timer fallback.
pub const DEFAULT_FRAME_US: u32 = 20_000;

/// Timer A latch of a stock PAL machine; maps to [`DEFAULT_FRAME_US`].
pub const CIA_PAL_LATCH: u32 = 0x4C00;

/// Frames per second assumed when converting song lengths.
pub const FRAMES_PER_SEC: u32 = 50;

/// Instruction budget for init routines (some decrunch before returning).
const INIT_STEP_LIMIT: u32 = 2_000_000;
/// Instruction budget for a single play call.
const PLAY_STEP_LIMIT: u32 = 200_000;

/// Highest chip register cleared when playback ends.
const LAST_CLEARED_REG: u8 = 24;

// ─────────────────────────────────────────────────────────────────────────────
//  Tune entry points
// ─────────────────────────────────────────────────────────────────────────────

/// What the scheduler needs to know about a tune besides its memory image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryPoints {
    pub init_addr: u16,
    /// 0 = read from $0314/$0315 after running init once.
    pub play_addr: u16,
    /// Highest valid 0-based track.
    pub subsong_count: u8,
    pub start_track: u8,
    /// 0 = fixed 50 Hz frames, otherwise CIA timer driven.
    pub speed_flag: u8,
}

impl From<&SidHeader> for EntryPoints {
    fn from(h: &SidHeader) -> Self {
        Self {
            init_addr: h.init_address,
            play_addr: h.play_address,
            subsong_count: h.subsong_count,
            start_track: h.start_track,
            speed_flag: h.speed_flag,
        }
    }
}

/// Frame length in microseconds for a CIA timer A value.
/// A zero timer or a vertical-blank tune gets [`DEFAULT_FRAME_US`].
pub fn frame_us_for_timer(timer: u16, speed_flag: u8) -> u32 {
    let us = (DEFAULT_FRAME_US as u64 * timer as u64 / CIA_PAL_LATCH as u64) as u32;
    if us == 0 || speed_flag == 0 {
        DEFAULT_FRAME_US
    } else {
        us
    }
}

/// Whole samples covered by `frame_us` at `sample_rate`.
pub fn samples_for_frame(sample_rate: u32, frame_us: u32) -> u32 {
    (sample_rate as u64 * frame_us as u64 / 1_000_000) as u32
}

// ─────────────────────────────────────────────────────────────────────────────
//  Player
// ─────────────────────────────────────────────────────────────────────────────

struct Session {
    mem: Memory,
    cpu: Cpu,
    entry: EntryPoints,
    track: u8,
}

pub struct Player<C: SidChip> {
    chip: C,
    session: Option<Session>,
    tune: Option<SidFile>,

    play_active: bool,
    samples_per_frame: u32,
    /// `None` once the tune has ended.
    samples_to_next_frame: Option<u32>,

    ready: bool,
    finished: bool,

    frame_limit: Option<u32>,
    frames_played: u32,
}

impl<C: SidChip> Player<C> {
    pub fn new(chip: C) -> Self {
        let samples_per_frame = chip.sample_rate() / FRAMES_PER_SEC;
        Self {
            chip,
            session: None,
            tune: None,
            play_active: true,
            samples_per_frame,
            samples_to_next_frame: Some(0),
            ready: false,
            finished: false,
            frame_limit: None,
            frames_played: 0,
        }
    }

    // ── Loading ──────────────────────────────────────────────────────────

    /// Install a memory image and select the start track. Playback stays
    /// stopped until [`Player::play`].
    pub fn load(&mut self, memory: Memory, entry: EntryPoints) {
        self.stop();
        self.tune = None;
        self.session = Some(Session {
            mem: memory,
            cpu: Cpu::new(),
            entry,
            track: entry.start_track,
        });
        self.play_active = true;
        self.finished = false;
        self.samples_per_frame = self.chip.sample_rate() / FRAMES_PER_SEC;

        if entry.play_addr == 0 {
            self.call(entry.init_addr, 0, INIT_STEP_LIMIT);
            if let Some(s) = self.session.as_mut() {
                s.entry.play_addr = s.mem.read_u16(IRQ_VECTOR);
                log::debug!(
                    "init installed play routine at ${:04X}",
                    s.entry.play_addr
                );
            }
        }

        self.chip.poke(SID_VOL_REG, 0x0F);
        self.change_track(entry.start_track as i32);
    }

    /// Load a parsed tune file and keep it for [`Player::tune`].
    pub fn load_file(&mut self, sid: SidFile) {
        log::info!(
            "loading \"{}\" by {} ({} track(s), {})",
            sid.header.name,
            sid.header.author,
            sid.header.subsong_count as u16 + 1,
            if sid.header.is_pal { "PAL" } else { "NTSC" },
        );
        let memory = sid.memory_image();
        let entry = EntryPoints::from(&sid.header);
        self.load(memory, entry);
        self.tune = Some(sid);
    }

    // ── Track selection ──────────────────────────────────────────────────

    /// Restart the tune on track `track` (0-based). Out-of-range values
    /// are ignored. Leaves the player stopped.
    pub fn change_track(&mut self, track: i32) {
        let Some(subsongs) = self.session.as_ref().map(|s| s.entry.subsong_count) else {
            return;
        };
        if track < 0 || track > subsongs as i32 {
            log::debug!("track {} out of range 0..={}", track, subsongs);
            return;
        }
        let track = track as u8;

        self.stop();
        let init = match self.session.as_mut() {
            Some(s) => {
                s.cpu.reset(&SidBus::detached(&mut s.mem));
                s.track = track;
                s.entry.init_addr
            }
            None => return,
        };
        self.call(init, track, INIT_STEP_LIMIT);

        self.finished = false;
        self.play_active = true;
        self.frames_played = 0;
        self.samples_to_next_frame = Some(0);
        log::info!("track {}/{}", track as u16 + 1, subsongs as u16 + 1);

        self.advance_frame();
    }

    pub fn next_track(&mut self) {
        if let Some(t) = self.track() {
            self.change_track(t as i32 + 1);
        }
    }

    pub fn prev_track(&mut self) {
        if let Some(t) = self.track() {
            self.change_track(t as i32 - 1);
        }
    }

    // ── Frame scheduling ─────────────────────────────────────────────────

    /// Run one play call and schedule the next frame, or end the tune if
    /// play has been switched off.
    pub fn advance_frame(&mut self) {
        let Some((play, speed_flag)) = self
            .session
            .as_ref()
            .map(|s| (s.entry.play_addr, s.entry.speed_flag))
        else {
            return;
        };

        if !self.play_active {
            for reg in 0..=LAST_CLEARED_REG {
                self.chip.poke(reg, 0);
            }
            self.samples_to_next_frame = None;
            self.finished = true;
            log::info!("playback finished after {} frame(s)", self.frames_played);
            return;
        }

        self.call(play, 0, PLAY_STEP_LIMIT);

        let timer = self
            .session
            .as_ref()
            .map_or(0, |s| s.mem.read_u16(CIA1_TIMER_A_LO));
        let frame_us = frame_us_for_timer(timer, speed_flag);
        let spf = samples_for_frame(self.chip.sample_rate(), frame_us);
        if spf != self.samples_per_frame {
            log::debug!("frame {} us ({} samples, timer ${:04X})", frame_us, spf, timer);
        }
        self.samples_per_frame = spf;
        self.samples_to_next_frame = Some(self.samples_to_next_frame.unwrap_or(0) + spf);

        self.frames_played = self.frames_played.saturating_add(1);
        if self.frame_limit.is_some_and(|limit| self.frames_played >= limit) {
            log::debug!("frame limit reached");
            self.play_active = false;
        }
    }

    /// Render up to `count` samples into `buffer[offset..]`, running the
    /// play routine at every frame boundary on the way. Returns the number
    /// of samples written; 0 ends playback.
    pub fn fill(&mut self, count: usize, buffer: &mut [i16], offset: usize) -> usize {
        if !self.ready {
            return 0;
        }
        let count = count.min(buffer.len().saturating_sub(offset));
        let mut pos = offset;
        let mut remaining = count;

        log::trace!("fill {} ({:?} to next frame)", count, self.samples_to_next_frame);

        loop {
            match self.samples_to_next_frame {
                Some(next) if next as usize <= remaining => {
                    if next > 0 {
                        let generated = self.chip.render_into(next as usize, buffer, pos);
                        pos += generated;
                        remaining -= generated;
                        self.samples_to_next_frame = Some(next.saturating_sub(generated as u32));
                        // Short render: the chip ran dry before the frame boundary.
                        if generated < next as usize {
                            break;
                        }
                    }
                    self.advance_frame();
                    if self.samples_to_next_frame == Some(0) {
                        // Zero-length frames: nothing left to schedule this call.
                        self.render_tail(buffer, &mut pos, &mut remaining);
                        break;
                    }
                }
                // Next boundary past the request, or the tune has ended and
                // the muted chip plays out the rest.
                Some(_) | None => {
                    self.render_tail(buffer, &mut pos, &mut remaining);
                    break;
                }
            }
        }

        let written = pos - offset;
        if written == 0 && count > 0 {
            log::trace!("chip exhausted");
            self.ready = false;
            self.finished = true;
        }
        written
    }

    fn render_tail(&mut self, buffer: &mut [i16], pos: &mut usize, remaining: &mut usize) {
        if *remaining == 0 {
            return;
        }
        let generated = self.chip.render_into(*remaining, buffer, *pos);
        *pos += generated;
        *remaining -= generated;
        if let Some(next) = self.samples_to_next_frame.as_mut() {
            *next = next.saturating_sub(generated as u32);
        }
    }

    /// Allocating convenience around [`Player::fill`].
    pub fn generate(&mut self, count: usize) -> Vec<i16> {
        let mut out = vec![0i16; count];
        let written = self.fill(count, &mut out, 0);
        out.truncate(written);
        out
    }

    // ── Transport ────────────────────────────────────────────────────────

    /// Allow [`Player::fill`] to render. No effect without a tune or after
    /// it has finished.
    pub fn play(&mut self) {
        self.ready = self.session.is_some() && !self.finished;
    }

    pub fn stop(&mut self) {
        self.ready = false;
    }

    /// End the tune after `frames` play calls per track (`None` = never).
    pub fn set_frame_limit(&mut self, frames: Option<u32>) {
        self.frame_limit = frames;
    }

    pub fn frame_limit(&self) -> Option<u32> {
        self.frame_limit
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn is_loaded(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Current 0-based track.
    pub fn track(&self) -> Option<u8> {
        self.session.as_ref().map(|s| s.track)
    }

    /// Highest 0-based track.
    pub fn tracks(&self) -> Option<u8> {
        self.session.as_ref().map(|s| s.entry.subsong_count)
    }

    pub fn entry_points(&self) -> Option<EntryPoints> {
        self.session.as_ref().map(|s| s.entry)
    }

    pub fn samples_per_frame(&self) -> u32 {
        self.samples_per_frame
    }

    pub fn samples_to_next_frame(&self) -> Option<u32> {
        self.samples_to_next_frame
    }

    pub fn frames_played(&self) -> u32 {
        self.frames_played
    }

    pub fn tune(&self) -> Option<&SidFile> {
        self.tune.as_ref()
    }

    /// [`SidFile::info_string`] for the current track.
    pub fn info_string(&self) -> Option<String> {
        let track = self.track()?;
        self.tune.as_ref().map(|t| t.info_string(track))
    }

    pub fn memory(&self) -> Option<&Memory> {
        self.session.as_ref().map(|s| &s.mem)
    }

    pub fn cpu(&self) -> Option<&Cpu> {
        self.session.as_ref().map(|s| &s.cpu)
    }

    pub fn chip(&self) -> &C {
        &self.chip
    }

    pub fn chip_mut(&mut self) -> &mut C {
        &mut self.chip
    }

    pub fn into_chip(self) -> C {
        self.chip
    }

    // ── Internal ─────────────────────────────────────────────────────────

    fn call(&mut self, entry: u16, a: u8, max_steps: u32) -> u64 {
        let Some(s) = self.session.as_mut() else {
            return 0;
        };
        let mut bus = SidBus::new(&mut s.mem, Some(&mut self.chip));
        s.cpu.run_subroutine_limited(&mut bus, entry, a, max_steps)
    }
}
