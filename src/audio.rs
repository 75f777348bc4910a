// cpal output. The player is built on, and then owned by, the audio
// thread; the front end talks to it only through crossbeam channels.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver, Sender};

use crate::player::Player;
use crate::sid_device::SidChip;

// ─────────────────────────────────────────────────────────────────────────────
//  Public message types
// ─────────────────────────────────────────────────────────────────────────────

/// Commands sent from the front end → audio thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerCmd {
    NextTrack,
    PrevTrack,
    Stop,
    Resume,
}

/// Status updates sent from the audio thread → front end, on change only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerStatus {
    /// 0-based.
    pub track: u8,
    pub tracks: u8,
    pub playing: bool,
    pub finished: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
//  Callback body
// ─────────────────────────────────────────────────────────────────────────────

/// Everything the output callback owns.
pub struct Renderer<C: SidChip> {
    player: Player<C>,
    cmd_rx: Receiver<PlayerCmd>,
    status_tx: Sender<PlayerStatus>,
    scratch: Vec<i16>,
    last_status: Option<PlayerStatus>,
}

impl<C: SidChip> Renderer<C> {
    pub fn new(
        player: Player<C>,
        cmd_rx: Receiver<PlayerCmd>,
        status_tx: Sender<PlayerStatus>,
    ) -> Self {
        Self {
            player,
            cmd_rx,
            status_tx,
            scratch: Vec::new(),
            last_status: None,
        }
    }

    pub fn player(&self) -> &Player<C> {
        &self.player
    }

    /// Fill one interleaved output buffer. The mono stream is copied to
    /// every channel; whatever the player cannot supply is silence.
    pub fn process(&mut self, data: &mut [f32], channels: usize) {
        while let Ok(cmd) = self.cmd_rx.try_recv() {
            self.apply(cmd);
        }

        let channels = channels.max(1);
        let frames = data.len() / channels;
        if self.scratch.len() < frames {
            self.scratch.resize(frames, 0);
        }

        let written = self.player.fill(frames, &mut self.scratch, 0);
        for (f, frame) in data.chunks_mut(channels).enumerate() {
            let v = if f < written {
                self.scratch[f] as f32 / 32768.0
            } else {
                0.0
            };
            frame.fill(v);
        }

        self.publish();
    }

    fn apply(&mut self, cmd: PlayerCmd) {
        match cmd {
            PlayerCmd::NextTrack => {
                self.player.next_track();
                self.player.play();
            }
            PlayerCmd::PrevTrack => {
                self.player.prev_track();
                self.player.play();
            }
            PlayerCmd::Stop => self.player.stop(),
            PlayerCmd::Resume => self.player.play(),
        }
    }

    fn publish(&mut self) {
        let status = PlayerStatus {
            track: self.player.track().unwrap_or(0),
            tracks: self.player.tracks().unwrap_or(0),
            playing: self.player.is_ready(),
            finished: self.player.is_finished(),
        };
        if self.last_status != Some(status) && self.status_tx.try_send(status).is_ok() {
            self.last_status = Some(status);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
//  Audio thread  (owns the !Send cpal::Stream)
// ─────────────────────────────────────────────────────────────────────────────

pub struct AudioOutput {
    sample_rate: u32,
    cmd_tx: Sender<PlayerCmd>,
    status_rx: Receiver<PlayerStatus>,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl AudioOutput {
    /// Open the default output device and start playing. `make_player` is
    /// called on the audio thread with the device's native sample rate.
    pub fn start<C, F>(make_player: F) -> Result<Self, String>
    where
        C: SidChip + Send + 'static,
        F: FnOnce(u32) -> Result<Player<C>, String> + Send + 'static,
    {
        let (cmd_tx, cmd_rx) = bounded::<PlayerCmd>(64);
        let (status_tx, status_rx) = bounded::<PlayerStatus>(16);
        let (result_tx, result_rx) = bounded::<Result<u32, String>>(1);
        let shutdown = Arc::new(AtomicBool::new(false));
        let stop = shutdown.clone();

        let thread = thread::Builder::new()
            .name("sid-audio".into())
            .spawn(move || {
                let result = (|| -> Result<(cpal::Stream, u32), String> {
                    let host = cpal::default_host();
                    let device = host
                        .default_output_device()
                        .ok_or_else(|| "No audio output device found".to_string())?;
                    let dev_name = device.name().unwrap_or_else(|_| "unknown".into());

                    let default_config = device
                        .default_output_config()
                        .map_err(|e| format!("No default output config: {e}"))?;
                    let rate = default_config.sample_rate().0;
                    let channels = default_config.channels() as usize;
                    log::info!(
                        "audio device '{}', {} Hz, {} channel(s)",
                        dev_name,
                        rate,
                        channels
                    );

                    let player = make_player(rate)?;
                    let mut renderer = Renderer::new(player, cmd_rx, status_tx);

                    let config = cpal::StreamConfig {
                        channels: channels as u16,
                        sample_rate: cpal::SampleRate(rate),
                        buffer_size: cpal::BufferSize::Default,
                    };
                    let stream = device
                        .build_output_stream(
                            &config,
                            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                                renderer.process(data, channels);
                            },
                            move |err| log::error!("audio stream error: {err}"),
                            None,
                        )
                        .map_err(|e| format!("build_output_stream failed: {e}"))?;
                    stream
                        .play()
                        .map_err(|e| format!("stream.play() failed: {e}"))?;
                    Ok((stream, rate))
                })();

                match result {
                    Ok((stream, rate)) => {
                        let _ = result_tx.send(Ok(rate));
                        while !stop.load(Ordering::Relaxed) {
                            thread::park_timeout(Duration::from_millis(100));
                        }
                        drop(stream);
                        log::debug!("audio thread exiting");
                    }
                    Err(e) => {
                        let _ = result_tx.send(Err(e));
                    }
                }
            })
            .map_err(|e| format!("spawn audio thread: {e}"))?;

        let sample_rate = result_rx
            .recv()
            .map_err(|_| "Audio thread died before reporting status".to_string())??;

        Ok(Self {
            sample_rate,
            cmd_tx,
            status_rx,
            shutdown,
            thread: Some(thread),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Queue a command; false if the audio thread is gone.
    pub fn send(&self, cmd: PlayerCmd) -> bool {
        self.cmd_tx.try_send(cmd).is_ok()
    }

    pub fn status(&self) -> &Receiver<PlayerStatus> {
        &self.status_rx
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(t) = self.thread.take() {
            t.thread().unpark();
            let _ = t.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Memory;
    use crate::player::EntryPoints;
    use crate::sid_device::mock::RecordingChip;

    fn renderer(subsongs: u8) -> (Renderer<RecordingChip>, Sender<PlayerCmd>, Receiver<PlayerStatus>) {
        let mut mem = Memory::new();
        mem.write(0x1000, 0x60);
        let mut player = Player::new(RecordingChip::new(44_100));
        player.load(
            mem,
            EntryPoints {
                init_addr: 0x1000,
                play_addr: 0x1000,
                subsong_count: subsongs,
                ..EntryPoints::default()
            },
        );
        player.play();
        let (cmd_tx, cmd_rx) = bounded(8);
        let (status_tx, status_rx) = bounded(8);
        (Renderer::new(player, cmd_rx, status_tx), cmd_tx, status_rx)
    }

    #[test]
    fn test_mono_copied_to_all_channels() {
        let (mut r, _tx, status) = renderer(0);
        let mut data = vec![9.0f32; 64];
        r.process(&mut data, 2);
        let expected = 1.0 / 32768.0;
        assert!(data.iter().all(|&s| s == expected));
        let st = status.try_recv().unwrap();
        assert!(st.playing && !st.finished);
    }

    #[test]
    fn test_commands_reach_player() {
        let (mut r, tx, status) = renderer(2);
        let mut data = vec![0.0f32; 32];
        r.process(&mut data, 1);
        assert_eq!(status.try_recv().unwrap().track, 0);

        tx.send(PlayerCmd::NextTrack).unwrap();
        r.process(&mut data, 1);
        let st = status.try_recv().unwrap();
        assert_eq!((st.track, st.tracks, st.playing), (1, 2, true));

        tx.send(PlayerCmd::Stop).unwrap();
        r.process(&mut data, 1);
        assert!(!status.try_recv().unwrap().playing);
        assert!(data.iter().all(|&s| s == 0.0));

        tx.send(PlayerCmd::Resume).unwrap();
        tx.send(PlayerCmd::PrevTrack).unwrap();
        r.process(&mut data, 1);
        assert_eq!(r.player().track(), Some(0));
    }

    #[test]
    fn test_status_only_sent_on_change() {
        let (mut r, _tx, status) = renderer(0);
        let mut data = vec![0.0f32; 16];
        r.process(&mut data, 2);
        r.process(&mut data, 2);
        r.process(&mut data, 2);
        assert!(status.try_recv().is_ok());
        assert!(status.try_recv().is_err());
    }

    #[test]
    fn test_exhausted_chip_reports_finished() {
        let (mut r, _tx, status) = renderer(0);
        r.player.chip_mut().budget = Some(0);
        let mut data = vec![1.0f32; 16];
        r.process(&mut data, 2);
        let st = status.try_recv().unwrap();
        assert!(st.finished && !st.playing);
        assert!(data.iter().all(|&s| s == 0.0));
    }
}
