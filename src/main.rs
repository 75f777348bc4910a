use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;

use clap::Parser;
use crossbeam_channel::{never, select, unbounded, Receiver};

use sidvm::audio::{AudioOutput, PlayerCmd, PlayerStatus};
use sidvm::config::Config;
use sidvm::sid_emulated::EmulatedSid;
use sidvm::{load_sid, ChipModel, Player, SidClock, SidFile};

/// Samples rendered per step in headless mode.
const HEADLESS_CHUNK: usize = 4096;

#[derive(Parser, Debug)]
#[command(
    name = "sidvm",
    version,
    about = "Play C64 SID tunes on an interpreted 6510 and a resid chip."
)]
struct Args {
    /// PSID/RSID file to play.
    file: PathBuf,

    /// Track to start on (1-based). Defaults to the file's start song.
    #[arg(long, value_name = "N")]
    track: Option<u16>,

    /// Force the NTSC chip clock.
    #[arg(long, default_value_t = false)]
    ntsc: bool,

    /// Chip model: 6581 or 8580.
    #[arg(long, value_name = "MODEL", value_parser = parse_model)]
    model: Option<ChipModel>,

    /// Output sample rate for headless rendering. Live playback uses the
    /// audio device's rate.
    #[arg(long, value_name = "HZ")]
    rate: Option<u32>,

    /// Stop each track after this many seconds (0 = never).
    #[arg(long, value_name = "SECS")]
    length: Option<u32>,

    /// Render this many seconds without an audio device and print statistics.
    #[arg(long, value_name = "SECS")]
    headless: Option<u32>,

    /// Bypass the C64 board output filter.
    #[arg(long, default_value_t = false)]
    no_filter: bool,

    /// Store the settings given on this command line as the new defaults.
    #[arg(long, default_value_t = false)]
    save_config: bool,
}

fn parse_model(s: &str) -> Result<ChipModel, String> {
    ChipModel::parse(s).ok_or_else(|| format!("unknown chip model '{s}' (use 6581 or 8580)"))
}

/// Everything needed to build a player once the output rate is known.
#[derive(Debug, Clone)]
struct Setup {
    clock: SidClock,
    model: ChipModel,
    external_filter: bool,
    frame_limit: Option<u32>,
    track: Option<u16>,
}

/// Stored settings with this run's command-line flags applied.
fn effective_config(args: &Args, mut config: Config) -> Config {
    if args.ntsc {
        config.clock = SidClock::Ntsc;
    }
    if let Some(model) = args.model {
        config.chip_model = model;
    }
    if let Some(rate) = args.rate {
        config.sample_rate = rate;
    }
    if let Some(secs) = args.length {
        config.default_song_length_secs = secs;
    }
    if args.no_filter {
        config.external_filter = false;
    }
    config
}

impl Setup {
    fn new(config: &Config, sid: &SidFile, track: Option<u16>) -> Self {
        let clock = if sid.header.is_pal {
            config.clock
        } else {
            SidClock::Ntsc
        };
        Self {
            clock,
            model: config.chip_model,
            external_filter: config.external_filter,
            frame_limit: config.frame_limit(),
            track,
        }
    }

    fn build(&self, sid: SidFile, sample_rate: u32) -> Result<Player<EmulatedSid>, String> {
        let mut chip = EmulatedSid::new(self.clock, self.model, sample_rate)?;
        chip.set_external_filter(self.external_filter);

        let mut player = Player::new(chip);
        player.set_frame_limit(self.frame_limit);
        player.load_file(sid);
        if let Some(track) = self.track {
            player.change_track(track as i32 - 1);
        }
        player.play();
        Ok(player)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
//  Headless rendering
// ─────────────────────────────────────────────────────────────────────────────

fn render_headless(setup: &Setup, sid: SidFile, rate: u32, secs: u32) -> Result<(), String> {
    let mut player = setup.build(sid, rate)?;
    if let Some(info) = player.info_string() {
        println!("{info}");
    }

    let total = rate as usize * secs as usize;
    let mut buf = vec![0i16; HEADLESS_CHUNK];
    let mut rendered = 0usize;
    let mut peak = 0i32;
    let mut sum_sq = 0f64;

    while rendered < total {
        let want = HEADLESS_CHUNK.min(total - rendered);
        let n = player.fill(want, &mut buf, 0);
        if n == 0 {
            break;
        }
        for &s in &buf[..n] {
            peak = peak.max((s as i32).abs());
            sum_sq += s as f64 * s as f64;
        }
        rendered += n;
        if player.is_finished() {
            break;
        }
    }

    let rms = if rendered > 0 {
        (sum_sq / rendered as f64).sqrt()
    } else {
        0.0
    };
    log::info!(
        "rendered {} samples ({:.2} s), {} frames, {} samples/frame",
        rendered,
        rendered as f64 / rate as f64,
        player.frames_played(),
        player.samples_per_frame()
    );
    println!(
        "samples={rendered} frames={} peak={peak} rms={rms:.1} finished={}",
        player.frames_played(),
        player.is_finished()
    );
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
//  Interactive playback
// ─────────────────────────────────────────────────────────────────────────────

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = unbounded();
    let _ = thread::Builder::new()
        .name("stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    rx
}

fn print_status(sid: &SidFile, status: &PlayerStatus) {
    let state = if status.finished {
        "finished"
    } else if status.playing {
        "playing"
    } else {
        "stopped"
    };
    println!("{} [{state}]", sid.info_string(status.track));
}

fn play_interactive(setup: Setup, sid: SidFile) -> Result<(), String> {
    let shown = sid.clone();
    let output = AudioOutput::start(move |rate| setup.build(sid, rate))?;
    log::info!("playing at {} Hz", output.sample_rate());
    println!("commands: n = next, p = previous, s = stop, r = resume, q = quit");

    let mut lines = spawn_stdin_reader();
    let mut stdin_closed = false;
    loop {
        if stdin_closed {
            lines = never();
            stdin_closed = false;
        }
        select! {
            recv(lines) -> line => match line {
                Ok(line) => {
                    let cmd = match line.trim() {
                        "n" => PlayerCmd::NextTrack,
                        "p" => PlayerCmd::PrevTrack,
                        "s" => PlayerCmd::Stop,
                        "r" => PlayerCmd::Resume,
                        "q" => break,
                        "" => continue,
                        other => {
                            println!("unknown command '{other}'");
                            continue;
                        }
                    };
                    if !output.send(cmd) {
                        return Err("audio thread stopped".into());
                    }
                }
                // stdin closed: keep playing until the tune ends
                Err(_) => stdin_closed = true,
            },
            recv(output.status()) -> status => match status {
                Ok(status) => {
                    print_status(&shown, &status);
                    if status.finished {
                        break;
                    }
                }
                Err(_) => break,
            },
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
//  Entry point
// ─────────────────────────────────────────────────────────────────────────────

fn run(args: Args) -> Result<(), String> {
    let config = effective_config(&args, Config::load());
    if args.save_config {
        let path = config.save()?;
        println!("settings saved to {}", path.display());
    }

    let data = std::fs::read(&args.file)
        .map_err(|e| format!("Cannot read {}: {e}", args.file.display()))?;
    let sid = load_sid(&data).map_err(|e| format!("{}: {e}", args.file.display()))?;
    log::info!("md5 {}", sid.hvsc_md5());

    let setup = Setup::new(&config, &sid, args.track);
    log::debug!("{setup:?}");

    match args.headless {
        Some(secs) => render_headless(&setup, sid, config.sample_rate, secs),
        None => {
            if let Some(rate) = args.rate {
                log::warn!("--rate {rate} only applies with --headless; using the device rate");
            }
            play_interactive(setup, sid)
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            eprintln!("sidvm: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(cmdline: &[&str]) -> Args {
        Args::try_parse_from(cmdline).unwrap()
    }

    #[test]
    fn test_flags_override_stored_config() {
        let stored = Config {
            default_song_length_secs: 120,
            ..Config::default()
        };
        let a = args(&[
            "sidvm", "tune.sid", "--ntsc", "--model", "8580", "--rate", "22050", "--no-filter",
        ]);
        let c = effective_config(&a, stored.clone());
        assert_eq!(c.clock, SidClock::Ntsc);
        assert_eq!(c.chip_model, ChipModel::Mos8580);
        assert_eq!(c.sample_rate, 22_050);
        assert!(!c.external_filter);
        assert_eq!(c.default_song_length_secs, 120);

        let c = effective_config(&args(&["sidvm", "tune.sid", "--length", "0"]), stored.clone());
        assert_eq!(c.frame_limit(), None);
        assert_eq!(effective_config(&args(&["sidvm", "x.sid"]), stored.clone()), stored);
    }

    #[test]
    fn test_rejects_unknown_model() {
        assert!(Args::try_parse_from(["sidvm", "x.sid", "--model", "6582"]).is_err());
        assert!(!args(&["sidvm", "x.sid"]).save_config);
        assert!(args(&["sidvm", "x.sid", "--save-config"]).save_config);
    }
}
