//! Command line player for single notes on the emulated sound channels
#![forbid(unsafe_code)]

use {
    clap::Parser,
    crossterm::{QueueableCommand, SynchronizedUpdate, cursor, terminal},
    spusynth::{
        AMPL_THRESHOLD, Channel, ChannelState, Channels, Interpolation, NoteParams,
        PendingRegister, RepeatMode, SampleFormat, SampleRate, SampleSource, Sequencer, Synth,
        SynthConfig, TrackId, TrackParams, TrackUpdateFlags, timing::timer_for_rate,
    },
    std::{
        io::{ErrorKind, IsTerminal, Write as _},
        path::PathBuf,
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
    },
    string_width::DisplayWidth,
};

#[derive(clap::Parser)]
struct Args {
    /// Path to raw signed PCM sample data. Plays a square wave or noise when omitted.
    path: Option<PathBuf>,
    /// Sample data is 8 bit (default is 16 bit little endian)
    #[arg(long)]
    pcm8: bool,
    /// Rate the sample data was recorded at
    #[arg(long, default_value = "32728")]
    source_rate: u32,
    /// Loop the sample from this sample index to its end
    #[arg(long)]
    loop_start: Option<u32>,
    /// Square wave duty (0-7) when no sample is given. Plays noise if not set.
    #[arg(long)]
    duty: Option<u8>,
    /// Output sample rate
    #[arg(short = 'r', long, default_value = "44100")]
    sample_rate: SampleRate,
    /// Interpolation (none, linear, lagrange4, lagrange6, sinc)
    #[arg(short = 'i', long, default_value = "linear")]
    interpolation: Interpolation,
    /// Key to play
    #[arg(long, default_value = "60")]
    key: u8,
    /// Key the sample plays at its recorded rate
    #[arg(long, default_value = "60")]
    org_key: u8,
    /// Note velocity (0-127)
    #[arg(long, default_value = "127")]
    velocity: u8,
    /// Attack rate (0-127)
    #[arg(long, default_value = "127")]
    attack: u8,
    /// Decay rate (0-127)
    #[arg(long, default_value = "127")]
    decay: u8,
    /// Sustain level (0-127)
    #[arg(long, default_value = "127")]
    sustain: u8,
    /// Release rate (0-127)
    #[arg(long, default_value = "100")]
    release: u8,
    /// Note length in ticks (192 per second)
    #[arg(short = 'l', long, default_value = "192")]
    length: i32,
    /// Buffer size in bytes to render to
    #[arg(short = 'b', long, default_value = "16384")]
    buf_size: usize,
    /// Disable visualization/info dump
    #[arg(long)]
    no_vis: bool,
}

/// Plays one note on one channel, then waits for it to fade out
struct NotePlayer {
    pending: Option<PendingRegister>,
    channel: usize,
    note: NoteParams,
    track: TrackParams,
}

impl NotePlayer {
    fn finished(&self, channels: &Channels) -> bool {
        self.pending.is_none() && channels[self.channel].is_idle()
    }
}

impl Sequencer for NotePlayer {
    fn tick(&mut self, channels: &mut Channels) {
        self.track.update_flags = TrackUpdateFlags::LENGTH;
        if let Some(pending) = self.pending.take() {
            channels[self.channel].note_on(pending, 0, 64, self.note, &self.track);
        }
    }
    fn track(&self, id: TrackId) -> Option<&TrackParams> {
        (id == 0).then_some(&self.track)
    }
    fn end_tick(&mut self) {
        self.track.update_flags = TrackUpdateFlags::empty();
    }
}

fn load_note(args: &Args) -> Result<(PendingRegister, usize), String> {
    let timer = timer_for_rate(args.source_rate);
    let Some(path) = &args.path else {
        return Ok(match args.duty {
            Some(duty) => (PendingRegister::psg(duty, timer), 8),
            None => (PendingRegister::psg(0, timer), 14),
        });
    };
    let data = std::fs::read(path).map_err(|e| format!("Failed to read '{}': {e}", path.display()))?;
    let (format, n_samples) = if args.pcm8 {
        (SampleFormat::Pcm8, data.len())
    } else {
        (SampleFormat::Pcm16, data.len() / 2)
    };
    let n_samples = u32::try_from(n_samples).map_err(|_| "Sample data too long".to_string())?;
    let (repeat, loop_start) = match args.loop_start {
        Some(start) => (RepeatMode::Loop, start.min(n_samples)),
        None => (RepeatMode::OneShot, 0),
    };
    let loop_len = n_samples - loop_start;
    let source = if args.pcm8 {
        SampleSource::from_pcm8(&data, loop_start, loop_len)
    } else {
        SampleSource::from_pcm16_le(&data, loop_start, loop_len)
    }
    .map_err(|e| format!("Invalid sample '{}': {e}", path.display()))?;
    Ok((PendingRegister::pcm(source, format, repeat, timer), 0))
}

fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();
    let args = Args::parse();
    let vis = !args.no_vis;
    let mut stderr = std::io::stderr().lock();
    let (pending, channel) = match load_note(&args) {
        Ok(note) => note,
        Err(e) => {
            tracing::error!("{e}");
            return Err(std::io::Error::other("Sample load error"));
        }
    };
    let config = SynthConfig {
        sample_rate: args.sample_rate,
        interpolation: args.interpolation,
        mutes: 0,
    };
    let mut synth = match Synth::new(config) {
        Ok(synth) => synth,
        Err(e) => {
            tracing::error!("{e}");
            return Err(std::io::Error::other("Invalid configuration"));
        }
    };
    if vis {
        writeln!(
            stderr,
            "Source: {}\nRate: {}\nInterpolation: {}\nBufsize: {}",
            args.path
                .as_deref()
                .map_or_else(|| "PSG".into(), |p| p.display().to_string()),
            args.sample_rate,
            args.interpolation,
            args.buf_size
        )?;
    }
    let mut player = NotePlayer {
        pending: Some(pending),
        channel,
        note: NoteParams {
            key: args.key,
            org_key: args.org_key,
            velocity: args.velocity,
            note_length: args.length,
            ..NoteParams::from_adsr(args.attack, args.decay, args.sustain, args.release)
        },
        track: TrackParams::default(),
    };

    let n_samples = (args.buf_size / 2).max(2) & !1;
    let mut mix = vec![0i32; n_samples];
    let mut buf = vec![0i16; n_samples];
    let mut writer = std::io::stdout().lock();
    if writer.is_terminal() {
        writeln!(
            stderr,
            "You don't want to write sample data to a terminal. Trust me."
        )?;
        return Err(std::io::Error::other(
            "Attempting to write sample data to terminal",
        ));
    }
    let stop = Arc::new(AtomicBool::new(false));
    if vis {
        stderr.queue(terminal::EnterAlternateScreen)?;
        stderr.queue(terminal::DisableLineWrap)?;
        stderr.queue(cursor::Hide)?;
    }
    {
        let stop = stop.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            stop.store(true, Ordering::Relaxed);
        }) {
            tracing::warn!("Failed to set Ctrl+C handler: {e}");
        }
    }

    while !player.finished(synth.channels()) {
        synth.render(&mut player, &mut mix);
        for (out, &sample) in buf.iter_mut().zip(&mix) {
            *out = i16::try_from(sample).unwrap_or(if sample < 0 { i16::MIN } else { i16::MAX });
        }
        let result = writer.write_all(bytemuck::cast_slice(&buf));
        if let Err(e) = result {
            match e.kind() {
                ErrorKind::BrokenPipe => {
                    break;
                }
                _ => return Err(e),
            }
        }
        if stop.load(Ordering::Relaxed) {
            writeln!(stderr, "Gotta stop!")?;
            break;
        }
        if vis {
            stderr.sync_update(|stderr| print(stderr, &synth))??;
        }
    }
    if vis {
        stderr.queue(terminal::LeaveAlternateScreen)?;
        stderr.queue(cursor::Show)?;
    }
    stderr.flush()?;
    Ok(())
}

fn print(stderr: &mut std::io::StderrLock, synth: &Synth) -> std::io::Result<()> {
    stderr.queue(terminal::Clear(terminal::ClearType::All))?;
    writeln!(
        stderr,
        "tick {} ({} active)",
        synth.ticks(),
        synth.active_channels()
    )?;
    let labels: Vec<String> = synth.channels().iter().map(label).collect();
    let label_max = labels.iter().map(|l| l.display_width()).max().unwrap_or(0);
    for (ch, label) in synth.channels().iter().zip(&labels) {
        let fill = " ".repeat(label_max - label.display_width());
        let state = match ch.state() {
            ChannelState::None => "-",
            ChannelState::Start => "S",
            ChannelState::Attack => "A",
            ChannelState::Decay => "D",
            ChannelState::Sustain => "s",
            ChannelState::Release => "R",
        };
        let ratio = 1.0 - f64::from(ch.amplitude()) / f64::from(AMPL_THRESHOLD);
        #[expect(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let n_bars = if ch.is_idle() {
            0
        } else {
            (ratio * 48.).ceil() as usize
        };
        let bars = "█".repeat(n_bars);
        let reg = ch.register();
        writeln!(
            stderr,
            "{label}{fill} {state} vol {:3}/{} pan {:3} {bars}",
            reg.volume_mul, reg.volume_div, reg.panning
        )?;
    }
    stderr.queue(cursor::MoveTo(0, 0))?;
    Ok(())
}

fn label(ch: &Channel) -> String {
    let kind = match ch.id() {
        0..=7 => "pcm",
        8..=13 => "pcm/square",
        _ => "pcm/noise",
    };
    format!("#{:02} {kind}", ch.id())
}
