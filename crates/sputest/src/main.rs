//! Testing utilities for spusynth

use {
    anstyle::AnsiColor,
    clap::Parser,
    spusynth::{
        AMPL_THRESHOLD, Channel, ChannelState, Interpolation, NoteParams, PendingRegister,
        RepeatMode, RingBuffer, SampleFormat, SampleSource, ensure_tables_initialized,
        interpolate, tables::hardware_tables, timer_adjust,
    },
    std::{error::Error, path::PathBuf},
};

#[derive(clap::Parser)]
enum Args {
    /// Write the generated sinc and window tables
    DumpSincTables { out_path: PathBuf },
    /// Compare the generated sinc tables against a known good dump
    CompareSincTables,
    /// Write the pitch and volume tables
    DumpHardwareTables { out_path: PathBuf },
    /// Compare the pitch and volume tables against a known good dump
    CompareHardwareTables,
    /// Run every table and envelope check
    Check,
}

/// A table set that can be dumped to and compared with a file
#[derive(Clone, Copy)]
enum Tables {
    Sinc,
    Hardware,
}

impl Tables {
    fn dump(self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Self::Sinc => {
                let (sinc, window) = ensure_tables_initialized().inner();
                out.extend_from_slice(bytemuck::cast_slice(sinc));
                out.extend_from_slice(bytemuck::cast_slice(window));
            }
            Self::Hardware => {
                let (pitch, volume) = hardware_tables();
                out.extend_from_slice(bytemuck::cast_slice(pitch));
                out.extend_from_slice(volume);
            }
        }
        out
    }
    const fn clean_file(self) -> &'static str {
        match self {
            Self::Sinc => "clean-sinc.f64",
            Self::Hardware => "clean-hardware.bin",
        }
    }
    const fn name(self) -> &'static str {
        match self {
            Self::Sinc => "Sinc tables",
            Self::Hardware => "Hardware tables",
        }
    }
    fn compare(self) -> Result<bool, Box<dyn Error>> {
        let path = basedir().join(self.clean_file());
        if !path.exists() {
            return Err(format!("Need clean file at '{}'", path.display()).into());
        }
        let clean = std::fs::read(path)?;
        let ok = clean == self.dump();
        report(ok, &format!("{} match", self.name()));
        Ok(ok)
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    if let Err(e) = std::fs::create_dir_all(basedir()) {
        eprintln!("Error: Failed to create test dir: {e}");
    }
    let ok = match args {
        Args::DumpSincTables { out_path } => {
            std::fs::write(out_path, Tables::Sinc.dump())?;
            true
        }
        Args::CompareSincTables => Tables::Sinc.compare()?,
        Args::DumpHardwareTables { out_path } => {
            std::fs::write(out_path, Tables::Hardware.dump())?;
            true
        }
        Args::CompareHardwareTables => Tables::Hardware.compare()?,
        Args::Check => {
            let checks = [check_timer_clamp(), check_dc_gain(), check_envelope_rates()];
            checks.iter().all(|&ok| ok)
        }
    };
    if !ok {
        return Err("Some checks failed".into());
    }
    Ok(())
}

fn basedir() -> PathBuf {
    std::env::temp_dir().join("spusynth-test")
}

/// Every base timer and pitch must land in the hardware timer range, and raising the pitch
/// must never lower the frequency.
fn check_timer_clamp() -> bool {
    let mut bad = 0;
    for base in (0x10..=0xFFFF).step_by(0x101) {
        let mut prev = u16::MAX;
        for pitch in -0x3000..=0x3000 {
            let tmr = timer_adjust(base, pitch);
            if tmr < 0x10 || tmr > prev {
                bad += 1;
            }
            prev = tmr;
        }
    }
    report(bad == 0, &format!("Timer adjustment ({bad} bad values)"))
}

/// A constant input must come out (nearly) unchanged from every kernel
fn check_dc_gain() -> bool {
    const LEVEL: i16 = 10_000;
    let mut history = RingBuffer::default();
    for _ in 0..64 {
        history.push(LEVEL);
    }
    let mut ok = true;
    for kind in Interpolation::ALL {
        let worst = (0u8..64)
            .map(|i| {
                let ratio = f64::from(i) / 64.0;
                (interpolate(kind, &history, ratio, 1.0) - i32::from(LEVEL)).abs()
            })
            .max()
            .unwrap_or(0);
        ok &= report(worst <= 1, &format!("{kind}: DC off by up to {worst}"));
    }
    ok
}

/// Every instrument attack rate must reach full volume, and every release rate must end the
/// note, including the out of range ones.
fn check_envelope_rates() -> bool {
    let Ok(source) = SampleSource::new(vec![0i16; 16], 0, 16) else {
        return report(false, "Envelope test sample");
    };
    let pending = PendingRegister::pcm(source, SampleFormat::Pcm16, RepeatMode::Loop, 0x400);
    let mut ch = Channel::new(0, 32_768, Interpolation::None);
    let mut stuck = Vec::new();
    for rate in 0..=u8::MAX {
        ch.trigger_start(pending.clone(), None, 0, NoteParams::from_adsr(rate, 0x7F, 0x7F, 0x7F));
        let attack_ticks = (0..1000).take_while(|_| {
            ch.update();
            ch.state() == ChannelState::Attack
        });
        if attack_ticks.count() == 1000 {
            stuck.push(format!("attack {rate:#04X}"));
        }
        ch.trigger_start(pending.clone(), None, 0, NoteParams::from_adsr(0x7F, 0x7F, 0x7F, rate));
        ch.update();
        ch.release();
        // The slowest rate takes one tick per 1/128 cB
        let limit = -AMPL_THRESHOLD + 2;
        let release_ticks = (0..limit).take_while(|_| {
            ch.update();
            !ch.is_idle()
        });
        if release_ticks.count() == usize::try_from(limit).unwrap_or(usize::MAX) {
            stuck.push(format!("release {rate:#04X}"));
        }
    }
    report(
        stuck.is_empty(),
        &format!("Envelope rates (stuck: {})", stuck.join(", ")),
    )
}

fn report(ok: bool, msg: &str) -> bool {
    let (color, label) = if ok {
        (AnsiColor::Green, "PASS")
    } else {
        (AnsiColor::Red, "FAIL")
    };
    let style = anstyle::Style::new()
        .fg_color(Some(anstyle::Color::Ansi(color)))
        .bold();
    eprintln!("{style}[{label}]{style:#} {msg}");
    ok
}
