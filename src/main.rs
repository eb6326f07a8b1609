#[cfg(not(feature = "streaming"))]
fn main() {
    eprintln!(
        "The audiomux demo requires the \"streaming\" feature. Rebuild with `--features streaming` to enable playback."
    );
}

#[cfg(feature = "streaming")]
mod cli {
    use std::env;
    use std::f32::consts::TAU;
    use std::thread;
    use std::time::Duration;

    use anyhow::{Context, Result};

    use audiomux::backend::DEFAULT_SAMPLE_RATE;
    use audiomux::{AudioOut, AudioOutConfig, RodioBackend, SampleFormat};

    const FRAMES_PER_BUFFER: u32 = 512;
    const AMPLITUDE: f32 = 0.2;

    /// Play a sine tone through one multiplexer port.
    ///
    /// Usage: audiomux [tone_hz] [seconds]
    pub fn run() -> Result<()> {
        let args: Vec<String> = env::args().collect();
        let tone_hz: f32 = match args.get(1) {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("tone frequency '{raw}' is not a number"))?,
            None => 440.0,
        };
        let seconds: f32 = match args.get(2) {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("duration '{raw}' is not a number"))?,
            None => 2.0,
        };

        let backend = RodioBackend::new().context("opening the audio device")?;
        let mux = AudioOut::new(backend, AudioOutConfig::default());

        let handle = mux
            .open(0, FRAMES_PER_BUFFER, DEFAULT_SAMPLE_RATE, SampleFormat::FloatStereo)
            .context("opening an output port")?;
        let status = mux.status(handle)?;

        println!(
            "Playing {tone_hz} Hz for {seconds} s ({} byte buffers on port {handle})",
            status.buffer_bytes
        );

        let buffers = (seconds * DEFAULT_SAMPLE_RATE as f32 / FRAMES_PER_BUFFER as f32).ceil() as usize;
        let mut bytes = vec![0u8; status.buffer_bytes];
        let mut phase = 0.0f32;

        for _ in 0..buffers {
            fill_stereo_tone(&mut bytes, &mut phase, tone_hz);
            mux.output(handle, Some(&bytes))
                .context("submitting audio")?;
        }

        // Let the buffered tail play out before the sink is stopped
        thread::sleep(Duration::from_millis(300));
        mux.close(handle)?;

        Ok(())
    }

    fn fill_stereo_tone(bytes: &mut [u8], phase: &mut f32, tone_hz: f32) {
        let step = TAU * tone_hz / DEFAULT_SAMPLE_RATE as f32;
        for frame in bytes.chunks_exact_mut(8) {
            let sample = phase.sin() * AMPLITUDE;
            *phase = (*phase + step) % TAU;
            let le = sample.to_le_bytes();
            frame[..4].copy_from_slice(&le);
            frame[4..].copy_from_slice(&le);
        }
    }
}

#[cfg(feature = "streaming")]
fn main() {
    if let Err(err) = cli::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
