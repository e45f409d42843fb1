//! Offline rendering: drive the cyclist's block loop without a device and
//! write the result to a WAV file.

use crate::cyclist::Cyclist;
use crate::script::eval_script;
use crate::tempo;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub sample_rate: u32,
    pub block_size: usize,
    /// Seconds of audio to produce.
    pub duration: f64,
    pub samples_path: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            block_size: 512,
            duration: 8.0,
            samples_path: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RenderStats {
    pub frames: usize,
    pub peak: f32,
}

/// Evaluate a script and render it through the same block path the live
/// engine uses.
pub fn render_to_file(
    source: &str,
    output: &Path,
    config: &RenderConfig,
) -> Result<RenderStats, String> {
    let script = eval_script(source).map_err(|e| e.to_string())?;
    let cps = script.cps.unwrap_or_else(tempo::cps);

    let mut cyclist = Cyclist::new(config.sample_rate, cps, config.samples_path.clone());
    cyclist.set_pattern(script.pattern);

    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: config.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(output, spec)
        .map_err(|e| format!("cannot create {}: {}", output.display(), e))?;

    let total_frames = (config.duration * config.sample_rate as f64) as usize;
    let mut written = 0;
    let mut peak: f32 = 0.0;
    while written < total_frames {
        let frames = config.block_size.min(total_frames - written);
        let (left, right) = cyclist.generate(frames);
        for i in 0..frames {
            peak = peak.max(left[i].abs()).max(right[i].abs());
            writer
                .write_sample((left[i].clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                .map_err(|e| format!("write failed: {}", e))?;
            writer
                .write_sample((right[i].clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                .map_err(|e| format!("write failed: {}", e))?;
        }
        written += frames;
    }
    writer.finalize().map_err(|e| format!("finalize failed: {}", e))?;

    Ok(RenderStats {
        frames: written,
        peak,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_a_script_to_stereo_wav() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.wav");
        let config = RenderConfig {
            sample_rate: 8000,
            block_size: 256,
            duration: 1.0,
            samples_path: None,
        };
        let stats =
            render_to_file("setcps 1\nx: s(\"sine*4\").gain(0.5)", &out, &config).unwrap();
        assert_eq!(stats.frames, 8000);
        assert!(stats.peak > 0.01, "peak {}", stats.peak);

        let reader = hound::WavReader::open(&out).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 8000);
        assert_eq!(reader.duration(), 8000);
    }

    #[test]
    fn script_errors_propagate() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.wav");
        let err = render_to_file("x: nope(1)", &out, &RenderConfig::default()).unwrap_err();
        assert!(err.contains("nope"));
    }
}
