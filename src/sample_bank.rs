//! Sample loading and caching, dirt-samples style.
//!
//! Samples live under `<root>/<name>/`, one directory per bank; `name:n`
//! picks the nth WAV. Files named `<n>.wav` are matched first, otherwise
//! the directory's WAV files are taken in sorted order. Decoded audio is
//! cached for the engine's lifetime; misses are logged once per key and
//! come back as the empty descriptor.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Decoded audio: de-interleaved channels (at most two) at the file's
/// native rate.
#[derive(Debug, Clone, Default)]
pub struct SampleData {
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl SampleData {
    pub fn frames(&self) -> usize {
        self.channels.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }
}

pub struct SampleBank {
    root: PathBuf,
    cache: HashMap<String, Arc<SampleData>>,
    missing: HashSet<String>,
}

impl SampleBank {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: HashMap::new(),
            missing: HashSet::new(),
        }
    }

    /// Fetch (and cache) sample `n` of bank `name`. Not found or undecodable
    /// gives `None`, logged once per key.
    pub fn get(&mut self, name: &str, n: usize) -> Option<Arc<SampleData>> {
        let key = format!("{}:{}", name, n);
        if let Some(sample) = self.cache.get(&key) {
            return Some(sample.clone());
        }
        if self.missing.contains(&key) {
            return None;
        }
        match self.load(name, n) {
            Ok(data) => {
                let data = Arc::new(data);
                self.cache.insert(key, data.clone());
                Some(data)
            }
            Err(err) => {
                tracing::warn!(key = %key, %err, "sample unavailable");
                self.missing.insert(key);
                None
            }
        }
    }

    fn load(&self, name: &str, n: usize) -> Result<SampleData, String> {
        let dir = self.root.join(name);
        if !dir.is_dir() {
            return Err(format!("no sample directory {}", dir.display()));
        }
        // Exact `<n>.wav` wins; otherwise index into the sorted listing.
        let exact = dir.join(format!("{}.wav", n));
        let path = if exact.is_file() {
            exact
        } else {
            let mut wavs: Vec<PathBuf> = std::fs::read_dir(&dir)
                .map_err(|e| format!("cannot list {}: {}", dir.display(), e))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| {
                    p.extension()
                        .and_then(|e| e.to_str())
                        .map(|e| e.eq_ignore_ascii_case("wav"))
                        .unwrap_or(false)
                })
                .collect();
            wavs.sort();
            wavs.get(n)
                .cloned()
                .ok_or_else(|| format!("bank {} has no sample {}", name, n))?
        };
        decode_wav(&path)
    }
}

/// Decode a WAV file: integer PCM scaled by `2^(bits-1)`, floats taken
/// as-is, channels capped at two.
fn decode_wav(path: &Path) -> Result<SampleData, String> {
    let mut reader =
        hound::WavReader::open(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    let spec = reader.spec();
    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.unwrap_or(0.0))
            .collect(),
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.unwrap_or(0) as f32 / scale)
                .collect()
        }
    };
    let source_channels = spec.channels as usize;
    if source_channels == 0 {
        return Err(format!("{}: no channels", path.display()));
    }
    let kept = source_channels.min(2);
    let frames = interleaved.len() / source_channels;
    let mut channels = vec![Vec::with_capacity(frames); kept];
    for frame in interleaved.chunks_exact(source_channels) {
        for (c, channel) in channels.iter_mut().enumerate() {
            channel.push(frame[c]);
        }
    }
    Ok(SampleData {
        channels,
        sample_rate: spec.sample_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, channels: u16, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: 44_100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn loads_scales_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let bd = dir.path().join("bd");
        std::fs::create_dir(&bd).unwrap();
        write_wav(&bd.join("0.wav"), 1, &[0, 16_384, -32_768]);

        let mut bank = SampleBank::new(dir.path());
        let sample = bank.get("bd", 0).expect("sample");
        assert_eq!(sample.sample_rate, 44_100);
        assert_eq!(sample.channels.len(), 1);
        assert_eq!(sample.frames(), 3);
        assert!((sample.channels[0][1] - 0.5).abs() < 1e-4);
        assert!((sample.channels[0][2] + 1.0).abs() < 1e-6);

        // Second fetch is the cached Arc.
        let again = bank.get("bd", 0).expect("cached");
        assert!(Arc::ptr_eq(&sample, &again));
    }

    #[test]
    fn indexes_sorted_directory_listing() {
        let dir = tempfile::tempdir().unwrap();
        let hh = dir.path().join("hh");
        std::fs::create_dir(&hh).unwrap();
        write_wav(&hh.join("a_closed.wav"), 1, &[100]);
        write_wav(&hh.join("b_open.wav"), 1, &[200, 300]);

        let mut bank = SampleBank::new(dir.path());
        assert_eq!(bank.get("hh", 0).unwrap().frames(), 1);
        assert_eq!(bank.get("hh", 1).unwrap().frames(), 2);
        assert!(bank.get("hh", 2).is_none());
    }

    #[test]
    fn stereo_keeps_two_channels() {
        let dir = tempfile::tempdir().unwrap();
        let pad = dir.path().join("pad");
        std::fs::create_dir(&pad).unwrap();
        write_wav(&pad.join("0.wav"), 2, &[1000, -1000, 2000, -2000]);

        let mut bank = SampleBank::new(dir.path());
        let sample = bank.get("pad", 0).unwrap();
        assert_eq!(sample.channels.len(), 2);
        assert_eq!(sample.frames(), 2);
        assert!(sample.channels[0][0] > 0.0);
        assert!(sample.channels[1][0] < 0.0);
    }

    #[test]
    fn missing_banks_fail_once_and_quietly() {
        let dir = tempfile::tempdir().unwrap();
        let mut bank = SampleBank::new(dir.path());
        assert!(bank.get("nope", 0).is_none());
        assert!(bank.get("nope", 0).is_none());
        assert!(bank.missing.contains("nope:0"));
    }
}
