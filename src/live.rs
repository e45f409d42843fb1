//! Live session: audio device output plus script hot-reloading.
//!
//! The cyclist runs inside the cpal callback behind a mutex; the watch loop
//! re-evaluates the script on change and installs the new pattern through
//! the lock-free slot, so an edit never glitches the running audio.

use crate::cyclist::{Cyclist, PatternSlot};
use crate::script::eval_script;
use crate::tempo;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use notify::{RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub struct LiveSession {
    script_path: PathBuf,
    cyclist: Arc<Mutex<Cyclist>>,
    slot: PatternSlot,
    _stream: cpal::Stream, // keep the device stream alive
}

impl LiveSession {
    pub fn new(script_path: &Path, samples_path: Option<PathBuf>) -> Result<Self, String> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or("no output device available")?;
        let config = device
            .default_output_config()
            .map_err(|e| format!("no default output config: {}", e))?;

        let sample_rate = config.sample_rate().0;
        let channels = config.channels() as usize;
        tracing::info!(sample_rate, channels, "audio device opened");

        let cyclist = Arc::new(Mutex::new(Cyclist::new(
            sample_rate,
            tempo::cps(),
            samples_path,
        )));
        let slot = cyclist.lock().unwrap().pattern_slot();

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => {
                Self::build_stream::<f32>(&device, &config.into(), cyclist.clone(), channels)
            }
            cpal::SampleFormat::I16 => {
                Self::build_stream::<i16>(&device, &config.into(), cyclist.clone(), channels)
            }
            cpal::SampleFormat::U16 => {
                Self::build_stream::<u16>(&device, &config.into(), cyclist.clone(), channels)
            }
            other => return Err(format!("unsupported sample format {:?}", other)),
        }
        .map_err(|e| format!("failed to build stream: {}", e))?;

        stream.play().map_err(|e| format!("failed to start stream: {}", e))?;

        Ok(Self {
            script_path: script_path.to_path_buf(),
            cyclist,
            slot,
            _stream: stream,
        })
    }

    fn build_stream<T>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        cyclist: Arc<Mutex<Cyclist>>,
        channels: usize,
    ) -> Result<cpal::Stream, cpal::BuildStreamError>
    where
        T: cpal::SizedSample + cpal::FromSample<f32>,
    {
        device.build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels.max(1);
                let mut cyclist = cyclist.lock().unwrap();
                let (left, right) = cyclist.generate(frames);
                for (i, frame) in data.chunks_mut(channels).enumerate() {
                    match frame.len() {
                        0 => {}
                        1 => frame[0] = T::from_sample((left[i] + right[i]) * 0.5),
                        _ => {
                            frame[0] = T::from_sample(left[i]);
                            frame[1] = T::from_sample(right[i]);
                            for extra in frame.iter_mut().skip(2) {
                                *extra = T::from_sample(0.0);
                            }
                        }
                    }
                }
            },
            |err| tracing::error!(%err, "audio stream error"),
            None,
        )
    }

    /// Read and evaluate the script; on success install the pattern (and
    /// tempo). On failure the previous pattern keeps playing.
    pub fn reload(&self) -> Result<(), String> {
        let source = std::fs::read_to_string(&self.script_path)
            .map_err(|e| format!("cannot read {}: {}", self.script_path.display(), e))?;
        let script = eval_script(&source).map_err(|e| e.to_string())?;
        if let Some(cps) = script.cps {
            tempo::set_cps(cps);
            self.cyclist.lock().unwrap().set_cps(cps);
        }
        self.slot.store(Some(Arc::new(script.pattern)));
        tracing::info!(
            tracks = script.track_names.len(),
            names = ?script.track_names,
            "script loaded"
        );
        Ok(())
    }

    /// Watch the script file and hot-reload until the process ends.
    pub fn run(&self) -> Result<(), String> {
        if let Err(err) = self.reload() {
            tracing::error!(%err, "initial evaluation failed; starting silent");
        }

        let (tx, rx) = mpsc::channel();
        let mut watcher =
            notify::recommended_watcher(tx).map_err(|e| format!("watcher: {}", e))?;
        watcher
            .watch(&self.script_path, RecursiveMode::NonRecursive)
            .map_err(|e| format!("cannot watch {}: {}", self.script_path.display(), e))?;
        tracing::info!(path = %self.script_path.display(), "watching for changes");

        loop {
            match rx.recv() {
                Ok(event) => {
                    if let Ok(event) = event {
                        if !matches!(
                            event.kind,
                            notify::EventKind::Modify(_) | notify::EventKind::Create(_)
                        ) {
                            continue;
                        }
                    }
                    // Editors fire bursts of events per save; settle, then
                    // drain what queued up.
                    std::thread::sleep(Duration::from_millis(50));
                    while rx.try_recv().is_ok() {}
                    match self.reload() {
                        Ok(()) => {}
                        Err(err) => tracing::error!(%err, "reload failed; keeping old pattern"),
                    }
                }
                Err(_) => return Ok(()), // watcher dropped
            }
        }
    }
}
