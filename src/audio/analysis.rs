// Frequency analysis tap
//
// The visualization loop samples a tap once per rendered frame. The
// software analyzer below behaves like a browser analyser node: a
// Blackman-windowed FFT over the most recent samples, smoothed over time,
// with magnitudes mapped from a decibel range onto 0-255.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::CaptureError;

const SMOOTHING_TIME_CONSTANT: f32 = 0.8;
const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;

/// Read-only tap into a live stream
pub trait AnalysisTap: Send + Sync {
    /// Snapshot length (half the FFT size)
    fn frequency_bin_count(&self) -> usize;

    /// Copy the latest magnitudes (0-255 per bucket) into `out`
    ///
    /// Returns false once the tap has been released.
    fn read_frequency_data(&self, out: &mut [u8]) -> bool;

    fn release(&self);

    fn is_released(&self) -> bool;
}

/// Software frequency tap fed with PCM samples
pub struct SpectrumAnalyzer {
    fft_size: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    state: Mutex<AnalyzerState>,
    released: AtomicBool,
}

struct AnalyzerState {
    samples: VecDeque<f32>,
    smoothed: Vec<f32>,
    scratch: Vec<Complex<f32>>,
}

impl SpectrumAnalyzer {
    pub fn new(fft_size: usize) -> Result<Self, CaptureError> {
        if !fft_size.is_power_of_two() || !(32..=32768).contains(&fft_size) {
            return Err(CaptureError::EncodingFailure(format!(
                "FFT size must be a power of two between 32 and 32768, got {}",
                fft_size
            )));
        }

        let fft = FftPlanner::<f32>::new().plan_fft_forward(fft_size);

        Ok(Self {
            fft_size,
            fft,
            window: blackman_window(fft_size),
            state: Mutex::new(AnalyzerState {
                samples: VecDeque::from(vec![0.0; fft_size]),
                smoothed: vec![0.0; fft_size / 2],
                scratch: vec![Complex::new(0.0, 0.0); fft_size],
            }),
            released: AtomicBool::new(false),
        })
    }

    /// Append samples; only the most recent `fft_size` are kept
    pub fn push_samples(&self, samples: &[i16]) {
        if self.is_released() {
            return;
        }

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        for &s in samples {
            if state.samples.len() == self.fft_size {
                state.samples.pop_front();
            }
            state.samples.push_back(s as f32 / i16::MAX as f32);
        }
    }
}

impl AnalysisTap for SpectrumAnalyzer {
    fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }

    fn read_frequency_data(&self, out: &mut [u8]) -> bool {
        if self.is_released() {
            return false;
        }

        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let state = &mut *guard;

        for (i, (slot, sample)) in state.scratch.iter_mut().zip(state.samples.iter()).enumerate() {
            *slot = Complex::new(sample * self.window[i], 0.0);
        }
        self.fft.process(&mut state.scratch);

        let scale = 1.0 / self.fft_size as f32;
        for (k, smoothed) in state.smoothed.iter_mut().enumerate() {
            let magnitude = state.scratch[k].norm() * scale;
            *smoothed = SMOOTHING_TIME_CONSTANT * *smoothed
                + (1.0 - SMOOTHING_TIME_CONSTANT) * magnitude;
        }

        for (byte, &magnitude) in out.iter_mut().zip(state.smoothed.iter()) {
            *byte = magnitude_to_byte(magnitude);
        }

        true
    }

    fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

fn blackman_window(size: usize) -> Vec<f32> {
    let n = size as f32;
    (0..size)
        .map(|i| {
            let x = i as f32 / n;
            0.42 - 0.5 * (2.0 * std::f32::consts::PI * x).cos()
                + 0.08 * (4.0 * std::f32::consts::PI * x).cos()
        })
        .collect()
}

fn magnitude_to_byte(magnitude: f32) -> u8 {
    if magnitude <= 0.0 {
        return 0;
    }
    let db = 20.0 * magnitude.log10();
    let scaled = 255.0 * (db - MIN_DECIBELS) / (MAX_DECIBELS - MIN_DECIBELS);
    scaled.clamp(0.0, 255.0) as u8
}
