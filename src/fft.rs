//! FFT-based circular convolution along one array axis using rustfft
//!
//! Periodic (wrap) filtering of a line is exactly a circular convolution, so a
//! line of length `n` can be filtered with one forward and one inverse FFT of
//! length `n` once the kernel has been folded onto the same period.

use num_complex::Complex64;
use rustfft::{Fft, FftDirection, FftPlanner};
use std::sync::Arc;

/// FFT workspace for one line length that caches plans and scratch buffers for reuse
pub struct CircularConvolver {
    n: usize,
    fft: Arc<dyn Fft<f64>>,
    ifft: Arc<dyn Fft<f64>>,
    scratch: Vec<Complex64>,
    buffer: Vec<Complex64>,
    spectrum: Vec<Complex64>,
}

impl CircularConvolver {
    /// Create a workspace for lines of length `n` convolved with `periodic_kernel`
    ///
    /// `periodic_kernel` must have length `n`; entry `d` is the weight applied
    /// at offset `d` (mod `n`).
    pub fn new(periodic_kernel: &[f64]) -> Self {
        let n = periodic_kernel.len();
        let mut planner = FftPlanner::new();

        let fft = planner.plan_fft(n, FftDirection::Forward);
        let ifft = planner.plan_fft(n, FftDirection::Inverse);

        let scratch_len = fft.get_inplace_scratch_len().max(ifft.get_inplace_scratch_len());
        let mut scratch = vec![Complex64::new(0.0, 0.0); scratch_len];

        let mut spectrum: Vec<Complex64> = periodic_kernel
            .iter()
            .map(|&w| Complex64::new(w, 0.0))
            .collect();
        fft.process_with_scratch(&mut spectrum, &mut scratch);

        Self {
            n,
            fft,
            ifft,
            scratch,
            buffer: vec![Complex64::new(0.0, 0.0); n],
            spectrum,
        }
    }

    /// In-place circular convolution: line = real(ifft(K * fft(line)))
    pub fn convolve_inplace(&mut self, line: &mut [f64]) {
        debug_assert_eq!(line.len(), self.n);
        if self.n == 0 {
            return;
        }

        for (c, &r) in self.buffer.iter_mut().zip(line.iter()) {
            *c = Complex64::new(r, 0.0);
        }

        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        for (c, &k) in self.buffer.iter_mut().zip(self.spectrum.iter()) {
            *c *= k;
        }

        self.ifft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        // rustfft leaves the inverse unnormalized
        let scale = 1.0 / self.n as f64;
        for (o, c) in line.iter_mut().zip(self.buffer.iter()) {
            *o = c.re * scale;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_kernel() {
        let mut kernel = vec![0.0; 8];
        kernel[0] = 1.0;
        let mut conv = CircularConvolver::new(&kernel);

        let mut line: Vec<f64> = (0..8).map(|i| i as f64).collect();
        let expected = line.clone();
        conv.convolve_inplace(&mut line);

        for (a, b) in line.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-12, "got {} expected {}", a, b);
        }
    }

    #[test]
    fn test_shift_kernel_wraps() {
        // Weight at offset 1 moves every value one step forward, with wrap
        let mut kernel = vec![0.0; 5];
        kernel[1] = 1.0;
        let mut conv = CircularConvolver::new(&kernel);

        let mut line = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        conv.convolve_inplace(&mut line);

        let expected = [5.0, 1.0, 2.0, 3.0, 4.0];
        for (a, b) in line.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-12, "got {:?}", line);
        }
    }

    #[test]
    fn test_normalized_kernel_preserves_sum() {
        let kernel = vec![0.5, 0.25, 0.0, 0.0, 0.0, 0.25];
        let mut conv = CircularConvolver::new(&kernel);

        let mut line = vec![0.0, 0.0, 6.0, 0.0, 0.0, 0.0];
        conv.convolve_inplace(&mut line);

        let sum: f64 = line.iter().sum();
        assert!((sum - 6.0).abs() < 1e-12);
        assert!((line[2] - 3.0).abs() < 1e-12);
        assert!((line[1] - 1.5).abs() < 1e-12);
        assert!((line[3] - 1.5).abs() < 1e-12);
    }
}
