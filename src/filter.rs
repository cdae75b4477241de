//! Sliding-window median and exponential smoothing, generalized from the
//! teacher's `signal-processing::sliding::SlidingWindow` and
//! `signal-processing::filter::median::MedianFilter`. Window size and EWMA
//! coefficient are parameters here instead of being duplicated per call
//! site, since this crate reuses the same shape for both the voltage
//! estimator (spec.md §4.A, N = 3, α = 0.3) and the duty smoothing pipeline
//! (spec.md §4.B, N = 3, α = 0.1).

/// Fixed-capacity ring buffer of the last `N` `f32` samples.
#[derive(Clone)]
pub struct SlidingWindow<const N: usize> {
    buffer: [f32; N],
    idx: usize,
    full: bool,
}

impl<const N: usize> Default for SlidingWindow<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> SlidingWindow<N> {
    pub const fn new() -> Self {
        Self {
            buffer: [0.0; N],
            idx: 0,
            full: false,
        }
    }

    pub fn clear(&mut self) {
        self.idx = 0;
        self.full = false;
        self.buffer = [0.0; N];
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    pub fn len(&self) -> usize {
        if self.full {
            N
        } else {
            self.idx
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push(&mut self, sample: f32) {
        self.buffer[self.idx] = sample;
        self.idx = (self.idx + 1) % N;
        if self.idx == 0 {
            self.full = true;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = f32> + Clone + '_ {
        (self.idx..N)
            .chain(0..self.idx)
            .map(|i| self.buffer[i])
            .take(self.len())
    }

    /// Arithmetic mean of the window (used by the mean-window voltage
    /// filter variant of spec.md §4.A; not wired up by default, see
    /// DESIGN.md for the recorded filter choice).
    pub fn mean(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        self.iter().sum::<f32>() / self.len() as f32
    }

    /// Median of a full window. Panics (debug-asserts) if not full; callers
    /// must check `is_full()` first, matching the teacher's
    /// `MedianFilter::update` which only emits a value once full.
    pub fn median(&self) -> f32 {
        debug_assert!(self.full, "median() requires a full window");
        let mut copy = [0.0f32; N];
        for (slot, sample) in copy.iter_mut().zip(self.iter()) {
            *slot = sample;
        }
        nth_smallest(&mut copy, N / 2)
    }
}

fn nth_smallest<const N: usize>(data: &mut [f32; N], n: usize) -> f32 {
    for i in 0..=n {
        let mut min_idx = i;
        for j in (i + 1)..N {
            if data[j] < data[min_idx] {
                min_idx = j;
            }
        }
        data.swap(i, min_idx);
    }
    data[n]
}

/// Exponentially weighted moving average: `out += alpha * (sample - out)`.
#[derive(Clone, Copy)]
pub struct Ewma {
    alpha: f32,
    out: f32,
    seeded: bool,
}

impl Ewma {
    pub const fn new(alpha: f32) -> Self {
        Self {
            alpha,
            out: 0.0,
            seeded: false,
        }
    }

    pub fn clear(&mut self) {
        self.out = 0.0;
        self.seeded = false;
    }

    pub fn seed(&mut self, value: f32) {
        self.out = value;
        self.seeded = true;
    }

    pub fn update(&mut self, sample: f32) -> f32 {
        if !self.seeded {
            self.seed(sample);
        } else {
            self.out += self.alpha * (sample - self.out);
        }
        self.out
    }

    pub fn value(&self) -> f32 {
        self.out
    }
}

/// Median-of-`N` feeding an EWMA stage — the filter design spec.md §4.A and
/// §4.B both specify (with different `N`/`alpha`).
#[derive(Clone)]
pub struct MedianEwma<const N: usize> {
    window: SlidingWindow<N>,
    ewma: Ewma,
}

impl<const N: usize> MedianEwma<N> {
    pub const fn new(alpha: f32) -> Self {
        Self {
            window: SlidingWindow::new(),
            ewma: Ewma::new(alpha),
        }
    }

    pub fn clear(&mut self) {
        self.window.clear();
        self.ewma.clear();
    }

    /// Pushes a raw sample. Returns `None` until the window fills, matching
    /// the teacher's `Filter::update` contract.
    pub fn update(&mut self, sample: f32) -> Option<f32> {
        self.window.push(sample);
        if !self.window.is_full() {
            return None;
        }
        Some(self.ewma.update(self.window.median()))
    }

    /// Blocks (by repeated `sample_fn` calls) until the window is full, then
    /// seeds the EWMA stage with the arithmetic mean — spec.md §4.A's
    /// `reset()` contract for the median-of-3 + EWMA variant.
    pub fn refill<E>(&mut self, mut sample_fn: impl FnMut() -> Result<f32, E>) -> Result<f32, E> {
        self.window.clear();
        self.ewma.clear();
        while !self.window.is_full() {
            self.window.push(sample_fn()?);
        }
        let seed = self.window.mean();
        self.ewma.seed(seed);
        Ok(seed)
    }

    pub fn value(&self) -> f32 {
        self.ewma.value()
    }
}

/// Half-away-from-zero rounding, per spec.md §4.B's numeric policy.
pub fn round(value: f32) -> f32 {
    libm::roundf(value)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn median_of_3() {
        let mut m: MedianEwma<3> = MedianEwma::new(1.0); // alpha=1 => passthrough after seed
        assert_eq!(m.update(0.0), None);
        assert_eq!(m.update(1.0), None);
        // window [0,1,2] full, median = 1, ewma seeds to 1
        assert_eq!(m.update(2.0), Some(1.0));
        // window [1,2,5] median = 2, ewma = 1 + 1*(2-1) = 2
        assert_eq!(m.update(5.0), Some(2.0));
    }

    #[test]
    fn ewma_smooths_step() {
        let mut e = Ewma::new(0.3);
        assert_eq!(e.update(1.0), 1.0); // seed
        let out = e.update(2.0);
        assert!((out - 1.3).abs() < 1e-6);
    }

    #[test]
    fn refill_blocks_until_full_then_seeds_mean() {
        let mut m: MedianEwma<3> = MedianEwma::new(0.3);
        let mut samples = [10.0, 20.0, 30.0].into_iter();
        let seed = m.refill(|| samples.next().ok_or(())).unwrap();
        assert_eq!(seed, 20.0);
        assert_eq!(m.value(), 20.0);
    }

    #[test]
    fn round_half_away_from_zero() {
        assert_eq!(round(0.5), 1.0);
        assert_eq!(round(-0.5), -1.0);
        assert_eq!(round(2.4), 2.0);
        assert_eq!(round(2.5), 3.0);
    }
}
