use ndarray::Array1;

/// First-order low-pass filter over a fixed-length vector signal.
///
/// Used to optionally smooth the finite-difference ego velocity. The filter
/// seeds itself with the first sample it sees, so enabling it does not ramp
/// up from zero.
///
/// # Examples
///
/// ```rust
/// use lanepilot::common::filters::VectorLowpassFilter;
/// use ndarray::arr1;
///
/// let mut filter = VectorLowpassFilter::new(5.0, 0.02);
/// let first = filter.apply(&arr1(&[10.0, 0.0]));
/// assert_eq!(first, arr1(&[10.0, 0.0]));
/// ```
#[derive(Clone, Debug)]
pub struct VectorLowpassFilter {
    /// Filter constant
    kf: f64,
    /// Last output, `None` until the first sample
    state: Option<Array1<f64>>,
}

impl VectorLowpassFilter {
    /// Creates a filter with cutoff `fc` (Hz) sampled every `dt` seconds.
    pub fn new(fc: f64, dt: f64) -> Self {
        let wdt = 2.0 * std::f64::consts::PI * fc * dt;
        Self {
            kf: wdt / (1.0 + wdt),
            state: None,
        }
    }

    /// Feeds one sample and returns the filtered value.
    pub fn apply(&mut self, x: &Array1<f64>) -> Array1<f64> {
        let next = match self.state.take() {
            Some(prev) if prev.len() == x.len() => prev * (1.0 - self.kf) + x * self.kf,
            _ => x.clone(),
        };

        // A NaN anywhere poisons the state; restart from the raw sample.
        let next = if next.iter().any(|v| v.is_nan()) {
            x.mapv(|v| if v.is_nan() { 0.0 } else { v })
        } else {
            next
        };

        self.state = Some(next.clone());
        next
    }

    pub fn reset(&mut self) {
        self.state = None;
    }
}
