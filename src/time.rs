use std::time::Duration;

pub use std::time::Instant;

use crate::renderer::PassId;

/// Wall-clock time spent recording and submitting each pass of the last
/// frame, in nanoseconds. Skipped passes read zero.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassTimings {
    nanos: [u64; PassId::COUNT],
}

impl PassTimings {
    pub fn clear(&mut self) {
        self.nanos = [0; PassId::COUNT];
    }

    pub fn record(&mut self, pass: PassId, elapsed: Duration) {
        self.nanos[pass as usize] = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
    }

    pub fn nanos(&self, pass: PassId) -> u64 {
        self.nanos[pass as usize]
    }

    pub fn total_nanos(&self) -> u64 {
        self.nanos.iter().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PassId, u64)> + '_ {
        PassId::ALL.iter().map(|&pass| (pass, self.nanos(pass)))
    }
}

/// Runs `f` and returns its result with the time it took.
pub fn timed<T>(f: impl FnOnce() -> T) -> (T, Duration) {
    let start = Instant::now();
    let value = f();
    (value, start.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_per_pass_and_totals() {
        let mut timings = PassTimings::default();
        timings.record(PassId::GBuffer, Duration::from_nanos(1_500));
        timings.record(PassId::ToneMap, Duration::from_nanos(500));
        assert_eq!(timings.nanos(PassId::GBuffer), 1_500);
        assert_eq!(timings.nanos(PassId::Debug), 0);
        assert_eq!(timings.total_nanos(), 2_000);

        timings.clear();
        assert_eq!(timings.total_nanos(), 0);
    }

    #[test]
    fn timed_returns_the_closure_result() {
        let (value, elapsed) = timed(|| 40 + 2);
        assert_eq!(value, 42);
        assert!(elapsed <= Duration::from_secs(1));
    }
}
