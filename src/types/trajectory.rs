use serde::{Deserialize, Serialize};

/// One motion sample for a vehicle: speed, heading and acceleration.
///
/// The heading is expressed in radians in `(-pi, pi]` and is derived by the
/// telemetry loader from successive positions; the first sample of a track
/// has no predecessor and carries a heading of `0.0`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryVector {
    pub speed: f64,
    pub direction: f64,
    pub acceleration: f64,
}

impl TrajectoryVector {
    pub fn new(speed: f64, direction: f64, acceleration: f64) -> Self {
        Self {
            speed,
            direction,
            acceleration,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.speed.is_finite() && self.direction.is_finite() && self.acceleration.is_finite()
    }
}

/// Cosine similarity of one channel across two tracks truncated to the
/// shorter length. A zero-norm channel on either side yields `0.0` so that
/// degenerate tracks never produce NaN.
pub(crate) fn channel_cosine(
    a: &[TrajectoryVector],
    b: &[TrajectoryVector],
    channel: fn(&TrajectoryVector) -> f64,
) -> f64 {
    let len = a.len().min(b.len());
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for i in 0..len {
        let x = channel(&a[i]);
        let y = channel(&b[i]);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(speed: f64) -> TrajectoryVector {
        TrajectoryVector::new(speed, 0.0, 0.0)
    }

    #[test]
    fn identical_channels_have_unit_similarity() {
        let track = vec![sample(10.0), sample(12.0)];
        let similarity = channel_cosine(&track, &track, |v| v.speed);
        assert!((similarity - 1.0).abs() < 1e-12);
    }

    #[test]
    fn zero_norm_channel_yields_zero() {
        let flat = vec![sample(10.0)];
        let similarity = channel_cosine(&flat, &flat, |v| v.acceleration);
        assert_eq!(similarity, 0.0);
    }

    #[test]
    fn tracks_are_truncated_to_the_shorter_length() {
        let short = vec![sample(10.0)];
        let long = vec![sample(10.0), sample(0.0)];
        let similarity = channel_cosine(&short, &long, |v| v.speed);
        assert!((similarity - 1.0).abs() < 1e-12);
    }
}
