use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::errors::{ChainError, ChainResult};
use crate::types::{NodeId, TrajectoryVector};

const LANE_WIDTH_M: f64 = 3.5;

/// One CSV row of raw vehicle telemetry. Lateral position is reconstructed
/// from the lane index; lanes are numbered from 1.
#[derive(Debug, Deserialize)]
struct TelemetryRow {
    vehicle_id: String,
    time_s: f64,
    longitudinal_m: f64,
    lane: u32,
    speed_mps: f64,
    accel_mps2: f64,
}

#[derive(Clone, Copy, Debug)]
pub struct TrackPoint {
    pub time: f64,
    pub x: f64,
    pub y: f64,
    pub speed: f64,
    pub acceleration: f64,
}

/// Reads per-vehicle tracks from a telemetry CSV, grouped by vehicle and
/// sorted by sample time.
pub fn load_tracks(path: &Path) -> ChainResult<BTreeMap<NodeId, Vec<TrackPoint>>> {
    let file = File::open(path)?;
    let mut reader = csv::Reader::from_reader(file);
    let mut tracks: BTreeMap<NodeId, Vec<TrackPoint>> = BTreeMap::new();
    for (line, row) in reader.deserialize().enumerate() {
        let row: TelemetryRow = row
            .map_err(|err| ChainError::Telemetry(format!("malformed row {}: {err}", line + 1)))?;
        if row.lane == 0 {
            return Err(ChainError::Telemetry(format!(
                "row {}: lane index must start at 1",
                line + 1
            )));
        }
        if ![row.time_s, row.longitudinal_m, row.speed_mps, row.accel_mps2]
            .iter()
            .all(|value| value.is_finite())
        {
            return Err(ChainError::Telemetry(format!(
                "row {}: non-finite sample for vehicle {}",
                line + 1,
                row.vehicle_id
            )));
        }
        tracks.entry(row.vehicle_id).or_default().push(TrackPoint {
            time: row.time_s,
            x: row.longitudinal_m,
            y: f64::from(row.lane - 1) * LANE_WIDTH_M,
            speed: row.speed_mps,
            acceleration: row.accel_mps2,
        });
    }
    for points in tracks.values_mut() {
        points.sort_by(|a, b| a.time.total_cmp(&b.time));
    }
    info!(vehicles = tracks.len(), path = %path.display(), "loaded telemetry");
    Ok(tracks)
}

/// Turns a positional track into motion samples. The heading of sample i
/// comes from `atan2(dy, dx)` against sample i-1; the first sample has no
/// predecessor and keeps heading 0.
pub fn derive_trajectory(points: &[TrackPoint]) -> Vec<TrajectoryVector> {
    points
        .iter()
        .enumerate()
        .map(|(i, point)| {
            let direction = if i == 0 {
                0.0
            } else {
                let previous = &points[i - 1];
                (point.y - previous.y).atan2(point.x - previous.x)
            };
            TrajectoryVector::new(point.speed, direction, point.acceleration)
        })
        .collect()
}
