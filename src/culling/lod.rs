use glam::Vec3;

use crate::error::EngineError;

/// Distance range `[min_distance, max_distance)` from the camera that maps to
/// one level of detail.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LodBand {
    pub min_distance: f32,
    pub max_distance: f32,
}

impl LodBand {
    pub fn new(min_distance: f32, max_distance: f32) -> Self {
        Self {
            min_distance,
            max_distance,
        }
    }

    pub fn contains_squared(&self, distance_squared: f32) -> bool {
        distance_squared >= self.min_distance * self.min_distance
            && distance_squared < self.max_distance * self.max_distance
    }
}

/// Bands must be non-empty ranges, increasing and non-overlapping.
pub fn validate_bands(bands: &[LodBand]) -> Result<(), EngineError> {
    for (index, band) in bands.iter().enumerate() {
        if !(band.min_distance >= 0.0 && band.min_distance < band.max_distance) {
            return Err(EngineError::InvalidLodBands(format!(
                "band {index} has range [{}, {})",
                band.min_distance, band.max_distance
            )));
        }
    }

    for (index, pair) in bands.windows(2).enumerate() {
        if pair[1].min_distance < pair[0].max_distance {
            return Err(EngineError::InvalidLodBands(format!(
                "band {} overlaps band {}",
                index + 1,
                index
            )));
        }
    }

    Ok(())
}

/// First band containing the distance from `camera_position` to `position`.
/// Without bands everything lands in band 0.
pub fn classify_band(position: Vec3, camera_position: Vec3, bands: &[LodBand]) -> Option<usize> {
    if bands.is_empty() {
        return Some(0);
    }

    let distance_squared = (camera_position - position).length_squared();
    bands
        .iter()
        .position(|band| band.contains_squared(distance_squared))
}
