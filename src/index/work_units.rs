//! Load the ordered list of work units from a coordinates file.

use std::fmt;
use std::path::Path;

use crate::error::{CampaignError, ConfigError};

/// One addressable cell of the campaign, e.g. `"1.3521,103.8198"` or
/// `"1.3521,103.8198,150"`.
///
/// The trimmed identifier is also the idempotency key stored in the
/// progress log.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkUnit(String);

impl WorkUnit {
    /// Build a unit from a raw line. Returns `None` for blank lines.
    pub fn parse(line: &str) -> Option<Self> {
        let id = line.trim();
        if id.is_empty() {
            None
        } else {
            Some(Self(id.to_string()))
        }
    }

    /// The identifier as written to the progress log.
    pub fn id(&self) -> &str {
        &self.0
    }

    /// Geographic target handed to the worker: the `lat,lng` part of the id.
    ///
    /// Ids that do not look like `lat,lng[,radius]` are passed through whole.
    pub fn geo_target(&self) -> &str {
        let mut parts = self.0.splitn(3, ',');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(lat), Some(lng), Some(_)) => &self.0[..lat.len() + 1 + lng.len()],
            _ => &self.0,
        }
    }

    /// Radius carried by a three-field id, in meters.
    pub fn radius_override(&self) -> Option<u32> {
        self.0.splitn(3, ',').nth(2)?.trim().parse().ok()
    }

    /// Parsed `(lat, lng)` when the id starts with two numbers.
    pub fn lat_lng(&self) -> Option<(f64, f64)> {
        let mut parts = self.0.split(',');
        let lat = parts.next()?.trim().parse().ok()?;
        let lng = parts.next()?.trim().parse().ok()?;
        Some((lat, lng))
    }
}

impl fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read every work unit from `path`, in file order.
///
/// Blank lines are dropped; duplicates are kept.
pub fn load_work_units(path: &Path) -> Result<Vec<WorkUnit>, CampaignError> {
    if !path.exists() {
        return Err(ConfigError::MissingInput(path.to_path_buf()).into());
    }

    let contents = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::Invalid(format!("cannot read {}: {}", path.display(), e))
    })?;

    let units: Vec<WorkUnit> = contents.lines().filter_map(WorkUnit::parse).collect();

    tracing::info!("Loaded {} work units from {}", units.len(), path.display());

    Ok(units)
}

/// Bounding box of all units with numeric coordinates:
/// `[min_lat, min_lng, max_lat, max_lng]`.
pub fn coordinate_bounds(units: &[WorkUnit]) -> Option<[f64; 4]> {
    units
        .iter()
        .filter_map(WorkUnit::lat_lng)
        .fold(None, |acc, (lat, lng)| match acc {
            None => Some([lat, lng, lat, lng]),
            Some([min_lat, min_lng, max_lat, max_lng]) => Some([
                min_lat.min(lat),
                min_lng.min(lng),
                max_lat.max(lat),
                max_lng.max(lng),
            ]),
        })
}
