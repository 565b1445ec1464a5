//! Query bound planning.
//!
//! Turns a search disc into a short list of lexicographic geohash ranges
//! whose union contains the geohash of every point in the disc:
//!
//! 1. Bound the disc with a lat/lng box. The box is widened to all
//!    longitudes when it reaches a pole, and split in two when it crosses
//!    the ±180° meridian.
//! 2. Pick the finest precision whose cells covering the box number at
//!    most `max_cells`. Cell counts only grow with precision, so the scan
//!    stops at the first precision over budget.
//! 3. Enumerate the covering cells, sort them, and merge runs of
//!    lexicographic successors into single ranges.
//! 4. End each range at the last cell followed by `~`, which sorts after
//!    every geohash character, so the range holds every finer hash that
//!    starts with a covered cell.
//!
//! The result over-covers (cells stick out of the disc); refinement drops
//! the false positives.

use crate::circle::{CircleError, Result};
use crate::config::CoreConfig;
use crate::location::distance::meters_to_latitude_degrees;
use crate::location::geohash::{self, next_hash, MAX_PRECISION};
use crate::location::{validate_radius, GeoError, GeoPoint};

/// Sorts after every character of the geohash alphabet.
const RANGE_END_SUFFIX: char = '~';

/// Added to the disc's angular radius to absorb floating point error.
const MARGIN_DEGREES: f64 = 1e-9;

/// An inclusive lexicographic range over the geohash index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueryBound {
    /// Lowest matching hash.
    pub start: String,
    /// Highest matching hash.
    pub end: String,
}

impl QueryBound {
    /// Range covering every hash that starts with a cell in `first..=last`.
    #[must_use]
    pub fn spanning(first: &str, last: &str) -> Self {
        Self {
            start: first.to_string(),
            end: format!("{last}{RANGE_END_SUFFIX}"),
        }
    }

    /// Returns whether `hash` falls inside this range.
    #[must_use]
    pub fn contains(&self, hash: &str) -> bool {
        self.start.as_str() <= hash && hash <= self.end.as_str()
    }
}

/// Bounds produced for one search, with the precision they were built at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    /// Geohash length of the enumerated cells.
    pub precision: usize,
    /// Number of cells enumerated before merging.
    pub cell_count: usize,
    /// Merged ranges, sorted by start.
    pub bounds: Vec<QueryBound>,
}

/// Computes [`QueryPlan`]s for search discs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundsPlanner {
    max_precision: usize,
    max_cells: usize,
}

impl BoundsPlanner {
    /// Creates a planner.
    ///
    /// `max_precision` must not exceed the length of the stored geohashes,
    /// otherwise stored hashes would be shorter than the range keys.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError::InvalidPrecision`] if `max_precision` is not in
    /// `1..=MAX_PRECISION`.
    pub fn new(max_precision: usize, max_cells: usize) -> std::result::Result<Self, GeoError> {
        if max_precision == 0 || max_precision > MAX_PRECISION {
            return Err(GeoError::InvalidPrecision(max_precision));
        }
        Ok(Self {
            max_precision,
            max_cells: max_cells.max(1),
        })
    }

    /// Planner matching a configuration's stored precision and cell budget.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError::InvalidPrecision`] for an out-of-range precision.
    pub fn from_config(config: &CoreConfig) -> std::result::Result<Self, GeoError> {
        Self::new(config.geohash_precision, config.max_query_cells)
    }

    /// Plans the bounds covering the disc of `radius_meters` around `center`.
    ///
    /// # Errors
    ///
    /// - [`CircleError::Geo`] with [`GeoError::InvalidRadius`] for a
    ///   non-positive or non-finite radius
    /// - [`CircleError::InvariantViolation`] if no bound could be produced
    pub fn plan(&self, center: GeoPoint, radius_meters: f64) -> Result<QueryPlan> {
        let radius_meters = validate_radius(radius_meters)?;
        let area = SearchBox::around(center, radius_meters);

        let mut precision = 1;
        for candidate in 2..=self.max_precision {
            if area.cell_count(candidate)? > self.max_cells {
                break;
            }
            precision = candidate;
        }

        let cells = area.cells(precision)?;
        let cell_count = cells.len();
        let bounds = merge_cells(&cells);
        if bounds.is_empty() {
            return Err(CircleError::InvariantViolation(format!(
                "no query bounds for {center} within {radius_meters} m"
            )));
        }

        Ok(QueryPlan {
            precision,
            cell_count,
            bounds,
        })
    }
}

impl Default for BoundsPlanner {
    fn default() -> Self {
        let config = CoreConfig::default();
        Self {
            max_precision: config.geohash_precision,
            max_cells: config.max_query_cells,
        }
    }
}

/// Lat/lng box around a disc. Longitude spans never cross ±180°.
#[derive(Debug, Clone, PartialEq)]
struct SearchBox {
    lat_min: f64,
    lat_max: f64,
    lng_spans: Vec<(f64, f64)>,
}

impl SearchBox {
    fn around(center: GeoPoint, radius_meters: f64) -> Self {
        let lat_delta = meters_to_latitude_degrees(radius_meters) + MARGIN_DEGREES;
        let north = center.latitude() + lat_delta;
        let south = center.latitude() - lat_delta;
        let lat_min = south.max(-90.0);
        let lat_max = north.min(90.0);

        let whole_world = vec![(-180.0, 180.0)];
        if north >= 90.0 || south <= -90.0 {
            // Every meridian passes through a pole inside the disc.
            return Self {
                lat_min,
                lat_max,
                lng_spans: whole_world,
            };
        }

        // Meridians converge poleward, so the far edge sets the width.
        let far_lat = lat_min.abs().max(lat_max.abs()).to_radians();
        let lng_delta = lat_delta / far_lat.cos();
        if lng_delta >= 180.0 {
            return Self {
                lat_min,
                lat_max,
                lng_spans: whole_world,
            };
        }

        let west = center.longitude() - lng_delta;
        let east = center.longitude() + lng_delta;
        let lng_spans = if west < -180.0 {
            vec![(west + 360.0, 180.0), (-180.0, east)]
        } else if east > 180.0 {
            vec![(west, 180.0), (-180.0, east - 360.0)]
        } else {
            vec![(west, east)]
        };

        Self {
            lat_min,
            lat_max,
            lng_spans,
        }
    }

    fn grid(&self, precision: usize) -> Result<Grid> {
        let (height, width) = geohash::cell_size_degrees(precision)?;
        Ok(Grid { height, width })
    }

    fn cell_count(&self, precision: usize) -> Result<usize> {
        let grid = self.grid(precision)?;
        let rows = grid.row(self.lat_max) - grid.row(self.lat_min) + 1;
        let cols: usize = self
            .lng_spans
            .iter()
            .map(|&(west, east)| grid.col(east) - grid.col(west) + 1)
            .sum();
        Ok(rows.saturating_mul(cols))
    }

    fn cells(&self, precision: usize) -> Result<Vec<String>> {
        let grid = self.grid(precision)?;
        let mut cells = Vec::new();

        for row in grid.row(self.lat_min)..=grid.row(self.lat_max) {
            for &(west, east) in &self.lng_spans {
                for col in grid.col(west)..=grid.col(east) {
                    let (lat, lng) = grid.center(row, col);
                    cells.push(geohash::encode_coordinates(lat, lng, precision)?);
                }
            }
        }

        cells.sort_unstable();
        cells.dedup();
        Ok(cells)
    }
}

/// Cell grid at one precision, indexed from the south-west corner.
#[derive(Debug, Clone, Copy)]
struct Grid {
    height: f64,
    width: f64,
}

impl Grid {
    // Grid indices are small non-negative integers, so the float/int casts
    // below cannot truncate or lose sign.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn index(offset: f64, size: f64, extent: f64) -> usize {
        let last = (extent / size).round() as usize - 1;
        ((offset / size).floor().max(0.0) as usize).min(last)
    }

    fn row(&self, lat: f64) -> usize {
        Self::index(lat + 90.0, self.height, 180.0)
    }

    fn col(&self, lng: f64) -> usize {
        Self::index(lng + 180.0, self.width, 360.0)
    }

    #[allow(clippy::cast_precision_loss)]
    fn center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            (row as f64 + 0.5).mul_add(self.height, -90.0),
            (col as f64 + 0.5).mul_add(self.width, -180.0),
        )
    }
}

/// Merges sorted, deduplicated cells into ranges of consecutive hashes.
fn merge_cells(cells: &[String]) -> Vec<QueryBound> {
    let mut bounds = Vec::new();
    let mut run: Option<(&str, &str)> = None;

    for cell in cells {
        run = match run {
            Some((first, last)) if next_hash(last).as_deref() == Some(cell.as_str()) => {
                Some((first, cell.as_str()))
            }
            Some((first, last)) => {
                bounds.push(QueryBound::spanning(first, last));
                Some((cell.as_str(), cell.as_str()))
            }
            None => Some((cell.as_str(), cell.as_str())),
        };
    }
    if let Some((first, last)) = run {
        bounds.push(QueryBound::spanning(first, last));
    }

    bounds
}
