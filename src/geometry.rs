//! # Geometry Module
//!
//! A block's geometry is its per-axis length tuple.  This module owns the
//! two geometry services the allocator consumes:
//!
//! * `GeoSystem` is the candidate tables.  For a dimension vector it holds,
//!   per block size, every axis-length tuple with that product that fits
//!   the system, preference-ordered with the most compact shapes first.
//!   The match engine walks a size's table as a lazy sequence of
//!   candidates.
//! * `rotate_geo` is the fixed 24-step orientation walk.  Applying steps
//!   0..23 in order walks the orientations of the four axes; the per-step
//!   swap table is frozen, so a stored rotation counter always reproduces
//!   the same orientation.

use std::collections::HashMap;
use log::debug;
use crate::fabric::types::DIMS;

/// Number of orientations of a 4-component geometry.
pub const ROTATIONS: usize = 24;

/// Advance a geometry one step along the fixed orientation walk.
///
/// Step N applies a specific transposition (step 11 applies three).  The
/// table must never be reordered: stored rotation counters only mean
/// anything if step N keeps producing the orientation it always has.
/// Steps 20 and 21 repeat the Y/Z swap, so the cumulative walk revisits
/// two orientations late in the sequence.
pub fn rotate_geo(geo: &mut [u16;DIMS],rot_cnt: usize) {
    match rot_cnt {
        0 | 3 | 6 | 9 | 14 | 17 | 20 | 21 => geo.swap(2,3),
        1 | 4 | 7 | 10 | 12 | 15 | 18 | 22 => geo.swap(1,2),
        2 | 5 | 13 | 23 => geo.swap(0,1),
        16 | 19 => geo.swap(0,3),
        8 => geo.swap(1,3),
        11 => {
            geo.swap(0,1);
            geo.swap(1,2);
            geo.swap(2,3);
        },
        _ => {}
    }
}

/// Candidate geometries for every block size a dimension vector admits.
///
/// The allocator builds one of these for the midplane grid and one for the
/// fixed sub-midplane system; requests that give a size instead of a
/// geometry draw their candidates from here.
pub struct GeoSystem {
    dim_size: Vec<u16>,
    tables: HashMap<u32,Vec<Vec<u16>>>
}

impl GeoSystem {
    /// Enumerate every axis-length tuple inside `dim_size` and file it
    /// under its product.  Tables are preference-ordered: smallest maximum
    /// extent first, lexicographic within a class.
    pub fn new(dim_size: &[u16]) -> Self {
        let mut tables: HashMap<u32,Vec<Vec<u16>>> = HashMap::new();
        let dims = dim_size.len();
        let mut curr: Vec<u16> = vec![1;dims];
        loop {
            let size: u32 = curr.iter().map(|g| *g as u32).product();
            tables.entry(size).or_default().push(curr.clone());
            // odometer with the last axis fastest
            let mut dim = dims;
            loop {
                if dim == 0 {
                    for table in tables.values_mut() {
                        table.sort_by_key(|g| (*g.iter().max().unwrap(),g.clone()));
                    }
                    debug!("geometry tables built for {:?}: {} sizes",dim_size,tables.len());
                    return Self {
                        dim_size: dim_size.to_vec(),
                        tables
                    };
                }
                dim -= 1;
                if curr[dim] < dim_size[dim] {
                    curr[dim] += 1;
                    break;
                }
                curr[dim] = 1;
            }
        }
    }
    /// The candidates for a block of `size` midplanes, best first.
    /// None if no tuple inside the system has that product.
    pub fn table_for(&self,size: u32) -> Option<&[Vec<u16>]> {
        match self.tables.get(&size) {
            Some(table) => Some(table.as_slice()),
            None => None
        }
    }
    pub fn dim_size(&self) -> &[u16] {
        &self.dim_size
    }
}
