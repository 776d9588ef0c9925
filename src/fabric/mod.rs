//! # Fabric Module
//!
//! The fabric is a cartesian grid of *midplanes* (MPs), each wired to its
//! neighbors along four axes labeled A, X, Y, Z.  Every axis closes into a
//! ring, so the grid is a 4-D torus.  A midplane carries its allocation
//! usage and, per axis, two switch-usage words: `axis_switch` is committed
//! state owned by live blocks, `alter_switch` is the scratch overlay of the
//! in-flight allocation attempt.
//!
//! Midplanes live in a flat buffer with computed 4-D offsets; ring
//! successors are precomputed indices into that buffer.

pub mod types;

use log::{info,warn};
use serde::{Serialize,Deserialize};
use types::*;
use crate::hostlist;

/// One node of the fabric.
#[derive(Clone,Debug,Serialize,Deserialize)]
pub struct Midplane {
    /// position in the grid
    pub coord: Coord,
    /// 4-character label in the coordinate alphabet
    pub coord_str: String,
    /// stable dense index, assigned at grid initialization
    pub index: usize,
    /// opaque location label, e.g. `R00-M0`
    pub loc: String,
    /// scheduler-level node state
    pub state: NodeState,
    /// allocation usage
    pub used: MpUsage,
    /// committed switch usage per axis
    pub axis_switch: [SwitchUsage;DIMS],
    /// tentative switch usage per axis (scratch for one attempt)
    pub alter_switch: [SwitchUsage;DIMS],
    /// ring successor per axis
    pub next_mp: [usize;DIMS]
}

impl Midplane {
    /// True when this MP cannot be the body of a new block on `dim`:
    /// it is committed to another block, or the wire on this axis is
    /// wrapped back on itself.
    pub fn used_on(&self,dim: usize) -> bool {
        !self.used.committed().is_empty()
            || self.axis_switch[dim].contains(SwitchUsage::WRAPPED)
            || self.alter_switch[dim].contains(SwitchUsage::WRAPPED)
    }
    /// True when a new block cannot route through this MP on `dim`:
    /// some block already traverses the through-wires.
    pub fn out_used_on(&self,dim: usize) -> bool {
        self.axis_switch[dim].intersects(SwitchUsage::PASS_USED)
            || self.alter_switch[dim].intersects(SwitchUsage::PASS_USED)
    }
    /// Clear allocation state.  Node state survives when `track_down` is set.
    fn clear(&mut self,track_down: bool) {
        self.used = MpUsage::empty();
        self.axis_switch = [SwitchUsage::empty();DIMS];
        self.alter_switch = [SwitchUsage::empty();DIMS];
        if !track_down {
            self.state = NodeState::empty();
        }
    }
}

/// The 4-D toroidal grid.  Constructed once; dimensions are fixed for its
/// lifetime.
pub struct Fabric {
    dims: [u16;DIMS],
    mps: Vec<Midplane>
}

impl Fabric {
    /// Build the grid for the given dimension sizes.  Every component must
    /// be in `1..=36` so coordinates stay within the label alphabet.
    pub fn create(dims: [u16;DIMS]) -> Self {
        for dim in 0..DIMS {
            if dims[dim] < 1 || dims[dim] > 36 {
                panic!("fabric dimension {} must be in 1..=36, got {}",dim,dims[dim]);
            }
        }
        let count = dims.iter().map(|d| *d as usize).product();
        let mut mps: Vec<Midplane> = Vec::with_capacity(count);
        let mut coord: Coord = [0;DIMS];
        for index in 0..count {
            let mut next_mp = [0usize;DIMS];
            for dim in 0..DIMS {
                let mut succ = coord;
                succ[dim] = (coord[dim] + 1) % dims[dim];
                next_mp[dim] = flat_index(&dims,&succ);
            }
            mps.push(Midplane {
                coord,
                coord_str: hostlist::label(&coord),
                index,
                loc: format!("R{:02}-M{}",index/2,index%2),
                state: NodeState::empty(),
                used: MpUsage::empty(),
                axis_switch: [SwitchUsage::empty();DIMS],
                alter_switch: [SwitchUsage::empty();DIMS],
                next_mp
            });
            // advance z-major
            for dim in (0..DIMS).rev() {
                coord[dim] += 1;
                if coord[dim] < dims[dim] {
                    break;
                }
                coord[dim] = 0;
            }
        }
        info!("created fabric {:?} with {} midplanes",dims,count);
        Self {
            dims,
            mps
        }
    }
    pub fn dims(&self) -> [u16;DIMS] {
        self.dims
    }
    pub fn len(&self) -> usize {
        self.mps.len()
    }
    pub fn is_empty(&self) -> bool {
        self.mps.is_empty()
    }
    /// Flat offset of a coordinate.  Panics if out of range; use
    /// `checked_index` for coordinates from external data.
    pub fn index(&self,coord: Coord) -> usize {
        match self.checked_index(coord) {
            Some(idx) => idx,
            None => panic!("coordinate {:?} outside fabric {:?}",coord,self.dims)
        }
    }
    pub fn checked_index(&self,coord: Coord) -> Option<usize> {
        for dim in 0..DIMS {
            if coord[dim] >= self.dims[dim] {
                return None;
            }
        }
        Some(flat_index(&self.dims,&coord))
    }
    /// O(1) coordinate lookup.
    pub fn mp(&self,coord: Coord) -> &Midplane {
        &self.mps[self.index(coord)]
    }
    pub fn mp_mut(&mut self,coord: Coord) -> &mut Midplane {
        let idx = self.index(coord);
        &mut self.mps[idx]
    }
    pub(crate) fn at(&self,idx: usize) -> &Midplane {
        &self.mps[idx]
    }
    pub(crate) fn at_mut(&mut self,idx: usize) -> &mut Midplane {
        &mut self.mps[idx]
    }
    pub fn iter(&self) -> impl Iterator<Item = &Midplane> {
        self.mps.iter()
    }
    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Midplane> {
        self.mps.iter_mut()
    }
    /// Clear every MP's allocation state.  Node states survive when
    /// `track_down` is set, so hardware-down MPs stay down.
    pub fn reset(&mut self,track_down: bool) {
        for mp in self.mps.iter_mut() {
            mp.clear(track_down);
        }
    }
    /// Override the location label of one MP.
    pub fn set_loc(&mut self,coord: Coord,loc: &str) {
        self.mp_mut(coord).loc = loc.to_string();
    }
    /// Resolve a location label to a coordinate.  Accepts both the `R000`
    /// and `R00-M0` spellings; comparison is case-insensitive.
    pub fn find_loc(&self,mp_id: &str) -> Option<Coord> {
        let check = normalize_loc(mp_id)?;
        for mp in self.mps.iter() {
            if mp.loc.eq_ignore_ascii_case(&check) {
                return Some(mp.coord);
            }
        }
        None
    }
    /// Seed scheduler-level state.  With no input every MP becomes idle and
    /// indices are assigned densely in grid order.  With a slice of
    /// `(name,state)` records, each name's trailing 4 characters locate the
    /// MP that receives the state and record index; unparseable names are
    /// skipped.
    pub fn init_states(&mut self,node_info: Option<&[(String,NodeState)]>) {
        match node_info {
            None => {
                for (i,mp) in self.mps.iter_mut().enumerate() {
                    mp.state = NodeState::empty();
                    mp.index = i;
                }
            },
            Some(records) => {
                for (j,(name,state)) in records.iter().enumerate() {
                    let coord = match hostlist::trailing_coord(name) {
                        Ok(c) => c,
                        Err(_) => {
                            warn!("node record {} has no parseable coordinate",name);
                            continue;
                        }
                    };
                    match self.checked_index(coord) {
                        Some(idx) => {
                            self.mps[idx].index = j;
                            self.mps[idx].state = *state;
                        },
                        None => warn!("node record {} is outside the fabric",name)
                    }
                }
            }
        }
    }
}

fn flat_index(dims: &[u16;DIMS],coord: &Coord) -> usize {
    let mut idx = 0usize;
    for dim in 0..DIMS {
        idx = idx * dims[dim] as usize + coord[dim] as usize;
    }
    idx
}

/// put a rack-midplane label into the `R00-M0` form
fn normalize_loc(mp_id: &str) -> Option<String> {
    let chars: Vec<char> = mp_id.chars().collect();
    if chars.len() == 4 && chars[1].is_ascii_digit() && chars[2].is_ascii_digit()
        && chars[3].is_ascii_digit() {
        return Some(format!("R{}{}-M{}",chars[1],chars[2],chars[3]));
    }
    if chars.len() == 6 && chars[3] == '-' && chars[1].is_ascii_digit()
        && chars[2].is_ascii_digit() && chars[5].is_ascii_digit() {
        return Some(mp_id.to_string());
    }
    None
}
