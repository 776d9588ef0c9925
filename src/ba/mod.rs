//! # Block Allocator Module
//!
//! The allocator owns the fabric and carves *blocks* out of it: connected
//! sub-regions satisfying a requested geometry and per-axis connection
//! type.  Beyond the midplanes themselves it tracks which inter-MP wires
//! each block consumes, so that two blocks sharing no midplanes but
//! traversing the same passthrough wires still conflict.
//!
//! An allocation attempt works on a tentative overlay: the path finder and
//! coordinate filler mark midplanes `ALTERED` and record wire usage in
//! `alter_switch`.  A successful attempt promotes the overlay into the
//! committed state and emits the block's midplane records; a failed
//! attempt rolls the overlay back.  At the boundary of every public
//! operation the overlay is empty.

pub mod request;

use bit_vec::BitVec;
use log::{debug,info,warn,error};
use crate::fabric::{Fabric,Midplane};
use crate::fabric::types::*;
use crate::geometry::{GeoSystem,rotate_geo,ROTATIONS};
use crate::hostlist;
use request::BlockRequest;

/// The block allocator: the fabric plus the geometry tables and the
/// passthrough policy in force.
pub struct Allocator {
    fabric: Fabric,
    main_geo: GeoSystem,
    mp_geo: GeoSystem,
    /// policy consulted while an attempt is in flight
    deny_pass: DenyPass,
    /// cluster-wide default inherited by new requests
    default_deny: DenyPass
}

impl Allocator {
    /// Build the fabric and both geometry systems: one for the midplane
    /// grid itself and one for the fixed sub-midplane unit system.
    pub fn new(dims: [u16;DIMS]) -> Self {
        let fabric = Fabric::create(dims);
        let main_geo = GeoSystem::new(&dims);
        let mp_geo = GeoSystem::new(&[4,4,4,4,2]);
        Self {
            fabric,
            main_geo,
            mp_geo,
            deny_pass: DenyPass::empty(),
            default_deny: DenyPass::empty()
        }
    }
    pub fn fabric(&self) -> &Fabric {
        &self.fabric
    }
    pub fn fabric_mut(&mut self) -> &mut Fabric {
        &mut self.fabric
    }
    pub fn main_geo(&self) -> &GeoSystem {
        &self.main_geo
    }
    pub fn mp_geo(&self) -> &GeoSystem {
        &self.mp_geo
    }
    /// Cluster-wide passthrough policy inherited by requests built here.
    pub fn set_deny_policy(&mut self,deny: DenyPass) {
        self.default_deny = deny;
    }

    /// Create a block request.  If `geometry` is given `size` is ignored
    /// and recomputed from it; otherwise the request is size-driven and
    /// the candidate table for `size` is attached.
    pub fn new_request(&self,geometry: Option<[u16;DIMS]>,size: u32,
                       conn_type: [ConnType;DIMS]) -> Result<BlockRequest,Error> {
        let mut req = BlockRequest::new(conn_type);
        req.deny_pass = self.default_deny;
        let dims = self.fabric.dims();
        if let Some(geo) = geometry {
            for dim in 0..DIMS {
                if geo[dim] < 1 || geo[dim] > dims[dim] {
                    error!("request geometry is invalid, axis {} can't be {}, largest is {}",
                        dim,geo[dim],dims[dim]);
                    return Err(Error::BadGeometry);
                }
            }
            req.geometry = Some(geo);
            req.size = geo.iter().map(|g| *g as u32).product();
            return Ok(req);
        }
        if size == 0 {
            error!("no size or geometry given");
            return Err(Error::EmptyRequest);
        }
        let table = match self.main_geo.table_for(size) {
            Some(t) => t,
            None => {
                error!("no geometries for {} midplanes",size);
                return Err(Error::NoGeometry);
            }
        };
        for geo in table {
            let mut fixed: [u16;DIMS] = [0;DIMS];
            fixed.copy_from_slice(geo);
            req.geo_table.push(fixed);
        }
        req.size = size;
        Ok(req)
    }

    /// Try to allocate a block.  On success the committed midplane records
    /// are appended to `results`, the compressed hostlist of body MPs is
    /// returned and also stored in `req.save_name`, and the FOUND
    /// passthrough bits are published in `req.passthroughs`.
    pub fn allocate_block(&mut self,req: &mut BlockRequest,
                          results: &mut Vec<Midplane>) -> Result<String,Error> {
        debug!("{}",req);
        self.deny_pass = req.deny_pass;
        let outcome = self.find_match(req,results);
        req.passthroughs = self.deny_pass & DenyPass::FOUND_ALL;
        req.deny_pass = self.deny_pass;
        self.deny_pass = DenyPass::empty();
        match outcome {
            Some(name) => {
                info!("allocated block {}",name);
                req.save_name = Some(name.clone());
                Ok(name)
            },
            None => Err(Error::NoFit)
        }
    }

    /// Release a prior allocation given its midplane records.  Body records
    /// free their midplane; every record's committed switch contribution is
    /// subtracted from the fabric.  Small blocks hold a single MP and no
    /// wires, so only the first record matters.
    pub fn remove_block(&mut self,mps: &[Midplane],is_small: bool) {
        for rec in mps {
            let idx = self.fabric.index(rec.coord);
            let mp = self.fabric.at_mut(idx);
            if !rec.used.is_empty() {
                mp.used &= !MpUsage::TRUE;
            }
            mp.used &= !MpUsage::ALTERED_PASS;
            if is_small {
                break;
            }
            for dim in 0..DIMS {
                mp.axis_switch[dim] &= !rec.axis_switch[dim];
            }
        }
        info!("released block of {} records",mps.len());
    }

    /// Replay an externally-built block into the fabric: a dry-run check
    /// that commits as it goes.  Two blocks that share no midplanes can
    /// still collide on passthrough wires, which a plain midplane bitmap
    /// comparison would never reveal; this walks the per-axis switch words
    /// bit for bit.
    ///
    /// On conflict the updates already applied are left in place; callers
    /// are expected to `reset` before replaying a block set.
    pub fn check_and_set_mp_list(&mut self,mps: &[Midplane]) -> Result<(),Error> {
        for rec in mps {
            let idx = match self.fabric.checked_index(rec.coord) {
                Some(idx) => idx,
                None => return Err(Error::OutOfBounds)
            };
            let curr = self.fabric.at(idx);
            if !rec.used.is_empty() && !curr.used.is_empty() {
                // a block may take over a midplane that is hard-down
                // outside of it; anything else is a real conflict
                if !curr.state.hard_down() {
                    debug!("already at mp {}, used {:?} vs {:?}",
                        rec.coord_str,rec.used,curr.used);
                    return Err(Error::Conflict);
                }
            }
            if !rec.used.is_empty() {
                self.fabric.at_mut(idx).used |= rec.used;
            }
            for dim in 0..DIMS {
                if rec.axis_switch[dim].is_empty() {
                    continue;
                }
                let curr_usage = self.fabric.at(idx).axis_switch[dim];
                if rec.axis_switch[dim].intersects(curr_usage) {
                    debug!("{}({}) is already in use the way we want to use it: {:?} at {:?}",
                        rec.coord_str,dim,rec.axis_switch[dim],curr_usage);
                    return Err(Error::Conflict);
                }
                self.fabric.at_mut(idx).axis_switch[dim] |= rec.axis_switch[dim];
            }
        }
        Ok(())
    }

    /// Restore the fabric to a virgin state.  Hardware-down midplanes keep
    /// their state when `track_down` is set.
    pub fn reset(&mut self,track_down: bool) {
        self.fabric.reset(track_down);
    }

    /// Mark every midplane outside the given hostlist as reserved, so a
    /// following allocation can only draw bodies from the whitelist.
    pub fn set_all_except(&mut self,mps: &str) -> Result<(),Error> {
        let mut keep = BitVec::from_elem(self.fabric.len(),false);
        for host in hostlist::expand(mps)? {
            let coord = hostlist::trailing_coord(&host)?;
            match self.fabric.checked_index(coord) {
                Some(idx) => keep.set(idx,true),
                None => return Err(Error::OutOfBounds)
            }
        }
        for (idx,mp) in self.fabric.iter_mut().enumerate() {
            if !keep[idx] {
                mp.used |= MpUsage::TEMP;
            }
        }
        Ok(())
    }

    /// Lift every reservation made by `set_all_except`.
    pub fn clear_all_temp(&mut self) {
        for mp in self.fabric.iter_mut() {
            mp.used &= !MpUsage::TEMP;
        }
    }

    /// Drive a single (start, geometry) attempt: one path per axis from
    /// the start MP, then replicate the spines across the block's bounding
    /// box.  On success the tentative state is promoted: committed into
    /// the fabric and cloned into `results` when a list is given, or
    /// simply discarded (leaving the fabric untouched) when none is.
    /// Returns the compressed hostlist of body midplanes.
    ///
    /// A failed attempt rolls back every midplane it touched; committed
    /// state is never affected by failure.
    pub fn place_block(&mut self,results: Option<&mut Vec<Midplane>>,start: Coord,
                       geometry: [u16;DIMS],conn_type: [ConnType;DIMS]) -> Result<String,Error> {
        let dims = self.fabric.dims();
        for dim in 0..DIMS {
            if start[dim] >= dims[dim] {
                return Err(Error::OutOfBounds);
            }
            if geometry[dim] < 1 {
                error!("geometry of {} in axis {} needs to be at least 1",geometry[dim],dim);
                return Err(Error::BadGeometry);
            }
        }
        let start_idx = self.fabric.index(start);
        debug!("trying mp {} geometry {:?} {:?}",
            self.fabric.at(start_idx).coord_str,geometry,conn_type[0]);

        if conn_type[0] == ConnType::Small {
            if self.fabric.at(start_idx).used_on(0) {
                return Err(Error::NoFit);
            }
            self.fabric.at_mut(start_idx).used |= MpUsage::TRUE;
            let name = self.fabric.at(start_idx).coord_str.clone();
            if let Some(list) = results {
                list.push(self.fabric.at(start_idx).clone());
            }
            return Ok(name);
        }

        let mut main_mps: Vec<usize> = vec![start_idx];
        let mut block_end = start;
        let mut pass_end = start;
        for dim in 0..DIMS {
            if !self.find_path(&mut main_mps,start_idx,dim,geometry[dim],conn_type[dim],
                               &mut block_end[dim],&mut pass_end[dim]) {
                self.rollback(&main_mps);
                return Err(Error::NoFit);
            }
        }
        debug!("complete box is {:?} x {:?} pass to {:?}",start,block_end,pass_end);

        let mut check_mp = [start_idx;DIMS];
        let mut coords: Coord = [0;DIMS];
        if !self.fill_in_coords(&mut main_mps,0,start_idx,&mut check_mp,
                                &start,&block_end,&pass_end,&mut coords) {
            self.rollback(&main_mps);
            return Err(Error::NoFit);
        }

        let name = match results {
            Some(list) => self.copy_from_main(&main_mps,list),
            None => self.reset_altered(&main_mps)
        };
        debug!("name = {}",name);
        Ok(name)
    }

    /// the deterministic search: candidates in preference order, Z-major
    /// start sweep per candidate
    fn find_match(&mut self,req: &mut BlockRequest,
                  results: &mut Vec<Midplane>) -> Option<String> {
        let dims = self.fabric.dims();
        if req.start_req {
            for dim in 0..DIMS {
                if req.start[dim] >= dims[dim] {
                    return None;
                }
            }
        }
        let candidates = candidate_geometries(req);
        if candidates.is_empty() {
            error!("no candidate geometries for this request");
            return None;
        }
        for geometry in candidates {
            if (0..DIMS).any(|dim| geometry[dim] > dims[dim]) {
                continue;
            }
            debug!("finding {:?}",geometry);
            let mut start = match req.start_req {
                true => req.start,
                false => [0;DIMS]
            };
            loop {
                if (0..DIMS).all(|dim| start[dim] + geometry[dim] <= dims[dim]) {
                    debug!("starting at {:?}",start);
                    if let Ok(name) = self.place_block(Some(&mut *results),start,geometry,req.conn_type) {
                        req.geometry = Some(geometry);
                        return Some(name);
                    }
                }
                if req.start_req {
                    break;
                }
                if !advance_start(&mut start,&geometry,&dims) {
                    break;
                }
            }
        }
        debug!("can't allocate");
        None
    }

    /// Record that a passthrough was considered on `dim`; true when the
    /// policy in force forbids it.
    fn check_deny_pass(&mut self,dim: usize) -> bool {
        if self.deny_pass.is_empty() {
            return false;
        }
        let axis = Axis::from_dim(dim);
        self.deny_pass |= DenyPass::found(axis);
        if self.deny_pass.contains(DenyPass::deny(axis)) {
            debug!("we don't allow {} passthroughs",axis);
            return true;
        }
        false
    }

    /// Mark a ring segment of `geometry` body MPs along `dim` starting at
    /// `start_idx`, traversing unused MPs as passthroughs where needed to
    /// close a torus.  Updates the tentative overlay only.  `block_end`
    /// advances to the furthest body coordinate on the axis and `pass_end`
    /// to the furthest touched coordinate.  Newly touched MPs are appended
    /// to `mps`.
    fn find_path(&mut self,mps: &mut Vec<usize>,start_idx: usize,dim: usize,
                 geometry: u16,conn_type: ConnType,
                 block_end: &mut u16,pass_end: &mut u16) -> bool {
        if self.fabric.at(start_idx).used_on(dim) {
            return false;
        }
        if geometry == 1 {
            // only the IN/OUT ports matter here, so MESH needs no wire at all
            let mp = self.fabric.at_mut(start_idx);
            mp.used |= MpUsage::ALTERED;
            if conn_type == ConnType::Torus {
                mp.alter_switch[dim] |= SwitchUsage::WRAPPED;
                debug!("using mp {}({}) wrapped on itself",mp.coord_str,dim);
            }
            return true;
        }
        if self.fabric.at(start_idx).out_used_on(dim) {
            return false;
        }
        {
            let mp = self.fabric.at_mut(start_idx);
            mp.used |= MpUsage::ALTERED;
            mp.alter_switch[dim] |= SwitchUsage::OUT | SwitchUsage::OUT_PASS;
        }
        let mut count: u16 = 1;
        let mut curr = self.fabric.at(start_idx).next_mp[dim];
        while curr != start_idx {
            // the walk only ever enters from an unused MP, so a committed
            // inbound through-wire here means the state is corrupt
            debug_assert!(!self.fabric.at(curr).axis_switch[dim].contains(SwitchUsage::IN_PASS),
                "corrupt axis switch at {} dim {}",self.fabric.at(curr).coord_str,dim);
            let coord_on_dim = self.fabric.at(curr).coord[dim];
            if coord_on_dim > *pass_end {
                *pass_end = coord_on_dim;
            }
            if count < geometry && !self.fabric.at(curr).used_on(dim) {
                if coord_on_dim > *block_end {
                    *block_end = coord_on_dim;
                }
                count += 1;
                let newly = !self.fabric.at(curr).used.contains(MpUsage::ALTERED);
                let mp = self.fabric.at_mut(curr);
                mp.used |= MpUsage::ALTERED;
                mp.alter_switch[dim] |= SwitchUsage::IN | SwitchUsage::IN_PASS;
                if count < geometry || conn_type == ConnType::Torus {
                    mp.alter_switch[dim] |= SwitchUsage::OUT | SwitchUsage::OUT_PASS;
                    debug!("using mp {}({}) {} of {}",mp.coord_str,dim,count,geometry);
                } else if conn_type == ConnType::Mesh {
                    // open-ended run terminates in place
                    debug!("using mp {}({}) {} of {} as mesh end",mp.coord_str,dim,count,geometry);
                    if newly {
                        mps.push(curr);
                    }
                    return true;
                }
                if newly {
                    mps.push(curr);
                }
            } else if !self.fabric.at(curr).out_used_on(dim) && !self.check_deny_pass(dim) {
                let newly = !self.fabric.at(curr).used.contains(MpUsage::ALTERED);
                let mp = self.fabric.at_mut(curr);
                if newly {
                    mp.used |= MpUsage::ALTERED_PASS;
                }
                mp.alter_switch[dim] |= SwitchUsage::PASS;
                match count == geometry {
                    true => debug!("using mp {}({}) to finish torus",mp.coord_str,dim),
                    false => debug!("using mp {}({}) as passthrough",mp.coord_str,dim)
                };
                if newly {
                    mps.push(curr);
                }
            } else {
                debug!("can't route past {}({})",self.fabric.at(curr).coord_str,dim);
                return false;
            }
            curr = self.fabric.at(curr).next_mp[dim];
        }
        if count != geometry {
            return false;
        }
        // back at the start; close the ring through whatever we traversed
        debug_assert!(!self.fabric.at(start_idx).axis_switch[dim].contains(SwitchUsage::IN_PASS),
            "corrupt axis switch at {} dim {}",self.fabric.at(start_idx).coord_str,dim);
        let mp = self.fabric.at_mut(start_idx);
        mp.alter_switch[dim] |= SwitchUsage::IN | SwitchUsage::IN_PASS;
        true
    }

    /// Replicate the per-axis spines through the block's bounding box,
    /// bonding switch usage onto every midplane inside it.  Level by level
    /// A through Z; at the innermost level the current MP receives each
    /// spine's usage on the matching axis.
    fn fill_in_coords(&mut self,results: &mut Vec<usize>,level: usize,start_idx: usize,
                      check_mp: &mut [usize;DIMS],block_start: &Coord,
                      block_end: &Coord,pass_end: &Coord,coords: &mut Coord) -> bool {
        if level < DIMS {
            check_mp[level] = start_idx;
            for c in block_start[level]..=pass_end[level] {
                coords[level] = c;
                if !self.fill_in_coords(results,level+1,start_idx,check_mp,
                                        block_start,block_end,pass_end,coords) {
                    return false;
                }
                check_mp[level] = self.fabric.at(check_mp[level]).next_mp[level];
            }
            return true;
        }

        let curr = self.fabric.index(*coords);
        // an MP beyond the block on more than one passthrough tail is
        // outside the region that needs wiring
        let mut count_over = 0;
        let mut used = MpUsage::empty();
        for dim in 0..DIMS {
            let spine = self.fabric.at(check_mp[dim]);
            if spine.used.contains(MpUsage::PASS_BIT) {
                if self.fabric.at(curr).coord[dim] > block_end[dim] {
                    count_over += 1;
                    if count_over > 1 {
                        break;
                    }
                }
                used = spine.used;
            }
        }
        if count_over > 1 {
            debug!("skipping unwired {}",self.fabric.at(curr).coord_str);
            return true;
        }

        for dim in 0..DIMS {
            // while riding a passthrough tail only the passthrough axis is copied
            if used.contains(MpUsage::PASS_BIT) && self.fabric.at(check_mp[dim]).used != used {
                continue;
            }
            match self.copy_switch(curr,check_mp[dim],dim) {
                None => return false,
                Some(true) => results.push(curr),
                Some(false) => {}
            }
        }
        true
    }

    /// Bond one spine MP's tentative usage onto `curr` for one axis.
    /// Some(true) when this is the first touch of `curr`, Some(false) when
    /// nothing needed doing, None on a conflict with committed state.
    fn copy_switch(&mut self,curr: usize,orig: usize,dim: usize) -> Option<bool> {
        if !self.fabric.at(curr).alter_switch[dim].is_empty() {
            return Some(false);
        }
        let orig_used = self.fabric.at(orig).used;
        let orig_alter = self.fabric.at(orig).alter_switch[dim];
        if orig_used.contains(MpUsage::PASS_BIT)
            || self.fabric.at(curr).used.contains(MpUsage::PASS_BIT) {
            if !orig_alter.intersects(SwitchUsage::PASS_FLAG) {
                debug!("skipping {}({})",self.fabric.at(curr).coord_str,dim);
                return Some(false);
            }
        } else if self.fabric.at(curr).used_on(dim) {
            debug!("{} is already used",self.fabric.at(curr).coord_str);
            return None;
        }
        let mut added = false;
        if !self.fabric.at(curr).used.contains(MpUsage::ALTERED) {
            if self.fabric.at(curr).axis_switch[dim].intersects(orig_alter) {
                debug!("{} switches {} overlapped {:?} onto {:?}",
                    self.fabric.at(curr).coord_str,dim,orig_alter,
                    self.fabric.at(curr).axis_switch[dim]);
                return None;
            }
            added = true;
        }
        let mp = self.fabric.at_mut(curr);
        mp.used |= orig_used;
        mp.alter_switch[dim] |= orig_alter;
        Some(added)
    }

    /// Promote the tentative overlay: clone each altered MP into
    /// `ret_list` with its tentative usage as the committed record, OR the
    /// usage into the fabric, and clear the overlay.  Returns the
    /// compressed hostlist of body midplanes.
    fn copy_from_main(&mut self,main_mps: &[usize],ret_list: &mut Vec<Midplane>) -> String {
        let mut labels: Vec<String> = Vec::new();
        for &idx in main_mps {
            if !self.fabric.at(idx).used.contains(MpUsage::ALTERED) {
                warn!("mp {} in the working set was never altered",
                    self.fabric.at(idx).coord_str);
                continue;
            }
            let mut new_mp = self.fabric.at(idx).clone();
            new_mp.axis_switch = new_mp.alter_switch;
            new_mp.alter_switch = [SwitchUsage::empty();DIMS];
            if new_mp.used.contains(MpUsage::PASS_BIT) {
                debug!("mp {} is used for passthrough",new_mp.coord_str);
                new_mp.used = MpUsage::empty();
            } else {
                debug!("mp {} is used",new_mp.coord_str);
                new_mp.used = MpUsage::TRUE;
                self.fabric.at_mut(idx).used |= MpUsage::TRUE;
                labels.push(new_mp.coord_str.clone());
            }
            let mp = self.fabric.at_mut(idx);
            mp.used &= !MpUsage::ALTERED_PASS;
            mp.alter_switch = [SwitchUsage::empty();DIMS];
            for dim in 0..DIMS {
                mp.axis_switch[dim] |= new_mp.axis_switch[dim];
            }
            ret_list.push(new_mp);
        }
        hostlist::compress(&labels)
    }

    /// Discard the tentative overlay without committing, still reporting
    /// the body hostlist the attempt would have produced.
    fn reset_altered(&mut self,main_mps: &[usize]) -> String {
        let mut labels: Vec<String> = Vec::new();
        for &idx in main_mps {
            if !self.fabric.at(idx).used.contains(MpUsage::ALTERED) {
                warn!("mp {} in the working set was never altered",
                    self.fabric.at(idx).coord_str);
                continue;
            }
            if self.fabric.at(idx).used.contains(MpUsage::PASS_BIT) {
                debug!("mp {} is used for passthrough",self.fabric.at(idx).coord_str);
            } else {
                labels.push(self.fabric.at(idx).coord_str.clone());
            }
            let mp = self.fabric.at_mut(idx);
            mp.used &= !MpUsage::ALTERED_PASS;
            mp.alter_switch = [SwitchUsage::empty();DIMS];
        }
        hostlist::compress(&labels)
    }

    /// Clear the tentative overlay from every MP a failed attempt touched.
    fn rollback(&mut self,main_mps: &[usize]) {
        for &idx in main_mps {
            let mp = self.fabric.at_mut(idx);
            mp.used &= !MpUsage::ALTERED_PASS;
            mp.alter_switch = [SwitchUsage::empty();DIMS];
        }
    }
}

/// the candidate geometries of a request, in the order the match engine
/// will try them
fn candidate_geometries(req: &BlockRequest) -> Vec<[u16;DIMS]> {
    if let Some(geo) = req.geometry {
        if !req.rotate {
            return vec![geo];
        }
        let mut cands = vec![geo];
        let mut g = geo;
        for rot in 0..ROTATIONS {
            rotate_geo(&mut g,rot);
            if !cands.contains(&g) {
                cands.push(g);
            }
        }
        return cands;
    }
    let mut table = req.geo_table.clone();
    if !req.rotate {
        // without rotation only canonically-ordered shapes are tried
        table.retain(|g| g.windows(2).all(|w| w[0] <= w[1]));
    }
    if !req.elongate {
        if let Some(best) = table.iter().map(|g| *g.iter().max().unwrap()).min() {
            table.retain(|g| *g.iter().max().unwrap() == best);
        }
    }
    table
}

/// advance a start coordinate in Z-major order, keeping the whole
/// geometry inside the fabric
fn advance_start(start: &mut Coord,geometry: &[u16;DIMS],dims: &[u16;DIMS]) -> bool {
    for dim in (0..DIMS).rev() {
        if start[dim] + 1 + geometry[dim] <= dims[dim] {
            start[dim] += 1;
            return true;
        }
        start[dim] = 0;
    }
    false
}
