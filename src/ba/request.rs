//! # Block Request
//!
//! A request names what the caller wants carved out of the fabric: either
//! an explicit per-axis geometry or a midplane count, the per-axis
//! connection types, an optional anchored start, and the tuning knobs for
//! the candidate walk.  Requests are built through
//! `Allocator::new_request`, which validates the inputs and attaches the
//! candidate geometry table for size-driven requests.

use std::fmt;
use serde::{Serialize,Deserialize};
use crate::fabric::types::{Coord,ConnType,DenyPass,DIMS};

/// An allocation request and, after a successful allocation, its outputs.
#[derive(Clone,Debug,Serialize,Deserialize)]
pub struct BlockRequest {
    /// anchor for the search
    pub start: Coord,
    /// when set, only `start` is tried
    pub start_req: bool,
    /// per-axis lengths; None for size-driven requests.  After a
    /// successful size-driven allocation this holds the geometry that won.
    pub geometry: Option<[u16;DIMS]>,
    /// midplane count (product of the geometry when one was given)
    pub size: u32,
    /// per-axis topology; `Small` in the first slot makes the whole
    /// request a single-MP block
    pub conn_type: [ConnType;DIMS],
    /// passthrough policy for this request; FOUND bits accumulate here
    pub deny_pass: DenyPass,
    /// try the orientations of the requested geometry
    pub rotate: bool,
    /// for size-driven requests, walk past the most compact shape class
    pub elongate: bool,
    /// candidate geometries in preference order (size-driven requests)
    pub geo_table: Vec<[u16;DIMS]>,
    /// OUT: compressed hostlist of the committed body midplanes
    pub save_name: Option<String>,
    /// OUT: axes on which a passthrough was considered
    pub passthroughs: DenyPass
}

impl BlockRequest {
    pub fn new(conn_type: [ConnType;DIMS]) -> Self {
        Self {
            start: [0;DIMS],
            start_req: false,
            geometry: None,
            size: 0,
            conn_type,
            deny_pass: DenyPass::empty(),
            rotate: false,
            elongate: false,
            geo_table: Vec::new(),
            save_name: None,
            passthroughs: DenyPass::empty()
        }
    }
}

impl fmt::Display for BlockRequest {
    fn fmt(&self,f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f,"block request:")?;
        match self.geometry {
            Some(geo) => writeln!(f,"    geometry: {:?}",geo)?,
            None => writeln!(f,"    geometry: {} candidates for size",self.geo_table.len())?
        };
        writeln!(f,"   conn_type: {:?}",self.conn_type)?;
        writeln!(f,"        size: {}",self.size)?;
        writeln!(f,"       start: {:?}{}",self.start,match self.start_req {
            true => " (required)",
            false => ""
        })?;
        writeln!(f,"      rotate: {}",self.rotate)?;
        write!(f,"    elongate: {}",self.elongate)
    }
}
