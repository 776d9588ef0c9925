
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use thiserror::Error;
use std::str::FromStr;
use std::fmt;
use serde::{Serialize,Deserialize};

/// Number of axes in the fabric.
pub const DIMS: usize = 4;

/// Position of a midplane, ordered `(a,x,y,z)`.
pub type Coord = [u16;DIMS];

/// Enumerates allocator errors.  The `Display` trait will print an equivalent long message.
#[derive(Error,Debug,PartialEq)]
pub enum Error {
    #[error("no size or geometry given")]
    EmptyRequest,
    #[error("request geometry is invalid")]
    BadGeometry,
    #[error("coordinate is outside the fabric")]
    OutOfBounds,
    #[error("no geometries for requested size")]
    NoGeometry,
    #[error("no placement found")]
    NoFit,
    #[error("conflicts with committed fabric state")]
    Conflict,
    #[error("hostlist expression could not be interpreted")]
    BadHostlist,
    #[error("unknown connection type")]
    UnknownConnType
}

/// The four axes of the fabric.  Every axis closes into a ring.
#[derive(Clone,Copy,PartialEq,Eq,Debug,FromPrimitive)]
pub enum Axis {
    A = 0,
    X = 1,
    Y = 2,
    Z = 3
}

impl Axis {
    pub const ALL: [Axis;DIMS] = [Axis::A,Axis::X,Axis::Y,Axis::Z];
    /// Panics if `dim` is not a valid axis index.
    pub fn from_dim(dim: usize) -> Self {
        match FromPrimitive::from_usize(dim) {
            Some(ax) => ax,
            None => panic!("axis index {} out of range",dim)
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self,f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f,"A"),
            Self::X => write!(f,"X"),
            Self::Y => write!(f,"Y"),
            Self::Z => write!(f,"Z")
        }
    }
}

/// Per-axis topology of a block, available conversions are:
/// * ConnType to u16: `as u16`
/// * u16 to ConnType: `FromPrimitive::from_u16`
/// * &str to ConnType: `ConnType::from_str`
#[derive(Clone,Copy,PartialEq,Eq,Debug,FromPrimitive,Serialize,Deserialize)]
pub enum ConnType {
    /// axis does not wrap, endpoints terminate in place
    Mesh = 1,
    /// axis wraps, endpoints are wired back together through any passthroughs
    Torus = 2,
    /// sub-midplane block, occupies exactly one MP and no inter-MP wires
    Small = 4
}

impl FromStr for ConnType {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self,Self::Err> {
        // string can be the wire value itself
        if let Ok(num) = u16::from_str(s) {
            return match FromPrimitive::from_u16(num) {
                Some(typ) => Ok(typ),
                _ => Err(Error::UnknownConnType)
            };
        }
        match s {
            "mesh" => Ok(Self::Mesh),
            "torus" => Ok(Self::Torus),
            "small" => Ok(Self::Small),
            _ => Err(Error::UnknownConnType)
        }
    }
}

bitflags::bitflags! {
    /// Usage of the wires at one midplane along one axis.
    ///
    /// The endpoint bits (`IN`/`OUT`) and the through-wire bits
    /// (`IN_PASS`/`OUT_PASS`/`PASS`/`WRAPPED`) are independent; usages of
    /// distinct blocks may share a switch as long as they do not overlap
    /// bit for bit.
    #[derive(Clone,Copy,PartialEq,Eq,Debug,Default,Serialize,Deserialize)]
    pub struct SwitchUsage: u16 {
        /// this MP terminates a block run arriving on this axis
        const IN = 0x0001;
        /// this MP terminates a block run departing on this axis
        const OUT = 0x0002;
        /// the through-wire carries the block's signal inbound
        const IN_PASS = 0x0004;
        /// the through-wire carries the block's signal outbound
        const OUT_PASS = 0x0008;
        /// the MP conducts a signal it takes no compute part in
        const PASS = 0x0010;
        /// a single-MP torus has the wire looped back on itself
        const WRAPPED = 0x0020;
        /// any traversal of the through-wires
        const PASS_USED = Self::IN_PASS.bits() | Self::OUT_PASS.bits()
            | Self::PASS.bits() | Self::WRAPPED.bits();
        /// the purely-passthrough subset consulted during tentative propagation
        const PASS_FLAG = Self::PASS.bits() | Self::WRAPPED.bits();
    }
}

bitflags::bitflags! {
    /// Allocation usage of a midplane.  An empty value means free.
    #[derive(Clone,Copy,PartialEq,Eq,Debug,Default,Serialize,Deserialize)]
    pub struct MpUsage: u8 {
        /// compute-committed to a live block
        const TRUE = 0x01;
        /// reserved by external policy (whitelist masking)
        const TEMP = 0x02;
        /// touched by the in-flight allocation attempt
        const ALTERED = 0x04;
        /// tentatively marked as a passthrough
        const PASS_BIT = 0x08;
        /// the tentative overlay as a clearing mask
        const ALTERED_PASS = Self::ALTERED.bits() | Self::PASS_BIT.bits();
    }
}

impl MpUsage {
    /// Strip the tentative overlay, leaving the committed portion.
    pub fn committed(&self) -> MpUsage {
        *self & !MpUsage::ALTERED_PASS
    }
}

bitflags::bitflags! {
    /// Scheduler-level node state.  An empty value means idle.
    #[derive(Clone,Copy,PartialEq,Eq,Debug,Default,Serialize,Deserialize)]
    pub struct NodeState: u8 {
        const DOWN = 0x01;
        const DRAIN = 0x02;
        const FAIL = 0x04;
    }
}

impl NodeState {
    /// True when the midplane is hard unusable (down, draining, or failed).
    pub fn hard_down(&self) -> bool {
        self.intersects(NodeState::DOWN | NodeState::DRAIN | NodeState::FAIL)
    }
}

bitflags::bitflags! {
    /// Per-axis passthrough policy and discovery record.
    ///
    /// The DENY bits forbid passthroughs on an axis.  Whenever the path
    /// finder considers a passthrough it ORs the matching FOUND bit, so a
    /// caller can see which axes the placement actually routed through.
    #[derive(Clone,Copy,PartialEq,Eq,Debug,Default,Serialize,Deserialize)]
    pub struct DenyPass: u16 {
        const DENY_A = 0x0001;
        const DENY_X = 0x0002;
        const DENY_Y = 0x0004;
        const DENY_Z = 0x0008;
        const FOUND_A = 0x0010;
        const FOUND_X = 0x0020;
        const FOUND_Y = 0x0040;
        const FOUND_Z = 0x0080;
        const DENY_ALL = Self::DENY_A.bits() | Self::DENY_X.bits()
            | Self::DENY_Y.bits() | Self::DENY_Z.bits();
        const FOUND_ALL = Self::FOUND_A.bits() | Self::FOUND_X.bits()
            | Self::FOUND_Y.bits() | Self::FOUND_Z.bits();
    }
}

impl DenyPass {
    pub fn deny(axis: Axis) -> DenyPass {
        match axis {
            Axis::A => DenyPass::DENY_A,
            Axis::X => DenyPass::DENY_X,
            Axis::Y => DenyPass::DENY_Y,
            Axis::Z => DenyPass::DENY_Z
        }
    }
    pub fn found(axis: Axis) -> DenyPass {
        match axis {
            Axis::A => DenyPass::FOUND_A,
            Axis::X => DenyPass::FOUND_X,
            Axis::Y => DenyPass::FOUND_Y,
            Axis::Z => DenyPass::FOUND_Z
        }
    }
}
