//! # `fabkit` main library
//!
//! This library is the geometric core of a block allocator for a
//! 4-dimensional toroidal compute fabric.  The fabric is a cartesian grid
//! of midplanes wired along four axes labeled A, X, Y, Z; every axis
//! closes into a ring.  The allocator carves out *blocks*, connected
//! sub-regions satisfying a requested shape and per-axis connectivity,
//! while tracking which inter-midplane wires each block consumes, so that
//! future requests do not conflict even when two blocks share no
//! midplanes but traverse the same passthrough wires.
//!
//! ## Architecture
//!
//! The work is split across four modules:
//! * `fabric` holds the grid: the flat midplane buffer, ring successor
//!   tables, per-midplane usage flags and per-axis switch words.
//! * `ba` is the allocator proper: the path finder that marks a ring
//!   segment along one axis, the coordinate filler that replicates the
//!   per-axis spines through the block's bounding box, the match engine
//!   that sweeps candidate starts and geometries, and the
//!   commit/release/validate operations.
//! * `geometry` supplies candidate shapes per block size and the fixed
//!   24-step orientation walk.
//! * `hostlist` is the label codec: the `0-9A-Z` coordinate alphabet and
//!   the compressed hostlist format blocks are reported in.
//!
//! ## State discipline
//!
//! An allocation attempt works entirely on a tentative overlay
//! (`alter_switch` words and the `ALTERED`/`PASS_BIT` usage flags).  A
//! successful attempt promotes the overlay into committed state and emits
//! the block's midplane records; a failed attempt rolls it back.  Between
//! public operations the overlay is always empty, so any sequence of
//! allocate/remove/check calls observes a consistent fabric.

pub mod fabric;
pub mod ba;
pub mod geometry;
pub mod hostlist;

use fabric::Midplane;

type DYNERR = Box<dyn std::error::Error>;
type STDRESULT = Result<(),Box<dyn std::error::Error>>;

/// Serialize a block's midplane records for external storage.
pub fn block_to_json(block: &[Midplane]) -> Result<String,DYNERR> {
    Ok(serde_json::to_string(block)?)
}

/// Recover a block's midplane records from external storage.
pub fn block_from_json(json: &str) -> Result<Vec<Midplane>,DYNERR> {
    Ok(serde_json::from_str(json)?)
}

/// Replay previously saved blocks into an allocator, e.g. while
/// recovering scheduler state after a restart.  The allocator should be
/// freshly reset; on conflict the partial updates are left in place.
pub fn replay_blocks(allocator: &mut ba::Allocator,saved: &[String]) -> STDRESULT {
    for json in saved {
        let block = block_from_json(json)?;
        allocator.check_and_set_mp_list(&block)?;
    }
    Ok(())
}
