// tests of torus blocks on a fresh 1x4x4x4 fabric
use fabkit::ba::Allocator;
use fabkit::fabric::Midplane;
use fabkit::fabric::types::{ConnType,DenyPass,Error,MpUsage,SwitchUsage,DIMS};

const ENDPOINTS: SwitchUsage = SwitchUsage::IN
    .union(SwitchUsage::OUT)
    .union(SwitchUsage::IN_PASS)
    .union(SwitchUsage::OUT_PASS);

fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// the tentative overlay must be gone at every public-operation boundary
fn assert_clean(ba: &Allocator) {
    for mp in ba.fabric().iter() {
        assert!(!mp.used.intersects(MpUsage::ALTERED_PASS),
            "tentative usage left on {}",mp.coord_str);
        for dim in 0..DIMS {
            assert!(mp.alter_switch[dim].is_empty(),
                "tentative switch left on {}({})",mp.coord_str,dim);
        }
    }
}

#[test]
fn eight_mp_cube() {
    init_log();
    let mut ba = Allocator::new([1,4,4,4]);
    let mut req = ba.new_request(Some([1,2,2,2]),0,[ConnType::Torus;4]).expect("bad request");
    req.start_req = true;
    let mut results: Vec<Midplane> = Vec::new();
    let name = ba.allocate_block(&mut req,&mut results).expect("no fit");
    assert_eq!(name,"[0000x0111]");
    assert_eq!(req.save_name,Some(name));
    let body: Vec<&Midplane> = results.iter().filter(|m| m.used.contains(MpUsage::TRUE)).collect();
    assert_eq!(body.len(),8);
    // every corner of the 2x2x2 box terminates and re-enters on X, Y, Z,
    // and the singleton A axis is wrapped on itself
    for mp in &body {
        assert_eq!(mp.axis_switch[0],SwitchUsage::WRAPPED);
        for dim in 1..DIMS {
            assert_eq!(mp.axis_switch[dim],ENDPOINTS);
        }
    }
    // the fabric carries the same committed wiring
    assert!(ba.fabric().mp([0,0,0,0]).used.contains(MpUsage::TRUE));
    assert_eq!(ba.fabric().mp([0,1,1,0]).axis_switch[2],ENDPOINTS);
    assert_clean(&ba);
}

#[test]
fn second_cube_in_the_far_corner() {
    init_log();
    let mut ba = Allocator::new([1,4,4,4]);
    let mut req = ba.new_request(Some([1,2,2,2]),0,[ConnType::Torus;4]).expect("bad request");
    req.start_req = true;
    let mut results: Vec<Midplane> = Vec::new();
    ba.allocate_block(&mut req,&mut results).expect("no fit");

    let mut req2 = ba.new_request(Some([1,2,2,2]),0,[ConnType::Torus;4]).expect("bad request");
    req2.start = [0,2,2,2];
    req2.start_req = true;
    let mut results2: Vec<Midplane> = Vec::new();
    let name2 = ba.allocate_block(&mut req2,&mut results2).expect("no fit");
    assert_eq!(name2,"[0222x0333]");
    let body2: Vec<&Midplane> = results2.iter().filter(|m| m.used.contains(MpUsage::TRUE)).collect();
    assert_eq!(body2.len(),8);
    // the two blocks share no midplanes
    for mp in &body2 {
        assert!(!results.iter().any(|m| m.coord == mp.coord));
    }
    assert_clean(&ba);
}

#[test]
fn used_start_is_refused() {
    init_log();
    let mut ba = Allocator::new([1,4,4,4]);
    let mut req = ba.new_request(Some([1,2,2,2]),0,[ConnType::Torus;4]).expect("bad request");
    req.start_req = true;
    let mut results: Vec<Midplane> = Vec::new();
    ba.allocate_block(&mut req,&mut results).expect("no fit");

    let mut req2 = ba.new_request(Some([1,3,1,1]),0,[ConnType::Torus;4]).expect("bad request");
    req2.start_req = true;
    let mut results2: Vec<Midplane> = Vec::new();
    assert_eq!(ba.allocate_block(&mut req2,&mut results2),Err(Error::NoFit));
    assert!(results2.is_empty());
    assert_clean(&ba);
}

#[test]
fn mesh_over_used_midplanes_is_refused() {
    init_log();
    let mut ba = Allocator::new([1,4,4,4]);
    for corner in [[0,0,0,0],[0,2,2,2]] {
        let mut req = ba.new_request(Some([1,2,2,2]),0,[ConnType::Torus;4]).expect("bad request");
        req.start = corner;
        req.start_req = true;
        let mut results: Vec<Midplane> = Vec::new();
        ba.allocate_block(&mut req,&mut results).expect("no fit");
    }
    let mut req = ba.new_request(Some([1,4,1,1]),0,[ConnType::Mesh;4]).expect("bad request");
    req.start_req = true;
    let mut results: Vec<Midplane> = Vec::new();
    assert_eq!(ba.allocate_block(&mut req,&mut results),Err(Error::NoFit));
    assert_clean(&ba);
}

#[test]
fn full_ring_uses_no_passthroughs() {
    init_log();
    let mut ba = Allocator::new([1,4,4,4]);
    let mut req = ba.new_request(Some([1,4,1,1]),0,[ConnType::Torus;4]).expect("bad request");
    req.start_req = true;
    req.deny_pass = DenyPass::DENY_ALL;
    let mut results: Vec<Midplane> = Vec::new();
    let name = ba.allocate_block(&mut req,&mut results).expect("no fit");
    assert_eq!(name,"[0000x0300]");
    assert_eq!(results.len(),4);
    for mp in &results {
        assert!(mp.used.contains(MpUsage::TRUE));
        assert_eq!(mp.axis_switch[1],ENDPOINTS);
    }
    // a ring the full length of its axis never considered a passthrough
    assert!(req.passthroughs.is_empty());
    assert_clean(&ba);
}

#[test]
fn torus_closure_respects_deny() {
    init_log();
    let mut ba = Allocator::new([1,4,4,4]);
    let mut req = ba.new_request(Some([1,2,1,1]),0,[ConnType::Torus;4]).expect("bad request");
    req.start_req = true;
    req.deny_pass = DenyPass::DENY_X;
    let mut results: Vec<Midplane> = Vec::new();
    assert_eq!(ba.allocate_block(&mut req,&mut results),Err(Error::NoFit));
    assert!(req.passthroughs.contains(DenyPass::FOUND_X));
    assert!(results.is_empty());
    assert_clean(&ba);

    // with X allowed the ring closes through two passthrough midplanes
    let mut req2 = ba.new_request(Some([1,2,1,1]),0,[ConnType::Torus;4]).expect("bad request");
    req2.start_req = true;
    req2.deny_pass = DenyPass::DENY_A;
    let name = ba.allocate_block(&mut req2,&mut results).expect("no fit");
    assert_eq!(name,"[0000x0100]");
    assert!(req2.passthroughs.contains(DenyPass::FOUND_X));
    for coord in [[0,2,0,0],[0,3,0,0]] {
        let pass_mp = ba.fabric().mp(coord);
        assert!(pass_mp.used.is_empty());
        assert_eq!(pass_mp.axis_switch[1],SwitchUsage::PASS);
    }
    // passthrough records ride along in the results with no compute role
    let pass_recs: Vec<&Midplane> = results.iter().filter(|m| m.used.is_empty()).collect();
    assert_eq!(pass_recs.len(),2);
    assert_clean(&ba);
}

#[test]
fn torus_spanning_the_whole_fabric() {
    init_log();
    let mut ba = Allocator::new([1,4,4,4]);
    let mut req = ba.new_request(Some([1,4,4,4]),0,[ConnType::Torus;4]).expect("bad request");
    let mut results: Vec<Midplane> = Vec::new();
    let name = ba.allocate_block(&mut req,&mut results).expect("no fit");
    assert_eq!(name,"[0000x0333]");
    assert_eq!(results.len(),64);
    assert!(results.iter().all(|m| m.used.contains(MpUsage::TRUE)));
    // nothing is left for even a single midplane
    let mut req2 = ba.new_request(Some([1,1,1,1]),0,[ConnType::Torus;4]).expect("bad request");
    let mut results2: Vec<Midplane> = Vec::new();
    assert_eq!(ba.allocate_block(&mut req2,&mut results2),Err(Error::NoFit));
    assert_clean(&ba);
}

#[test]
fn single_mp_torus_wraps_its_wires() {
    init_log();
    let mut ba = Allocator::new([1,4,4,4]);
    let mut req = ba.new_request(Some([1,1,1,1]),0,[ConnType::Torus;4]).expect("bad request");
    req.start_req = true;
    let mut results: Vec<Midplane> = Vec::new();
    let name = ba.allocate_block(&mut req,&mut results).expect("no fit");
    assert_eq!(name,"0000");
    assert_eq!(results.len(),1);
    for dim in 0..DIMS {
        assert_eq!(results[0].axis_switch[dim],SwitchUsage::WRAPPED);
    }
    // the wrapped wire blocks any run through this midplane on the axis
    let mut req2 = ba.new_request(Some([1,4,1,1]),0,[ConnType::Torus;4]).expect("bad request");
    req2.start = [0,1,0,0];
    req2.start_req = true;
    let mut results2: Vec<Midplane> = Vec::new();
    assert_eq!(ba.allocate_block(&mut req2,&mut results2),Err(Error::NoFit));
    assert_clean(&ba);
}

#[test]
fn cube_routes_around_a_small_block() {
    init_log();
    let mut ba = Allocator::new([1,4,4,4]);
    let mut req = ba.new_request(Some([1,1,1,1]),0,[ConnType::Small;4]).expect("bad request");
    req.start_req = true;
    let mut small: Vec<Midplane> = Vec::new();
    ba.allocate_block(&mut req,&mut small).expect("no fit");

    // the sweep shifts one step along Z and closes its torus through the
    // wires of the occupied midplane, which carries no switch usage
    let mut req2 = ba.new_request(Some([1,2,2,2]),0,[ConnType::Torus;4]).expect("bad request");
    let mut results: Vec<Midplane> = Vec::new();
    let name = ba.allocate_block(&mut req2,&mut results).expect("no fit");
    assert_eq!(name,"[0001x0112]");
    assert!(ba.fabric().mp([0,0,0,0]).used.contains(MpUsage::TRUE));
    assert_clean(&ba);
}

#[test]
fn fill_detects_interior_conflicts() {
    init_log();
    let mut ba = Allocator::new([1,4,4,4]);
    let mut req = ba.new_request(Some([1,1,1,1]),0,[ConnType::Small;4]).expect("bad request");
    req.start = [0,1,1,1];
    req.start_req = true;
    let mut small: Vec<Midplane> = Vec::new();
    ba.allocate_block(&mut req,&mut small).expect("no fit");

    // the occupied midplane sits on no spine, so the first two sweep
    // positions only fail once the filler reaches the interior
    let mut req2 = ba.new_request(Some([1,2,2,2]),0,[ConnType::Torus;4]).expect("bad request");
    let mut results: Vec<Midplane> = Vec::new();
    let name = ba.allocate_block(&mut req2,&mut results).expect("no fit");
    assert_eq!(name,"[0002x0113]");
    assert_clean(&ba);
}

#[test]
fn size_driven_request_finds_the_cube() {
    init_log();
    let mut ba = Allocator::new([1,4,4,4]);
    let mut req = ba.new_request(None,8,[ConnType::Torus;4]).expect("bad request");
    let mut results: Vec<Midplane> = Vec::new();
    let name = ba.allocate_block(&mut req,&mut results).expect("no fit");
    assert_eq!(name,"[0000x0111]");
    assert_eq!(req.geometry,Some([1,2,2,2]));
    assert_clean(&ba);
}
