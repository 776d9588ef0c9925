// tests of single-MP (small) blocks and request validation
use fabkit::ba::Allocator;
use fabkit::fabric::Midplane;
use fabkit::fabric::types::{ConnType,DenyPass,Error,MpUsage,DIMS};

fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn small_block_occupies_one_mp() {
    init_log();
    let mut ba = Allocator::new([1,4,4,4]);
    let mut req = ba.new_request(Some([1,1,1,1]),0,[ConnType::Small;4]).expect("bad request");
    let mut results: Vec<Midplane> = Vec::new();
    let name = ba.allocate_block(&mut req,&mut results).expect("no fit");
    assert_eq!(name,"0000");
    assert_eq!(req.save_name,Some("0000".to_string()));
    assert_eq!(results.len(),1);
    assert!(results[0].used.contains(MpUsage::TRUE));
    for dim in 0..DIMS {
        assert!(results[0].axis_switch[dim].is_empty());
    }
    // no wires were consumed on the fabric either
    let mp = ba.fabric().mp([0,0,0,0]);
    assert!(mp.used.contains(MpUsage::TRUE));
    for dim in 0..DIMS {
        assert!(mp.axis_switch[dim].is_empty());
    }
    // the sweep walks past the used midplane for the next small block
    let mut req2 = ba.new_request(Some([1,1,1,1]),0,[ConnType::Small;4]).expect("bad request");
    let mut results2: Vec<Midplane> = Vec::new();
    assert_eq!(ba.allocate_block(&mut req2,&mut results2).expect("no fit"),"0001");
}

#[test]
fn small_block_on_used_start_fails() {
    init_log();
    let mut ba = Allocator::new([1,4,4,4]);
    let mut req = ba.new_request(Some([1,1,1,1]),0,[ConnType::Small;4]).expect("bad request");
    req.start_req = true;
    let mut results: Vec<Midplane> = Vec::new();
    ba.allocate_block(&mut req,&mut results).expect("no fit");
    let mut req2 = ba.new_request(Some([1,1,1,1]),0,[ConnType::Small;4]).expect("bad request");
    req2.start_req = true;
    let mut results2: Vec<Midplane> = Vec::new();
    assert_eq!(ba.allocate_block(&mut req2,&mut results2),Err(Error::NoFit));
    assert!(results2.is_empty());
}

#[test]
fn request_validation() {
    init_log();
    let ba = Allocator::new([1,4,4,4]);
    assert_eq!(ba.new_request(None,0,[ConnType::Torus;4]).unwrap_err(),Error::EmptyRequest);
    assert_eq!(ba.new_request(Some([0,1,1,1]),0,[ConnType::Torus;4]).unwrap_err(),Error::BadGeometry);
    assert_eq!(ba.new_request(Some([1,5,1,1]),0,[ConnType::Torus;4]).unwrap_err(),Error::BadGeometry);
    assert_eq!(ba.new_request(None,7,[ConnType::Torus;4]).unwrap_err(),Error::NoGeometry);
    let req = ba.new_request(None,9,[ConnType::Torus;4]).expect("bad request");
    assert_eq!(req.size,9);
    assert_eq!(req.geo_table[0],[1,1,3,3]);
    let req = ba.new_request(Some([1,2,2,2]),1,[ConnType::Torus;4]).expect("bad request");
    // size is recomputed from the geometry
    assert_eq!(req.size,8);
}

#[test]
fn default_deny_policy_is_inherited() {
    init_log();
    let mut ba = Allocator::new([1,4,4,4]);
    ba.set_deny_policy(DenyPass::DENY_X);
    let req = ba.new_request(Some([1,2,1,1]),0,[ConnType::Torus;4]).expect("bad request");
    assert!(req.deny_pass.contains(DenyPass::DENY_X));
}

#[test]
fn whitelist_masks_the_rest() {
    init_log();
    let mut ba = Allocator::new([1,4,4,4]);
    ba.set_all_except("[0000x0111]").expect("bad hostlist");
    assert!(ba.fabric().mp([0,3,3,3]).used.contains(MpUsage::TEMP));
    assert!(ba.fabric().mp([0,0,1,1]).used.is_empty());
    let mut req = ba.new_request(Some([1,1,1,1]),0,[ConnType::Small;4]).expect("bad request");
    req.start = [0,3,3,3];
    req.start_req = true;
    let mut results: Vec<Midplane> = Vec::new();
    assert_eq!(ba.allocate_block(&mut req,&mut results),Err(Error::NoFit));
    // lifting the reservations frees the midplane again
    ba.clear_all_temp();
    assert_eq!(ba.allocate_block(&mut req,&mut results).expect("no fit"),"0333");
    assert_eq!(ba.set_all_except("nonsense"),Err(Error::BadHostlist));
    assert_eq!(ba.set_all_except("[0000x0555]"),Err(Error::OutOfBounds));
}
