//! Tests for the per-hop routing decision.
//!
//! # Test Strategy
//!
//! 1. **Classification**: every valid target is Local, Child or Parent
//! 2. **Determinism**: the same node and target always agree
//! 3. **Hop sequence**: repeatedly applying the decision walks the tree
//!    from any node to any other node without a topology map

use proptest::prelude::*;
use treebus_core::path::{BusPath, Route};

fn node_path(slots: &[usize]) -> BusPath {
    slots.iter().fold(BusPath::root(), |path, slot| path.child(*slot))
}

fn slots() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(0usize..4, 0..5)
}

/// Follow routing decisions from `from` until the target is local.
///
/// Returns the visited node paths, or `None` if the walk goes nowhere.
fn walk(from: &[usize], target: &str) -> Option<Vec<BusPath>> {
    let mut here: Vec<usize> = from.to_vec();
    let mut visited = vec![node_path(&here)];
    for _ in 0..32 {
        match node_path(&here).route(target).ok()? {
            Route::Local => return Some(visited),
            Route::Child(slot) => here.push(slot),
            Route::Parent => {
                here.pop()?;
            }
        }
        visited.push(node_path(&here));
    }
    None
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_one_hop_up_to_root_object() {
    let hops = walk(&[0], "/Echo").unwrap();
    assert_eq!(hops, vec![node_path(&[0]), BusPath::root()]);
}

#[test]
fn test_sibling_route_goes_through_parent() {
    let hops = walk(&[0], "/1/Echo").unwrap();
    assert_eq!(hops, vec![node_path(&[0]), BusPath::root(), node_path(&[1])]);
}

#[test]
fn test_response_retraces_request() {
    let forward = walk(&[2, 1], "/0/3/Echo").unwrap();
    let mut back = walk(&[0, 3], "/2/1/").unwrap();
    back.reverse();
    assert_eq!(forward, back);
}

#[test]
fn test_root_never_routes_up_for_rooted_targets() {
    let root = BusPath::root();
    for target in ["/Echo", "/0/Echo", "/7/2/Echo", "/"] {
        assert_ne!(root.route(target).unwrap(), Route::Parent);
    }
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_route_is_deterministic(node in slots(), target in slots(), intf in "[A-Z][a-z]{0,6}") {
        let here = node_path(&node);
        let address = node_path(&target).object(&intf);
        prop_assert_eq!(here.route(&address), here.route(&address));
    }

    #[test]
    fn prop_route_classification(node in slots(), target in slots()) {
        let here = node_path(&node);
        let target_path = node_path(&target);
        let route = here.route(target_path.as_str()).unwrap();

        if node == target {
            prop_assert_eq!(route, Route::Local);
        } else if target.starts_with(&node) {
            prop_assert_eq!(route, Route::Child(target[node.len()]));
        } else {
            prop_assert_eq!(route, Route::Parent);
        }
    }

    #[test]
    fn prop_walk_reaches_target_in_tree_distance(from in slots(), to in slots()) {
        let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();
        let distance = (from.len() - common) + (to.len() - common);

        let hops = walk(&from, &node_path(&to).object("Echo")).unwrap();
        prop_assert_eq!(hops.len(), distance + 1);
        prop_assert_eq!(hops.last().unwrap(), &node_path(&to));
    }

    #[test]
    fn prop_paths_without_separator_are_malformed(node in slots(), target in "[A-Za-z0-9.]{1,12}") {
        prop_assert!(node_path(&node).route(&target).is_err());
    }
}
