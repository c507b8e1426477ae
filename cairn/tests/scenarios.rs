//! End-to-end scenarios exercising the public, buffer-round-tripping
//! surface of the crate: `to_bytes`/`from_bytes` over the framing
//! envelope, the derive macro, and the non-trivial containers (swiss
//! table, R-tree) together rather than in isolation.

use std::rc::Rc;

use cairn::de::Deserializer;
use cairn::fingerprint::fingerprint;
use cairn::framing::Mode;
use cairn::traits::Deserialize;
use cairn::{from_bytes, to_bytes};

#[derive(cairn::Archive, Debug, Clone, PartialEq)]
struct GraphNode {
    id: u32,
    next: Option<u32>,
}

#[derive(cairn::Archive, Debug, Clone, PartialEq)]
enum Shape {
    Point,
    Circle { radius: f64 },
    Rectangle { width: f64, height: f64 },
}

#[test]
fn enum_derive_round_trips_every_variant() {
    let shapes = vec![
        Shape::Point,
        Shape::Circle { radius: 2.5 },
        Shape::Rectangle {
            width: 3.0,
            height: 4.0,
        },
    ];

    let fp = fingerprint::<Vec<Shape>>();
    let bytes = to_bytes(&shapes, Mode::WITH_VERSION, fp).unwrap();
    let archived = from_bytes::<Vec<Shape>>(bytes.as_slice(), Mode::WITH_VERSION, fp).unwrap();
    let restored = archived.deserialize(&mut Deserializer).unwrap();

    assert_eq!(restored, shapes);
}

/// An arena of nodes representing a cycle through integer indices
/// rather than a true cyclic pointer, the pattern the specification
/// recommends for an ownership-strict language: node 2 points back to
/// node 0.
#[test]
fn arena_graph_round_trips_a_cycle() {
    let arena = vec![
        GraphNode {
            id: 0,
            next: Some(1),
        },
        GraphNode {
            id: 1,
            next: Some(2),
        },
        GraphNode {
            id: 2,
            next: Some(0),
        },
    ];

    let fp = fingerprint::<Vec<GraphNode>>();
    let bytes = to_bytes(&arena, Mode::WITH_VERSION, fp).unwrap();
    let archived = from_bytes::<Vec<GraphNode>>(bytes.as_slice(), Mode::WITH_VERSION, fp).unwrap();
    let restored = archived.deserialize(&mut Deserializer).unwrap();

    assert_eq!(restored, arena);
    // Walking the cycle twice around must land back where it started.
    let mut idx = 0usize;
    for _ in 0..6 {
        idx = restored[idx].next.unwrap() as usize;
    }
    assert_eq!(idx, 0);
}

#[test]
fn small_strings_round_trip_at_boundary_lengths() {
    let strings: Vec<String> = [0usize, 1, 14, 15, 16, 64]
        .iter()
        .map(|&len| core::iter::repeat('x').take(len).collect())
        .collect();

    let fp = fingerprint::<Vec<String>>();
    let mode = Mode::WITH_VERSION | Mode::WITH_INTEGRITY;
    let bytes = to_bytes(&strings, mode, fp).unwrap();
    let archived = from_bytes::<Vec<String>>(bytes.as_slice(), mode, fp).unwrap();
    let restored = archived.deserialize(&mut Deserializer).unwrap();

    assert_eq!(restored, strings);
}

#[test]
fn nested_hash_map_round_trips_with_string_keys() {
    let mut map: hashbrown::HashMap<String, Vec<u32>> = hashbrown::HashMap::new();
    map.insert("alpha".to_string(), vec![1, 2, 3]);
    map.insert("a string longer than fifteen bytes".to_string(), vec![]);
    map.insert(String::new(), vec![42]);

    let fp = fingerprint::<hashbrown::HashMap<String, Vec<u32>>>();
    let bytes = to_bytes(&map, Mode::WITH_VERSION, fp).unwrap();
    let archived = from_bytes::<hashbrown::HashMap<String, Vec<u32>>>(
        bytes.as_slice(),
        Mode::WITH_VERSION,
        fp,
    )
    .unwrap();
    let restored = archived.deserialize(&mut Deserializer).unwrap();

    assert_eq!(restored, map);

    // Also confirm iteration works directly off the archived buffer,
    // without going through a full deserialize.
    let entries: hashbrown::HashMap<String, Vec<u32>> = unsafe { archived.iter() }
        .map(|(k, v)| {
            let key = unsafe { k.as_str_unchecked() }.to_string();
            let value = unsafe { v.as_slice() }.to_vec();
            (key, value)
        })
        .collect();
    assert_eq!(entries, map);
}

/// The authoritative R-tree invariance scenario: insert a large batch of
/// random rectangles each paired with a distinct payload, verify every
/// one is found by its own bounding box, delete every other one, verify
/// the deleted ones are gone and the rest remain, then reinsert them and
/// confirm the node array never grows past the high-water mark it
/// reached before the deletion cycle (freelist reuse).
#[test]
fn rtree_invariance_under_insert_delete_reinsert() {
    const N: usize = 10_000;
    let mut rng = SplitMix64::new(0xC0FF_EE15_BAD5_EED);

    let rects: Vec<cairn::containers::Rect<2>> = (0..N)
        .map(|_| {
            let x0 = rng.next_f64() * 1000.0;
            let y0 = rng.next_f64() * 1000.0;
            let x1 = x0 + rng.next_f64() * 5.0;
            let y1 = y0 + rng.next_f64() * 5.0;
            cairn::containers::Rect {
                min: [x0, y0],
                max: [x1, y1],
            }
        })
        .collect();

    let mut tree: cairn::containers::RTree<u32, 2, 8> = cairn::containers::RTree::new();
    for (i, rect) in rects.iter().enumerate() {
        tree.insert(*rect, i as u32);
    }
    assert_eq!(tree.len(), N);
    for (i, rect) in rects.iter().enumerate() {
        let hits = tree.search(rect);
        assert!(hits.contains(&&(i as u32)), "item {i} not found after insert");
    }

    let nodes_before = tree.node_len();
    let world = cairn::containers::Rect {
        min: [-1.0, -1.0],
        max: [1001.0, 1001.0],
    };
    let removed = tree.remove_where(&world, |payload| payload % 2 == 0);
    assert_eq!(removed.len(), N / 2);
    assert_eq!(tree.len(), N / 2);

    for (i, rect) in rects.iter().enumerate() {
        let hits = tree.search(rect);
        if i % 2 == 0 {
            assert!(!hits.contains(&&(i as u32)), "item {i} still found after delete");
        } else {
            assert!(hits.contains(&&(i as u32)), "item {i} missing after deleting its sibling");
        }
    }

    for i in removed {
        tree.insert(rects[i as usize], i);
    }
    assert_eq!(tree.len(), N);
    assert!(
        tree.node_len() <= nodes_before,
        "node array grew past its prior high-water mark: {} > {}",
        tree.node_len(),
        nodes_before
    );
    for (i, rect) in rects.iter().enumerate() {
        let hits = tree.search(rect);
        assert!(hits.contains(&&(i as u32)), "item {i} missing after reinsert");
    }
}

#[test]
fn big_endian_header_round_trips_payload_unaffected() {
    let values = vec![1u32, 2, 3, 0xDEAD_BEEF];
    let fp = fingerprint::<Vec<u32>>();
    let mode = Mode::WITH_VERSION | Mode::SERIALIZE_BIG_ENDIAN;

    let bytes = to_bytes(&values, mode, fp).unwrap();
    // The fingerprint recorded in the header is stored big-endian; the
    // payload itself (the `u32` elements) keeps whatever byte order the
    // crate's compile-time endian feature selects, so only the header's
    // bytes are reversed relative to a little-endian-mode buffer.
    let le_bytes = to_bytes(&values, Mode::WITH_VERSION, fp).unwrap();
    assert_ne!(bytes.as_slice()[0..8], le_bytes.as_slice()[0..8]);
    assert_eq!(bytes.as_slice()[8..], le_bytes.as_slice()[8..]);

    let archived = from_bytes::<Vec<u32>>(bytes.as_slice(), mode, fp).unwrap();
    let restored = archived.deserialize(&mut Deserializer).unwrap();
    assert_eq!(restored, values);
}

#[test]
fn unchecked_mode_skips_header_and_bounds_check() {
    let values = vec![10u8, 20, 30];
    let bytes = to_bytes(&values, Mode::UNCHECKED, 0).unwrap();
    let archived = from_bytes::<Vec<u8>>(bytes.as_slice(), Mode::UNCHECKED, 0).unwrap();
    let restored = archived.deserialize(&mut Deserializer).unwrap();
    assert_eq!(restored, values);
}

#[derive(cairn::Archive, Debug)]
struct SharedPair {
    first: Rc<u64>,
    second: Rc<u64>,
    unrelated: Rc<u64>,
}

/// Two fields sharing one `Rc` pointee must serialize to a single
/// on-disk copy, verify without double-walking it, and still round-trip
/// to equal (if no longer aliased) values.
#[test]
fn shared_rc_pointee_collapses_to_one_copy_and_verifies() {
    let shared = Rc::new(42u64);
    let pair = SharedPair {
        first: shared.clone(),
        second: shared.clone(),
        unrelated: Rc::new(7u64),
    };

    let fp = fingerprint::<SharedPair>();
    let bytes = to_bytes(&pair, Mode::WITH_VERSION, fp).unwrap();
    let archived = from_bytes::<SharedPair>(bytes.as_slice(), Mode::WITH_VERSION, fp).unwrap();

    assert_eq!(unsafe { archived.first.as_ref() }.value(), 42u64);
    assert_eq!(unsafe { archived.second.as_ref() }.value(), 42u64);
    assert_eq!(unsafe { archived.unrelated.as_ref() }.value(), 7u64);

    // `first` and `second` must have collapsed to the same pointee:
    // the references they hand back are to the exact same bytes.
    let first_ptr: *const _ = unsafe { archived.first.as_ref() };
    let second_ptr: *const _ = unsafe { archived.second.as_ref() };
    let unrelated_ptr: *const _ = unsafe { archived.unrelated.as_ref() };
    assert_eq!(first_ptr, second_ptr);
    assert_ne!(first_ptr, unrelated_ptr);
}

#[test]
fn mismatched_fingerprint_is_rejected() {
    let values = vec![1u32, 2, 3];
    let fp = fingerprint::<Vec<u32>>();
    let bytes = to_bytes(&values, Mode::WITH_VERSION, fp).unwrap();
    let err = from_bytes::<Vec<u32>>(bytes.as_slice(), Mode::WITH_VERSION, fp.wrapping_add(1));
    assert!(err.is_err());
}

/// A splitmix64 generator, used instead of an external `rand` crate so
/// this test's randomness is deterministic without adding a dependency
/// the rest of the crate has no other use for.
struct SplitMix64 {
    state: u64,
}

impl SplitMix64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }
}
