use ordered_trees::{comparator, AvlTree, BTree, Error, Guarded, RedBlackTree};
use proptest::prelude::*;
use serde_json::json;

#[macro_use]
mod common;
use common::*;

#[test]
fn marshal_is_ascending() {
    let t = BTree::new(3, comparator::natural());
    t.sets([(10, "j"), (2, "b"), (7, "g"), (1, "a")]);
    assert_eq!(t.marshal_json().unwrap(), br#"{"1":"a","2":"b","7":"g","10":"j"}"#);

    let t = AvlTree::new(comparator::reverse());
    t.sets([(1, 1), (2, 2)]);
    assert_eq!(t.marshal_json().unwrap(), br#"{"2":2,"1":1}"#);
}

#[test]
fn empty_tree_is_null() {
    let avl = AvlTree::<i32, i32>::new(comparator::natural());
    let rb = RedBlackTree::<i32, i32, Guarded>::new_safe(comparator::natural());
    let bt = BTree::<i32, i32>::new(4, comparator::natural());
    assert_eq_all!(
        avl.marshal_json().unwrap(),
        rb.marshal_json().unwrap(),
        bt.marshal_json().unwrap(),
        b"null".to_vec()
    );
}

#[test]
fn unmarshal_converts_keys() {
    let t = RedBlackTree::<u32, String>::new(comparator::natural());
    t.set(5, "kept".to_string());
    t.unmarshal_json(br#"{"2":"b","1":"a","5":"e"}"#).unwrap();
    assert_eq!(
        t.entries(),
        vec![(1, "a".to_string()), (2, "b".to_string()), (5, "e".to_string())]
    );

    t.unmarshal_json(b"null").unwrap();
    assert_eq!(t.len(), 3);
}

#[test]
fn failed_unmarshal_changes_nothing() {
    let t = BTree::<u32, u32, Guarded>::new_safe(3, comparator::natural());
    t.sets([(1, 1), (2, 2)]);

    let bad_docs: [&[u8]; 4] = [br#"{"3":3,"x":4}"#, br#"{"3":"three"}"#, b"[1,2]", b"{"];
    for bad in bad_docs {
        match t.unmarshal_json(bad) {
            Err(Error::Json(_)) => {}
            other => panic!("{:?} accepted: {other:?}", String::from_utf8_lossy(bad)),
        }
        assert_eq!(t.entries(), vec![(1, 1), (2, 2)]);
    }
}

#[test]
fn deserialize_uses_the_natural_order() {
    let t: AvlTree<String, i32> = serde_json::from_str(r#"{"b":2,"c":3,"a":1}"#).unwrap();
    assert_eq!(t.keys(), vec!["a", "b", "c"]);
    t.check().unwrap();

    let t: RedBlackTree<i64, bool> = serde_json::from_value(json!(null)).unwrap();
    assert!(t.is_empty());
}

#[test]
fn map_str_any_renders_keys() {
    let t = BTree::new(5, comparator::natural());
    t.sets([(3, vec![1, 2]), (1, vec![])]);
    let m = t.map_str_any().unwrap();
    assert_eq!(serde_json::Value::Object(m), json!({"1": [], "3": [1, 2]}));
}

#[test]
fn serialize_nests() {
    let t = RedBlackTree::new(comparator::natural());
    t.sets([("x", 1), ("y", 2)]);
    let doc = json!({ "tree": t, "n": 1 });
    assert_eq!(doc["tree"]["y"], 2);
}

fn check_round_trip(v: U16Pairs) {
    let trees = Trees::from_pairs(v);
    let expected = serde_json::to_vec(&trees.avl).unwrap();

    assert_eq_all!(
        expected,
        trees.rb.marshal_json().unwrap(),
        trees.bt3.marshal_json().unwrap(),
        trees.bt7.marshal_json().unwrap()
    );

    let back = AvlTree::new(comparator::natural());
    back.unmarshal_json(&expected).unwrap();
    assert_eq!(back.entries(), trees.avl.entries());

    let back = BTree::new(4, comparator::natural());
    back.unmarshal_json(&expected).unwrap();
    assert_eq!(back.entries(), trees.avl.entries());
    back.check().unwrap();
}

proptest! {
    #[test]
    fn test_round_trip(v in small_int_pairs()) {
        check_round_trip(v);
    }
}
