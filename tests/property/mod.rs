//! Property-based tests

mod id_map_proptest;
