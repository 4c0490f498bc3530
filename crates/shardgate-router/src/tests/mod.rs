//! Tests for the shardgate-router crate.

mod helpers;
