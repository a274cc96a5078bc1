// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! The hash tables used throughout the crate.
//!
//! We use `hashbrown`'s tables keyed with `std`'s randomized `SipHasher`, so inputs chosen by a
//! peer (serial ids, outpoints) cannot be used to degrade lookups.

pub use std::collections::hash_map::RandomState;

/// The HashMap type used in this crate.
pub type HashMap<K, V> = hashbrown::HashMap<K, V, RandomState>;
/// The HashSet type used in this crate.
pub type HashSet<K> = hashbrown::HashSet<K, RandomState>;

/// Builds a new [`HashMap`].
pub fn new_hash_map<K, V>() -> HashMap<K, V> {
	HashMap::with_hasher(RandomState::new())
}

/// Builds a new [`HashSet`].
pub fn new_hash_set<K>() -> HashSet<K> {
	HashSet::with_hasher(RandomState::new())
}
