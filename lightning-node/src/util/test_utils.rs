// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Test helpers shared by unit tests and downstream crates built with `_test_utils`.

use std::sync::Mutex;

use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};

use crate::ln::types::ChannelId;
use crate::prelude::*;
use crate::sign::EntropySource;
use crate::util::logger::{Level, Logger, Record};

pub fn privkey(i: u8) -> SecretKey {
	SecretKey::from_slice(&[i; 32]).unwrap()
}

pub fn pubkey(i: u8) -> PublicKey {
	PublicKey::from_secret_key(&Secp256k1::new(), &privkey(i))
}

pub struct TestLogger {
	level: Level,
	id: String,
	pub lines: Mutex<HashMap<(String, String), usize>>,
	pub context: Mutex<HashMap<(String, Option<PublicKey>, Option<ChannelId>), usize>>,
}

impl TestLogger {
	pub fn new() -> TestLogger {
		Self::with_id("".to_owned())
	}
	pub fn with_id(id: String) -> TestLogger {
		TestLogger {
			level: Level::Trace,
			id,
			lines: Mutex::new(new_hash_map()),
			context: Mutex::new(new_hash_map()),
		}
	}
	pub fn enable(&mut self, level: Level) {
		self.level = level;
	}
	pub fn assert_log(&self, module: &str, line: String, count: usize) {
		let log_entries = self.lines.lock().unwrap();
		assert_eq!(log_entries.get(&(module.to_string(), line)), Some(&count));
	}

	/// Search for the number of occurrence of the logged lines which
	/// 1. belongs to the specified module and
	/// 2. contains `line` in it.
	/// And asserts if the number of occurrences is the same with the given `count`
	pub fn assert_log_contains(&self, module: &str, line: &str, count: usize) {
		let log_entries = self.lines.lock().unwrap();
		let l: usize = log_entries
			.iter()
			.filter(|&(&(ref m, ref l), _c)| *m == module && l.contains(line))
			.map(|(_, c)| c)
			.sum();
		assert_eq!(l, count)
	}

	/// Search for the number of occurrences of logged lines which
	/// 1. belong to the specified module and
	/// 2. carry the given peer id and channel id.
	/// Assert that the number of occurrences equals the given `count`
	pub fn assert_log_context_contains(
		&self, module: &str, peer_id: Option<PublicKey>, channel_id: Option<ChannelId>,
		count: usize,
	) {
		let context_entries = self.context.lock().unwrap();
		let l = context_entries.get(&(module.to_string(), peer_id, channel_id)).unwrap();
		assert_eq!(*l, count)
	}
}

impl Logger for TestLogger {
	fn log(&self, record: Record) {
		let context =
			format!("{} {} [{}:{}]", self.id, record.level, record.module_path, record.line);
		let s = format!("{:<55} {}", context, record.args);
		*self
			.lines
			.lock()
			.unwrap()
			.entry((record.module_path.to_string(), format!("{}", record.args)))
			.or_insert(0) += 1;
		*self
			.context
			.lock()
			.unwrap()
			.entry((record.module_path.to_string(), record.peer_id, record.channel_id))
			.or_insert(0) += 1;
		if record.level >= self.level {
			println!("{}", s);
		}
	}
}

/// Returns the same bytes on every call, unless overridden.
pub struct TestEntropySource {
	pub override_random_bytes: Mutex<Option<[u8; 32]>>,
	fallback: [u8; 32],
}

impl TestEntropySource {
	pub fn new(fallback: [u8; 32]) -> Self {
		Self { override_random_bytes: Mutex::new(None), fallback }
	}
}

impl EntropySource for TestEntropySource {
	fn get_secure_random_bytes(&self) -> [u8; 32] {
		match *self.override_random_bytes.lock().unwrap() {
			Some(bytes) => bytes,
			None => self.fallback,
		}
	}
}
