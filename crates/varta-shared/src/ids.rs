//! Identifier allocation. None of these are globally unique; collisions are
//! improbable, and consumers deduplicate where it matters.

use rand::Rng;

use crate::constants::{GROUP_PREFIX, MESSAGE_PREFIX, USER_PREFIX};

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// `len` random lowercase base-36 characters.
pub fn random_base36(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect()
}

/// Stable user id, e.g. `uid_k3j9x0a1b`.
pub fn new_user_id() -> String {
    format!("{USER_PREFIX}{}", random_base36(9))
}

/// Group room id, e.g. `group_5mz1q8c0d2`.
pub fn new_group_id() -> String {
    format!("{GROUP_PREFIX}{}", random_base36(10))
}

/// Message id: sender clock plus a short random tail.
pub fn new_message_id(timestamp_ms: i64) -> String {
    format!("{MESSAGE_PREFIX}{timestamp_ms}_{}", random_base36(4))
}

/// Current wall clock in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
