//! Record id generation

use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{const_mutex, Mutex};
use rand::Rng;

/// Last time component handed out in this process (unix micros)
static LAST_MICROS: Mutex<u64> = const_mutex(0);

/// Generate a collision-resistant record id
///
/// Format: decimal unix microseconds (strictly increasing within the process)
/// followed by 24 random bits in hex. Collisions across processes are
/// improbable, not prevented.
pub fn generate_id() -> String {
    let now = unix_micros();
    let micros = {
        let mut last = LAST_MICROS.lock();
        let next = now.max(*last + 1);
        *last = next;
        next
    };
    let entropy: u32 = rand::thread_rng().gen_range(0..(1 << 24));
    format!("{}{:06x}", micros, entropy)
}

/// Current unix time in seconds
pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn unix_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
