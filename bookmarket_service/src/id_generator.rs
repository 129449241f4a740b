use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

/// 2022-04-18T00:00:00Z in milliseconds
pub const CUSTOM_EPOCH_MS: u64 = 1_650_240_000_000;
pub const DEFAULT_INSTANCE_ID: u16 = 3802;

const INSTANCE_BITS: u32 = 12;
const SEQUENCE_BITS: u32 = 10;
const MAX_INSTANCE_ID: u16 = (1 << INSTANCE_BITS) - 1;
const MAX_SEQUENCE: u64 = (1 << SEQUENCE_BITS) - 1;

#[derive(Default)]
struct GeneratorState {
    last_timestamp: u64,
    sequence: u64,
}

/// Produces time ordered, snowflake style ids:
/// 42 bits of milliseconds since [`CUSTOM_EPOCH_MS`], 12 bits of instance id, 10 bits of sequence.
pub struct IdGenerator {
    instance_id: u64,
    state: Mutex<GeneratorState>,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_INSTANCE_ID)
    }
}

impl IdGenerator {
    pub fn new(instance_id: u16) -> Self {
        Self {
            instance_id: (instance_id & MAX_INSTANCE_ID) as u64,
            state: Default::default(),
        }
    }

    pub fn generate(&self) -> String {
        let mut state = self.state.lock();
        let mut timestamp = current_millis().max(state.last_timestamp);

        if timestamp == state.last_timestamp {
            state.sequence = (state.sequence + 1) & MAX_SEQUENCE;
            if state.sequence == 0 {
                // Sequence exhausted for this millisecond, borrow the next one
                timestamp += 1;
            }
        } else {
            state.sequence = 0;
        }
        state.last_timestamp = timestamp;

        let id = (timestamp << (INSTANCE_BITS + SEQUENCE_BITS))
            | (self.instance_id << SEQUENCE_BITS)
            | state.sequence;
        id.to_string()
    }
}

fn current_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
        .saturating_sub(CUSTOM_EPOCH_MS)
}
