//! Snowflake-style globally unique message ID generation.
//!
//! Layout (64 bits): 41-bit millisecond timestamp (custom epoch) | 10-bit
//! worker id | 12-bit per-millisecond sequence. A single generator instance
//! is owned per process and seeded with the worker id the process leased
//! from the KV store at startup.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

/// 2024-01-01T00:00:00Z, arbitrary but fixed so IDs stay time-sortable
/// across process restarts.
const EPOCH_MS: i64 = 1_704_067_200_000;

const WORKER_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const MAX_WORKER_ID: u16 = (1 << WORKER_BITS) - 1;
const MAX_SEQUENCE: u16 = (1 << SEQUENCE_BITS) - 1;

#[derive(Debug, Error)]
pub enum Error {
    #[error("worker id {0} exceeds maximum of {MAX_WORKER_ID}")]
    WorkerIdOutOfRange(u16),
    #[error("system clock moved backwards by {0}ms")]
    ClockMovedBackwards(i64),
}

pub type Result<T> = std::result::Result<T, Error>;

struct State {
    last_ms: i64,
    sequence: u16,
}

/// Generates time-sortable, globally unique 64-bit message IDs.
pub struct SnowflakeGenerator {
    worker_id: u16,
    state: Mutex<State>,
}

impl SnowflakeGenerator {
    pub fn new(worker_id: u16) -> Result<Self> {
        if worker_id > MAX_WORKER_ID {
            return Err(Error::WorkerIdOutOfRange(worker_id));
        }
        Ok(Self {
            worker_id,
            state: Mutex::new(State {
                last_ms: 0,
                sequence: 0,
            }),
        })
    }

    /// Allocate the next ID. Blocks briefly (spin-wait on the clock) if the
    /// per-millisecond sequence space is exhausted.
    pub fn next_id(&self) -> Result<i64> {
        let mut state = self.state.lock().expect("snowflake mutex poisoned");
        let mut now = current_millis();

        if now < state.last_ms {
            let drift = state.last_ms - now;
            return Err(Error::ClockMovedBackwards(drift));
        }

        if now == state.last_ms {
            state.sequence = (state.sequence + 1) & MAX_SEQUENCE;
            if state.sequence == 0 {
                // Sequence exhausted within this millisecond; spin to the next tick.
                while now <= state.last_ms {
                    now = current_millis();
                }
            }
        } else {
            state.sequence = 0;
        }
        state.last_ms = now;

        let ts_part = (now - EPOCH_MS) as i64;
        let id = (ts_part << (WORKER_BITS + SEQUENCE_BITS))
            | ((self.worker_id as i64) << SEQUENCE_BITS)
            | state.sequence as i64;
        Ok(id)
    }
}

fn current_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_strictly_increasing() {
        let gen = SnowflakeGenerator::new(1).unwrap();
        let mut prev = gen.next_id().unwrap();
        for _ in 0..1000 {
            let next = gen.next_id().unwrap();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn distinct_workers_produce_distinct_ids_at_same_instant() {
        let a = SnowflakeGenerator::new(1).unwrap();
        let b = SnowflakeGenerator::new(2).unwrap();
        assert_ne!(a.next_id().unwrap(), b.next_id().unwrap());
    }

    #[test]
    fn rejects_worker_id_out_of_range() {
        assert!(SnowflakeGenerator::new(MAX_WORKER_ID + 1).is_err());
    }
}
