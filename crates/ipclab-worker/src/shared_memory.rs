//! Turn-passing conversations over a [`SharedBuffer`].
//!
//! In counter mode worker 0 first writes the seed value, then both workers
//! alternate, starting with [`WorkerId::Zero`], each incrementing a
//! little-endian `i64` stored in the buffer. In message
//! mode worker 0 writes once and raises the completion flag; worker 1 waits
//! for the flag and reads once.

use ipclab_event::{EventEmitter, Outcome};
use ipclab_transport::{SharedBuffer, TransportError, WorkerId};
use tracing::debug;

use crate::cancel::Cancellation;
use crate::config::ShmConfig;
use crate::error::failure_step;

/// Encode a counter value for the buffer.
pub fn encode_counter(value: i64) -> [u8; 8] {
    value.to_le_bytes()
}

/// Decode a counter value. An empty or short buffer reads as zero-extended.
pub fn decode_counter(bytes: &[u8]) -> i64 {
    let mut raw = [0u8; 8];
    let len = bytes.len().min(8);
    raw[..len].copy_from_slice(&bytes[..len]);
    i64::from_le_bytes(raw)
}

/// Minimal byte width of a value, reported as `size_bytes`.
pub fn counter_width(value: i64) -> u64 {
    let bits = u64::BITS - value.unsigned_abs().leading_zeros();
    u64::from(bits / 8 + 1)
}

/// Place the starting counter value in the buffer.
pub fn seed_counter(buffer: &SharedBuffer, seed: i64) -> Result<(), TransportError> {
    buffer.lock()?.write(&encode_counter(seed))
}

/// One side of the counter exchange. Runs `config.rounds` turns.
///
/// Worker 0 seeds the buffer with `config.seed` before its first turn and
/// reports it as `first_write`. It holds the turn from the start, so worker 1
/// never reads an unseeded buffer.
pub fn run_counter_worker(
    id: WorkerId,
    buffer: &SharedBuffer,
    config: &ShmConfig,
    emitter: EventEmitter,
    cancel: &Cancellation,
) -> Outcome {
    emitter.status("init", format!("Worker {id} attached to shared memory."));
    match exchange_counter(id, buffer, config, &emitter, cancel) {
        Ok(last) => emitter.complete("finish", format!("Finished all rounds; last value {last}.")),
        Err(err) => {
            let step = failure_step(&err);
            emitter.fail(step, format!("Shared memory exchange aborted: {err}."))
        }
    }
}

fn exchange_counter(
    id: WorkerId,
    buffer: &SharedBuffer,
    config: &ShmConfig,
    emitter: &EventEmitter,
    cancel: &Cancellation,
) -> Result<i64, TransportError> {
    let mut last = config.seed;
    if id == WorkerId::Zero {
        seed_counter(buffer, config.seed)?;
        emitter.log_data(
            "first_write",
            "Wrote the starting value to shared memory.",
            config.seed.to_string(),
            Some(counter_width(config.seed)),
        );
    }
    for round in 1..=config.rounds {
        buffer.wait_for_turn(id, &config.wait, || cancel.is_requested())?;
        emitter.log("its_my_turn", format!("Round {round}: it is my turn."));

        let mut guard = buffer.lock()?;
        let value = decode_counter(guard.read());
        emitter.log_data(
            "data_read",
            "Read value from shared memory.",
            value.to_string(),
            Some(counter_width(value)),
        );

        let next = value + 1;
        guard.write(&encode_counter(next))?;
        emitter.log_data(
            "data_written",
            "Wrote new value to shared memory.",
            next.to_string(),
            Some(counter_width(next)),
        );

        let to = id.other();
        emitter.log("pass_turn", format!("Passing the turn to worker {to}."));
        guard.pass_turn(to);
        last = next;
    }
    Ok(last)
}

/// Worker 0 of message mode: write `message` once and signal completion.
///
/// Completion is signalled even when the message does not fit, so the
/// reader never waits forever on a failed writer.
pub fn run_writer(
    buffer: &SharedBuffer,
    message: &str,
    config: &ShmConfig,
    emitter: EventEmitter,
    cancel: &Cancellation,
) -> Outcome {
    emitter.status("init", "Writer attached to shared memory.");
    if let Err(err) = buffer.wait_for_turn(WorkerId::Zero, &config.wait, || cancel.is_requested()) {
        let step = failure_step(&err);
        return emitter.fail(step, format!("Writer gave up waiting: {err}."));
    }

    let mut guard = match buffer.lock() {
        Ok(guard) => guard,
        Err(err) => {
            let step = failure_step(&err);
            return emitter.fail(step, format!("Could not acquire the lock: {err}."));
        }
    };
    match guard.write(message.as_bytes()) {
        Ok(()) => {
            emitter.log_data(
                "data_written",
                "Wrote message to shared memory.",
                message,
                Some(message.len() as u64),
            );
            guard.signal_complete();
            emitter.complete("finish", "Message written; completion signalled.")
        }
        Err(err) => {
            guard.signal_complete();
            debug!(size = message.len(), "message rejected by shared buffer");
            let step = failure_step(&err);
            emitter.fail(step, format!("Message not written: {err}."))
        }
    }
}

/// Worker 1 of message mode: wait for completion and read once.
pub fn run_reader(
    buffer: &SharedBuffer,
    config: &ShmConfig,
    emitter: EventEmitter,
    cancel: &Cancellation,
) -> Outcome {
    emitter.status("init", "Reader waiting for the writer.");
    if let Err(err) = buffer.wait_for_completion(&config.wait, || cancel.is_requested()) {
        let step = failure_step(&err);
        return emitter.fail(step, format!("Reader gave up waiting: {err}."));
    }
    emitter.log("completion_received", "Writer signalled completion.");

    let data = match buffer.lock() {
        Ok(guard) => guard.read().to_vec(),
        Err(err) => {
            let step = failure_step(&err);
            return emitter.fail(step, format!("Could not acquire the lock: {err}."));
        }
    };
    if data.is_empty() {
        emitter.log_data("data_read", "Shared memory is empty.", "", Some(0));
        return emitter.complete("finish", "Nothing to read; reader done.");
    }
    emitter.log_data(
        "data_read",
        "Read message from shared memory.",
        String::from_utf8_lossy(&data),
        Some(data.len() as u64),
    );
    emitter.complete("finish", "Message read; reader done.")
}
