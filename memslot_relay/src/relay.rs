//! Slot-queue relay.
//!
//! Each producer/consumer pair owns one `heapless::spsc::Queue` of
//! `[u8; SLOT_SIZE]` slots. Pointers cross the queue only as byte images:
//!
//! ```text
//!  producer thread            queue (SLOT_CAPACITY slots)          consumer thread
//! ┌────────────────┐ send  ┌───┬───┬───┬─────┬───┐ receive ┌────────────────┐
//! │ ExclusivePtr / ├──────►│ i │ i │ i │ ... │   ├────────►│ ExclusivePtr / │
//! │ SharedPtr      │       └───┴───┴───┴─────┴───┘         │ SharedPtr      │
//! └────────────────┘                                       └────────────────┘
//! ```
//!
//! A full queue is a failed transport: `send` returns `false`, nothing
//! changes, and the producer retries. Images still queued when a run stops
//! early are discarded, so every payload and owner slot is accounted for.

use crate::config::RelayConfig;
use crate::error::{RelayError, RelayResult};
use heapless::spsc::Queue;
use memslot::consts::{SLOT_CAPACITY, SLOT_SIZE};
use memslot_ptr::{
    EXCLUSIVE_IMAGE_LEN, ExclusiveImage, ExclusivePtr, SHARED_IMAGE_LEN, SharedImage, SharedPtr,
    copy_from_slot, copy_to_slot,
};
use serde::Serialize;
use static_assertions::const_assert;
use std::hint::spin_loop;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const_assert!(SLOT_SIZE >= EXCLUSIVE_IMAGE_LEN);
const_assert!(SLOT_SIZE >= SHARED_IMAGE_LEN);

/// One queue slot.
pub type Slot = [u8; SLOT_SIZE];

/// Longest a worker waits without progress before giving up.
pub const STALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Failed attempts between yields while waiting on a queue.
const SPINS_PER_YIELD: u32 = 256;

/// Payload moved through the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Position in the producer's sequence.
    pub seq: u32,
    /// Heap-allocated body, derived from `seq`.
    pub body: String,
}

impl Message {
    /// Message number `seq`.
    pub fn new(seq: u32) -> Self {
        Self {
            seq,
            body: Self::body_for(seq),
        }
    }

    /// Body every message `seq` must carry.
    pub fn body_for(seq: u32) -> String {
        format!("memslot message #{seq}")
    }

    /// Body still matches the sequence number.
    pub fn is_intact(&self) -> bool {
        self.body == Self::body_for(self.seq)
    }
}

/// Outcome of one mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModeStats {
    /// Producer/consumer pairs.
    pub consumers: u8,
    /// Messages received and validated across all consumers.
    pub messages_moved: u64,
    /// Images drained and discarded after the run.
    pub discarded: usize,
    /// Wall time for the mode.
    pub elapsed_us: u64,
}

/// Outcome of a relay run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayReport {
    /// Service name from the config.
    pub service_name: String,
    /// Exclusive mode stats, if it ran.
    pub exclusive: Option<ModeStats>,
    /// Shared mode stats, if it ran.
    pub shared: Option<ModeStats>,
}

/// Run every mode the config selects.
pub fn run(config: &RelayConfig) -> RelayResult<RelayReport> {
    let settings = &config.relay;
    info!(
        service = %config.shared.service_name,
        mode = ?settings.mode,
        messages = settings.messages,
        consumers = settings.consumers,
        "Relay starting"
    );

    let exclusive = if settings.mode.runs_exclusive() {
        Some(run_exclusive(settings.messages, settings.consumers)?)
    } else {
        None
    };
    let shared = if settings.mode.runs_shared() {
        Some(run_shared(settings.messages, settings.consumers)?)
    } else {
        None
    };

    Ok(RelayReport {
        service_name: config.shared.service_name.clone(),
        exclusive,
        shared,
    })
}

/// Each pair moves `messages` freshly allocated `ExclusivePtr<Message>`.
///
/// Consumers check that messages arrive in order and intact.
pub fn run_exclusive(messages: u32, consumers: u8) -> RelayResult<ModeStats> {
    let started = Instant::now();

    let (moved, discarded) = run_pairs(
        consumers,
        |push| {
            for seq in 0..messages {
                let mut ptr = ExclusivePtr::new(Message::new(seq));
                wait_for_slot(|| ptr.send(&mut *push, |push, image| push(image)))?;
            }
            Ok(())
        },
        |pull, finished| {
            let mut ptr: ExclusivePtr<Message> = ExclusivePtr::null();
            for expected in 0..messages {
                wait_for_image(finished, messages, expected, || {
                    // SAFETY: this pair's queue only carries images written
                    // by its producer's successful sends, each dequeued once.
                    unsafe { ptr.receive(&mut *pull, |staging, pull| pull(staging)) }
                })?;

                match ptr.get() {
                    Some(message) if message.seq == expected && message.is_intact() => {}
                    other => {
                        return Err(RelayError::PayloadMismatch {
                            expected,
                            actual: other.map(|message| message.seq),
                        });
                    }
                }
            }
            Ok(messages)
        },
        discard_exclusive,
    )?;

    let stats = mode_stats(consumers, moved, discarded, started);
    info!(
        messages = stats.messages_moved,
        elapsed_us = stats.elapsed_us,
        "Exclusive relay finished"
    );
    Ok(stats)
}

/// Each pair moves `messages` images of one `SharedPtr<Message>`.
///
/// Consumers check that every adopted pointer is the original payload; after
/// the run the original must be the only owner left.
pub fn run_shared(messages: u32, consumers: u8) -> RelayResult<ModeStats> {
    let started = Instant::now();
    let origin = SharedPtr::<Message>::new(Message::new(0));

    let (moved, discarded) = run_pairs(
        consumers,
        |push| {
            for _ in 0..messages {
                wait_for_slot(|| origin.send(&mut *push, |push, image| push(image)))?;
            }
            Ok(())
        },
        |pull, finished| {
            let mut adopted: SharedPtr<Message> = SharedPtr::null();
            for received in 0..messages {
                wait_for_image(finished, messages, received, || {
                    // SAFETY: this pair's queue only carries images written
                    // by its producer's successful sends, each dequeued once.
                    unsafe { adopted.receive(&mut *pull, |staging, pull| pull(staging)) }
                })?;

                let intact = adopted.get().is_some_and(Message::is_intact);
                if !intact || !adopted.ptr_eq(&origin) {
                    return Err(RelayError::PayloadMismatch {
                        expected: 0,
                        actual: adopted.get().map(|message| message.seq),
                    });
                }
            }
            Ok(messages)
        },
        discard_shared,
    )?;

    let owners = origin.get_count();
    if owners != 1 {
        return Err(RelayError::CountMismatch {
            expected: 1,
            actual: owners,
        });
    }

    let stats = mode_stats(consumers, moved, discarded, started);
    info!(
        messages = stats.messages_moved,
        elapsed_us = stats.elapsed_us,
        "Shared relay finished"
    );
    Ok(stats)
}

/// Spawn `consumers` producer/consumer pairs, one queue each, and wait for
/// all of them. Leftover images are handed to `discard` before returning.
///
/// Returns messages received across all pairs and images discarded.
fn run_pairs<P, C>(
    consumers: u8,
    produce: P,
    consume: C,
    discard: fn(&Slot),
) -> RelayResult<(u64, usize)>
where
    P: Fn(&mut dyn FnMut(&[u8]) -> bool) -> RelayResult<()> + Sync,
    C: Fn(&mut dyn FnMut(&mut [u8]) -> bool, &AtomicBool) -> RelayResult<u32> + Sync,
{
    let flags: Vec<AtomicBool> = (0..consumers).map(|_| AtomicBool::new(false)).collect();
    let mut queues: Vec<Queue<Slot, SLOT_CAPACITY>> =
        (0..consumers).map(|_| Queue::new()).collect();

    let outcome = thread::scope(|s| {
        let produce = &produce;
        let consume = &consume;
        let mut workers = Vec::with_capacity(queues.len());

        for (queue, finished) in queues.iter_mut().zip(&flags) {
            let (mut tx, mut rx) = queue.split();

            let producer = s.spawn(move || {
                let _finished = FinishOnDrop(finished);
                let mut push = |image: &[u8]| {
                    let mut slot = [0u8; SLOT_SIZE];
                    copy_to_slot(&mut slot, image) && tx.enqueue(slot).is_ok()
                };
                produce(&mut push)
            });

            let consumer = s.spawn(move || {
                let mut pull = |staging: &mut [u8]| {
                    rx.dequeue()
                        .is_some_and(|slot| copy_from_slot(staging, &slot))
                };
                consume(&mut pull, finished)
            });

            workers.push((producer, consumer));
        }

        let mut moved = 0u64;
        let mut first_error = None;
        for (pair, (producer, consumer)) in workers.into_iter().enumerate() {
            let sent = producer
                .join()
                .unwrap_or(Err(RelayError::WorkerPanicked("producer")));
            let received = consumer
                .join()
                .unwrap_or(Err(RelayError::WorkerPanicked("consumer")));

            match pair_outcome(sent, received) {
                Ok(count) => {
                    debug!(pair, received = count, "Pair finished");
                    moved += u64::from(count);
                }
                Err(e) => {
                    warn!(pair, error = %e, "Pair failed");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(moved),
        }
    });

    let mut discarded = 0;
    for queue in queues.iter_mut() {
        while let Some(slot) = queue.dequeue() {
            discard(&slot);
            discarded += 1;
        }
    }
    if discarded > 0 {
        warn!(discarded, "Discarded images left in queues");
    }

    outcome.map(|moved| (moved, discarded))
}

/// Pick the error that explains a failed pair.
///
/// A consumer that saw its producer vanish reports `Disconnected`; the
/// producer's own error is the cause then.
fn pair_outcome(sent: RelayResult<()>, received: RelayResult<u32>) -> RelayResult<u32> {
    match (sent, received) {
        (Ok(()), received) => received,
        (Err(e), Ok(_)) => Err(e),
        (Err(e), Err(RelayError::Disconnected { .. })) => Err(e),
        (Err(_), Err(e)) => Err(e),
    }
}

/// Retry `send` until the queue accepts the image.
fn wait_for_slot(mut send: impl FnMut() -> bool) -> RelayResult<()> {
    let mut backoff = Backoff::new();
    while !send() {
        if !backoff.snooze() {
            return Err(RelayError::SlotsFull {
                capacity: SLOT_CAPACITY,
                waited_ms: backoff.waited().as_millis(),
            });
        }
    }
    Ok(())
}

/// Retry `receive` until an image arrives or the producer is gone.
fn wait_for_image(
    finished: &AtomicBool,
    expected: u32,
    received: u32,
    mut receive: impl FnMut() -> bool,
) -> RelayResult<()> {
    let mut backoff = Backoff::new();
    loop {
        if receive() {
            return Ok(());
        }
        if finished.load(Ordering::Acquire) {
            // The last enqueue happens before the flag is set.
            if receive() {
                return Ok(());
            }
            return Err(RelayError::Disconnected { expected, received });
        }
        if !backoff.snooze() {
            return Err(RelayError::Disconnected { expected, received });
        }
    }
}

fn discard_exclusive(slot: &Slot) {
    let mut image: ExclusiveImage = [0; EXCLUSIVE_IMAGE_LEN];
    if copy_from_slot(&mut image, slot) {
        // SAFETY: written by a successful send in this run, never received.
        unsafe { ExclusivePtr::<Message>::discard_image(&image) };
    }
}

fn discard_shared(slot: &Slot) {
    let mut image: SharedImage = [0; SHARED_IMAGE_LEN];
    if copy_from_slot(&mut image, slot) {
        // SAFETY: written by a successful send in this run, never received.
        unsafe { SharedPtr::<Message>::discard_image(&image) };
    }
}

fn mode_stats(consumers: u8, moved: u64, discarded: usize, started: Instant) -> ModeStats {
    ModeStats {
        consumers,
        messages_moved: moved,
        discarded,
        elapsed_us: u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX),
    }
}

/// Marks a producer finished however its thread ends.
struct FinishOnDrop<'a>(&'a AtomicBool);

impl Drop for FinishOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Spin, then yield, until [`STALL_TIMEOUT`] has passed.
struct Backoff {
    started: Instant,
    failures: u32,
}

impl Backoff {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            failures: 0,
        }
    }

    fn waited(&self) -> Duration {
        self.started.elapsed()
    }

    /// Wait a little; `false` once the stall timeout is exceeded.
    fn snooze(&mut self) -> bool {
        self.failures = self.failures.wrapping_add(1);
        if self.failures % SPINS_PER_YIELD == 0 {
            thread::yield_now();
        } else {
            spin_loop();
        }
        self.waited() < STALL_TIMEOUT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_body_follows_seq() {
        let message = Message::new(12);
        assert!(message.is_intact());
        assert_eq!(message.body, "memslot message #12");

        let forged = Message {
            seq: 13,
            body: Message::body_for(12),
        };
        assert!(!forged.is_intact());
    }

    #[test]
    fn producer_error_explains_disconnect() {
        let sent = Err(RelayError::SlotsFull {
            capacity: SLOT_CAPACITY,
            waited_ms: 5000,
        });
        let received = Err(RelayError::Disconnected {
            expected: 10,
            received: 3,
        });
        assert!(matches!(
            pair_outcome(sent, received),
            Err(RelayError::SlotsFull { .. })
        ));
    }

    #[test]
    fn consumer_error_wins_over_stalled_producer() {
        let sent = Err(RelayError::SlotsFull {
            capacity: SLOT_CAPACITY,
            waited_ms: 5000,
        });
        let received = Err(RelayError::PayloadMismatch {
            expected: 4,
            actual: Some(5),
        });
        assert!(matches!(
            pair_outcome(sent, received),
            Err(RelayError::PayloadMismatch { expected: 4, .. })
        ));
    }

    #[test]
    fn finished_producer_with_empty_queue_disconnects() {
        let finished = AtomicBool::new(true);
        let result = wait_for_image(&finished, 5, 2, || false);
        assert!(matches!(
            result,
            Err(RelayError::Disconnected {
                expected: 5,
                received: 2
            })
        ));
    }

    #[test]
    fn late_image_after_finish_is_received() {
        let finished = AtomicBool::new(true);
        let mut calls = 0;
        let result = wait_for_image(&finished, 1, 0, || {
            calls += 1;
            calls == 2
        });
        assert!(result.is_ok());
    }

    #[test]
    fn leftover_images_are_discarded() {
        let origin = SharedPtr::<Message>::new(Message::new(0));
        let mut slot: Slot = [0; SLOT_SIZE];
        assert!(origin.send(&mut slot[..], copy_to_slot));
        assert_eq!(origin.get_count(), 2);

        discard_shared(&slot);
        assert_eq!(origin.get_count(), 1);

        let mut ptr = ExclusivePtr::new(Message::new(1));
        assert!(ptr.send(&mut slot[..], copy_to_slot));
        discard_exclusive(&slot);
    }

    #[test]
    fn single_pair_moves_everything() {
        let stats = run_exclusive(200, 1).unwrap();
        assert_eq!(stats.messages_moved, 200);
        assert_eq!(stats.discarded, 0);

        let stats = run_shared(200, 1).unwrap();
        assert_eq!(stats.messages_moved, 200);
        assert_eq!(stats.discarded, 0);
    }
}
