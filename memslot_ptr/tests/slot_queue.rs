//! Hand-off through a fixed-slot SPSC queue between threads.
//!
//! The queue stands in for an RTOS message queue: it stores `[u8; N]` slots
//! and knows nothing about the pointers inside them.

mod common;

use common::{Tracked, drop_counter, drops};
use heapless::spsc::Queue;
use memslot_ptr::{
    EXCLUSIVE_IMAGE_LEN, ExclusivePtr, PlainCounter, SHARED_IMAGE_LEN, SharedPtr, copy_from_slot,
    copy_to_slot,
};
use static_assertions::{assert_impl_all, assert_not_impl_any};
use std::hint::spin_loop;
use std::rc::Rc;
use std::thread;

// Adopting an image off the sender's thread is sound exactly when the pointer
// type could have been moved there itself.
assert_impl_all!(ExclusivePtr<Tracked>: Send);
assert_impl_all!(SharedPtr<Tracked>: Send, Sync);
assert_not_impl_any!(ExclusivePtr<Rc<u8>>: Send);
assert_not_impl_any!(SharedPtr<u8, PlainCounter>: Send, Sync);

const SLOT: usize = 16;
const DEPTH: usize = 8;
const MESSAGES: u32 = 2_000;

type Slot = [u8; SLOT];

#[test]
fn slot_fits_both_images() {
    assert!(SLOT >= EXCLUSIVE_IMAGE_LEN);
    assert!(SLOT >= SHARED_IMAGE_LEN);
}

#[test]
fn exclusive_pointers_cross_threads() {
    let counter = drop_counter();
    let mut queue: Queue<Slot, DEPTH> = Queue::new();
    let (mut producer, mut consumer) = queue.split();

    thread::scope(|s| {
        let tracker = &counter;
        s.spawn(move || {
            for seq in 0..MESSAGES {
                let mut ptr = ExclusivePtr::new(Tracked::new(seq, tracker));
                while !ptr.send(&mut producer, |producer, image| {
                    let mut slot = [0u8; SLOT];
                    copy_to_slot(&mut slot, image) && producer.enqueue(slot).is_ok()
                }) {
                    spin_loop();
                }
                assert!(ptr.is_null());
            }
        });

        s.spawn(move || {
            let mut ptr: ExclusivePtr<Tracked> = ExclusivePtr::null();
            for expected in 0..MESSAGES {
                loop {
                    let received = unsafe {
                        ptr.receive(&mut consumer, |staging, consumer| {
                            consumer
                                .dequeue()
                                .is_some_and(|slot| copy_from_slot(staging, &slot))
                        })
                    };
                    if received {
                        break;
                    }
                    spin_loop();
                }
                assert_eq!(ptr.value, expected);
            }
        });
    });

    assert_eq!(drops(&counter), MESSAGES as usize);
}

#[test]
fn shared_images_cross_threads() {
    let counter = drop_counter();
    let origin = SharedPtr::<Tracked>::new(Tracked::new(70, &counter));
    let mut queue: Queue<Slot, DEPTH> = Queue::new();
    let (mut producer, mut consumer) = queue.split();

    thread::scope(|s| {
        let origin = &origin;
        s.spawn(move || {
            for _ in 0..MESSAGES {
                while !origin.send(&mut producer, |producer, image| {
                    let mut slot = [0u8; SLOT];
                    copy_to_slot(&mut slot, image) && producer.enqueue(slot).is_ok()
                }) {
                    spin_loop();
                }
            }
        });

        s.spawn(move || {
            let mut adopted: SharedPtr<Tracked> = SharedPtr::null();
            for _ in 0..MESSAGES {
                loop {
                    let received = unsafe {
                        adopted.receive(&mut consumer, |staging, consumer| {
                            consumer
                                .dequeue()
                                .is_some_and(|slot| copy_from_slot(staging, &slot))
                        })
                    };
                    if received {
                        break;
                    }
                    spin_loop();
                }
                assert_eq!(adopted.value, 70);
                assert!(adopted.get_count() >= 2);
            }
        });
    });

    assert_eq!(origin.get_count(), 1);
    assert_eq!(drops(&counter), 0);
    drop(origin);
    assert_eq!(drops(&counter), 1);
}

#[test]
fn concurrent_release_frees_once() {
    const THREADS: usize = 8;

    for _ in 0..50 {
        let counter = drop_counter();
        let origin = SharedPtr::<Tracked>::new(Tracked::new(1, &counter));
        let clones: Vec<_> = (0..THREADS).map(|_| origin.clone()).collect();
        drop(origin);

        thread::scope(|s| {
            for ptr in clones {
                s.spawn(move || {
                    assert_eq!(ptr.value, 1);
                    let again = ptr.clone();
                    drop(ptr);
                    drop(again);
                });
            }
        });

        assert_eq!(drops(&counter), 1);
    }
}

#[test]
fn full_queue_is_a_failed_send() {
    let mut queue: Queue<Slot, DEPTH> = Queue::new();
    let capacity = queue.capacity();
    let origin = SharedPtr::<u32>::new(5);

    let mut accepted = 0;
    while origin.send(&mut queue, |queue, image| {
        let mut slot = [0u8; SLOT];
        copy_to_slot(&mut slot, image) && queue.enqueue(slot).is_ok()
    }) {
        accepted += 1;
    }
    assert_eq!(accepted, capacity);
    assert_eq!(origin.get_count(), capacity + 1);

    // Drain without receiving anywhere: every image must be discarded.
    while let Some(slot) = queue.dequeue() {
        let mut image = [0u8; SHARED_IMAGE_LEN];
        assert!(copy_from_slot(&mut image, &slot));
        unsafe { SharedPtr::<u32>::discard_image(&image) };
    }
    assert_eq!(origin.get_count(), 1);
}

/// Images written on this thread are adopted by a spawned one. `Tracked` is
/// `Send + Sync` and the default counter is atomic.
#[test]
fn images_adopted_on_spawned_thread() {
    let counter = drop_counter();
    let mut exclusive = ExclusivePtr::new(Tracked::new(1, &counter));
    let shared = SharedPtr::<Tracked>::new(Tracked::new(2, &counter));

    let mut exclusive_image = [0u8; EXCLUSIVE_IMAGE_LEN];
    let mut shared_image = [0u8; SHARED_IMAGE_LEN];
    assert!(exclusive.send(&mut exclusive_image[..], copy_to_slot));
    assert!(shared.send(&mut shared_image[..], copy_to_slot));
    assert!(exclusive.is_null());
    assert_eq!(shared.get_count(), 2);

    let values = thread::spawn(move || {
        let mut mine: ExclusivePtr<Tracked> = ExclusivePtr::null();
        let mut ours: SharedPtr<Tracked> = SharedPtr::null();
        // SAFETY: each image was sent once above; both pointer types are
        // `Send` for this payload and counter.
        unsafe {
            assert!(mine.receive(&exclusive_image[..], copy_from_slot));
            assert!(ours.receive(&shared_image[..], copy_from_slot));
        }
        (mine.value, ours.value)
    })
    .join()
    .unwrap();

    assert_eq!(values, (1, 2));
    assert_eq!(drops(&counter), 1);
    assert_eq!(shared.get_count(), 1);
    drop(shared);
    assert_eq!(drops(&counter), 2);
}
