//! Exclusive pointer ownership and hand-off tests.

mod common;

use common::{Tracked, drop_counter, drops};
use memslot_ptr::{EXCLUSIVE_IMAGE_LEN, ExclusivePtr, copy_from_slot, copy_to_slot};

#[test]
fn create_empty() {
    let ptr = ExclusivePtr::<i32>::default();
    assert!(ptr.get().is_none());
    assert!(!ptr.is_some());
}

#[test]
fn create_with_value() {
    let ptr = ExclusivePtr::new(5);
    assert_eq!(*ptr, 5);
}

#[test]
fn move_leaves_source_empty() {
    let mut first = ExclusivePtr::new(10);
    let second = first.take();
    assert_eq!(*second, 10);
    assert!(first.get().is_none());
}

#[test]
fn move_assign_destroys_previous_payload() {
    let counter = drop_counter();
    let mut dest = ExclusivePtr::new(Tracked::new(1, &counter));
    let mut source = ExclusivePtr::new(Tracked::new(2, &counter));
    assert_eq!(dest.value, 1);

    dest = source.take();
    assert_eq!(drops(&counter), 1);
    assert_eq!(dest.value, 2);
    assert!(source.is_null());

    drop(dest);
    drop(source);
    assert_eq!(drops(&counter), 2);
}

/// Scenario: release hands the payload to the caller without destroying it.
#[test]
fn release_transfers_ownership_to_caller() {
    let counter = drop_counter();
    let mut ptr = ExclusivePtr::new(Tracked::new(20, &counter));

    let raw = ptr.release().expect("payload");
    assert_eq!(raw.value, 20);
    assert!(ptr.get().is_none());
    assert_eq!(drops(&counter), 0);

    // Caller-side deallocation; the pointer must not free it again.
    drop(raw);
    drop(ptr);
    assert_eq!(drops(&counter), 1);
}

#[test]
fn reset_destroys_old_payload() {
    let counter = drop_counter();
    let mut ptr = ExclusivePtr::new(Tracked::new(30, &counter));

    ptr.reset(Some(Box::new(Tracked::new(40, &counter))));
    assert_eq!(drops(&counter), 1);
    assert_eq!(ptr.value, 40);
}

#[test]
fn bool_conversion() {
    let empty = ExclusivePtr::<i32>::null();
    assert!(!empty.is_some());

    let full = ExclusivePtr::new(50);
    assert!(full.is_some());
}

#[test]
fn send_empties_sender() {
    let counter = drop_counter();
    let mut ptr = ExclusivePtr::new(Tracked::new(60, &counter));
    let mut buffer = [0u8; EXCLUSIVE_IMAGE_LEN];

    assert!(ptr.send(&mut buffer[..], copy_to_slot));
    assert!(ptr.get().is_none());
    assert_eq!(drops(&counter), 0);

    // The buffer owns the payload; discarding it is the only cleanup.
    let image = buffer;
    unsafe { ExclusivePtr::<Tracked>::discard_image(&image) };
    assert_eq!(drops(&counter), 1);
}

#[test]
fn send_then_receive_moves_payload() {
    let counter = drop_counter();
    let mut sender = ExclusivePtr::new(Tracked::new(70, &counter));
    let mut buffer = [0u8; EXCLUSIVE_IMAGE_LEN];

    assert!(sender.send(&mut buffer[..], copy_to_slot));
    assert!(sender.is_null());

    let mut receiver: ExclusivePtr<Tracked> = ExclusivePtr::null();
    assert!(unsafe { receiver.receive(&buffer[..], copy_from_slot) });
    assert_eq!(receiver.value, 70);
    assert!(sender.is_null());

    drop(sender);
    drop(receiver);
    assert_eq!(drops(&counter), 1);
}

#[test]
fn receive_replaces_existing_payload() {
    let counter = drop_counter();
    let mut sender = ExclusivePtr::new(Tracked::new(1, &counter));
    let mut receiver = ExclusivePtr::new(Tracked::new(2, &counter));
    let mut buffer = [0u8; 32];

    assert!(sender.send(&mut buffer[..], copy_to_slot));
    assert!(unsafe { receiver.receive(&buffer[..], copy_from_slot) });

    // Receiver's own payload was destroyed, the received one is alive.
    assert_eq!(drops(&counter), 1);
    assert_eq!(receiver.value, 1);
}

#[test]
fn failed_transfer_changes_nothing() {
    let counter = drop_counter();
    let mut ptr = ExclusivePtr::new(Tracked::new(80, &counter));

    assert!(!ptr.send((), |_, _| false));
    assert_eq!(ptr.value, 80);

    assert!(!unsafe { ptr.receive((), |_, _| false) });
    assert_eq!(ptr.value, 80);
    assert_eq!(drops(&counter), 0);
}

#[test]
fn send_passes_current_image() {
    let mut ptr = ExclusivePtr::new(String::from("image"));
    let expected = ptr.image();

    let mut seen = Vec::new();
    assert!(ptr.send(&mut seen, |out: &mut Vec<u8>, image| {
        out.extend_from_slice(image);
        true
    }));
    assert_eq!(seen, expected);

    let restored = unsafe { ExclusivePtr::<String>::from_image(&expected) };
    assert_eq!(restored.as_str(), "image");
}

#[test]
fn make_with_string() {
    let ptr = ExclusivePtr::new(String::from("This is a heap string"));
    assert_eq!(ptr.len(), 21);
}
