//! Demonstrates cross-ring payload tracking and per-thread views.
//!
//! Run with: cargo run --example shared_payloads

use memring_rs::{Factory, RingConfig};
use std::sync::Arc;
use std::thread;

fn main() {
    let factory = Factory::new(RingConfig::default());

    // One payload, referenced from two rings. The factory keeps the copy
    // sets symmetric, so both items report two references.
    let payload = Arc::new(42i64);
    let primary = factory.create(payload.clone(), 1, "answer").unwrap();
    let secondary = factory.create(payload.clone(), 2, "backup").unwrap();
    println!(
        "refcount after two rings: {}",
        factory.ref_count(&payload)
    );

    // Removing one reference leaves the payload reachable via the other.
    primary.erase(&payload);
    println!(
        "refcount after erasing from {:?}: {}",
        primary.name(),
        factory.ref_count(&payload)
    );
    assert!(secondary.is_in(&payload));

    // Per-thread views insert concurrently; the ring stays consistent.
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let ring = primary.clone();
            thread::spawn(move || {
                let view = ring.view();
                for i in 0..250 {
                    view.add_value(i64::from(t * 1000 + i), 0, "").unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    println!("items inserted concurrently: {}", primary.len());

    // Sort through a view; any thread could interrupt via the interrupter.
    let view = primary.view();
    view.sort(true).unwrap();
    println!(
        "first item after sort: {}",
        primary.get(0).map(|v| *v).unwrap()
    );
}
