//! Basic breaker usage example

use fuse_machines::{
    Breaker, BreakerBuilder, BreakerRegistry, BreakerStatus, ExecutionCountFuse, FuseConfig,
    OperationId, SlidingWindowCountFuse,
};
use std::time::Duration;

fn main() {
    println!("=== Breaker Basic Example ===\n");

    // Breaker that trips after three calls
    let fuse = ExecutionCountFuse::new(3).expect("valid limit");
    let breaker = Breaker::builder("payment_api", fuse)
        .on_status_changed(|b| match b.status() {
            BreakerStatus::On => println!("🟢 Breaker '{}' is on", b.name()),
            BreakerStatus::TrippedOff => println!("🔴 Breaker '{}' tripped off!", b.name()),
            BreakerStatus::Off => println!("⚪ Breaker '{}' switched off", b.name()),
        })
        .build();

    println!("Initial status: {:?}\n", breaker.status());

    println!("--- Calls until the fuse trips ---");
    for i in 1..=4 {
        match breaker.call(&[], move || Ok::<_, String>(format!("Payment {}", i))) {
            Ok(result) => println!("✓ {}", result),
            Err(e) => println!("✗ {}", e),
        }
    }
    println!("Status: {:?}\n", breaker.status());

    println!("--- Turning the breaker back on ---");
    breaker.on();
    match breaker.execute(&[]) {
        Ok(()) => println!("✓ Call admitted"),
        Err(e) => println!("✗ {}", e),
    }
    println!();

    println!("--- Manual off ---");
    breaker.off();
    if let Err(e) = breaker.execute(&[]) {
        println!("✗ {} (manual: {})", e, e.is_manual());
    }
    breaker.on();
    println!();

    // Sliding window: at most 2 calls per second
    println!("--- Sliding window ---");
    let window = SlidingWindowCountFuse::new(3, Duration::from_secs(1)).expect("valid window");
    let limited = Breaker::new("search_api", window);
    for i in 1..=3 {
        match limited.execute(&[]) {
            Ok(()) => println!("✓ Search {}", i),
            Err(e) => println!("✗ Search {}: {}", i, e),
        }
    }
    println!();

    // Registry guarding an operation by name
    println!("--- Registry ---");
    let registry = BreakerRegistry::new();
    let submit = OperationId::new("OrderService::submit");
    let guarded = BreakerBuilder::with_config("orders", &FuseConfig::ExecutionCount { limit: 2 })
        .expect("valid config")
        .build();
    registry
        .register(&guarded, None, submit.clone())
        .expect("first registration");

    for i in 1..=3 {
        let result = registry.call(None, &submit, &[], || Ok::<_, String>(i));
        match result {
            Ok(order) => println!("✓ Order {} submitted", order),
            Err(e) => println!("✗ {}", e),
        }
    }

    guarded.dispose();
    limited.dispose();
    breaker.dispose();
}
