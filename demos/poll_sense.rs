//! Roroshetta Sense polling example
//!
//! Demonstrates the acquisition loop:
//! - Scanning for the device by name (or address)
//! - Polling on a fixed interval with the background scheduler
//! - Printing each reading as it arrives
//!
//! Run with: cargo run --example poll_sense
//!
//! To poll a specific device:
//!   cargo run --example poll_sense -- --address C4:DE:E2:11:22:33
//!
//! Press Ctrl+C to stop.

use sense_rust_ble::{
    celsius_to_fahrenheit, AcquisitionCoordinator, AcquisitionEvent, BleScanner,
    BtleplugTransport, CoordinatorConfig, DeviceIdentity, Error, MemoryEntryStore, PollScheduler,
    Result, SENSE_DEVICE_NAME,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("warn,sense_rust_ble=debug")
        .init();

    println!("Roroshetta Sense Monitor");
    println!("========================\n");

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let target_address = args
        .iter()
        .position(|arg| arg == "--address")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.to_uppercase());

    let scanner = Arc::new(BleScanner::new().await?);
    scanner.start_scanning().await?;

    println!("Scanning for {}...\n", SENSE_DEVICE_NAME);

    // Wait for the device to advertise
    tokio::time::sleep(Duration::from_secs(5)).await;

    let identity = match target_address {
        Some(address) => DeviceIdentity::new(address, SENSE_DEVICE_NAME),
        None => scanner
            .find_by_name(SENSE_DEVICE_NAME)
            .ok_or_else(|| Error::DeviceUnavailable {
                address: SENSE_DEVICE_NAME.to_string(),
            })?,
    };

    println!("Polling {}\n", identity);

    let coordinator = Arc::new(AcquisitionCoordinator::new(
        identity,
        scanner.clone(),
        Arc::new(BtleplugTransport::new()),
        Arc::new(MemoryEntryStore::new()),
        CoordinatorConfig::default(),
    )?);

    let _events = coordinator.on_event(|event| match event {
        AcquisitionEvent::ReadingUpdated(reading) => {
            println!("{}", reading);
            if let Some(celsius) = reading.temperature {
                println!(
                    "  Temperature: {:.1}°C / {:.1}°F",
                    celsius,
                    celsius_to_fahrenheit(celsius)
                );
            }
        }
        AcquisitionEvent::NotificationTimeout => println!("No data this cycle"),
        AcquisitionEvent::CycleFailed { reason } => println!("Poll failed: {}", reason),
        AcquisitionEvent::Paired => println!("Device paired"),
        _ => {}
    });

    let scheduler = PollScheduler::new();
    scheduler.start(coordinator.clone(), Duration::from_secs(10));

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| Error::Internal(e.to_string()))?;

    println!("\nStopping...");
    scheduler.stop().await;
    scanner.stop_scanning().await?;

    if let Some(updated) = coordinator.last_update() {
        println!("Last reading at {}: {}", updated, coordinator.reading());
    }

    Ok(())
}
