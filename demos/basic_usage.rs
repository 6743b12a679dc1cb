//! Basic connection usage example
//!
//! This example demonstrates the lifecycle of a connection and its dependents:
//! - Creating and connecting to a database
//! - Querying database facts and attached users
//! - Working with transactions, statements, blobs and events
//! - Tearing everything down with a single disconnect
//!
//! Run with: cargo run --example basic_usage

use rust_fbclient::prelude::*;
use rust_fbclient::ResourceKind;
use std::sync::Arc;

fn main() -> Result<()> {
    println!("=== Rust Firebird Client - Basic Usage Example ===\n");

    // In-memory server model; a real deployment plugs in a native Driver
    let driver = Arc::new(MemoryDriver::new());
    let client = Client::new(driver.clone());
    let db = client.database(
        ConnectionConfig::new("/data/employee.fdb")
            .user("SYSDBA")
            .password("masterkey")
            .charset("UTF8"),
    );

    println!("1. Creating database...");
    db.create(3)?;
    println!("   ✓ Created {}\n", db.config().database);

    println!("2. Connecting to database...");
    db.connect()?;
    println!("   ✓ Connected (dialect {})\n", db.dialect());

    println!("3. Querying database facts...");
    let info = db.info()?;
    println!("   ODS version: {}.{}", info.ods_major, info.ods_minor);
    println!("   Page size:   {}", info.page_size);
    println!("   Users:       {:?}\n", db.users()?);

    println!("4. Opening dependents...");
    let tr = Transaction::new(&db)?;
    tr.start()?;

    let stmt = Statement::new(&db)?;
    stmt.prepare("SELECT EMP_NO FROM EMPLOYEE")?;

    let blob = Blob::new(&db, &tr)?;
    blob.create()?;

    let events = Events::new(&db)?;
    events.add("EMPLOYEE_HIRED")?;
    events.queue()?;
    for kind in [
        ResourceKind::Transaction,
        ResourceKind::Statement,
        ResourceKind::Blob,
        ResourceKind::Events,
    ] {
        println!("   ✓ {}: {}", kind, db.dependent_count(kind));
    }
    println!();

    println!("5. Disconnecting...");
    db.disconnect()?;
    println!("   ✓ Disconnected");
    println!("   Transaction attached: {}", tr.is_attached());
    println!("   Statement attached:   {}", stmt.is_attached());
    println!("   Blob attached:        {}", blob.is_attached());
    println!("   Events attached:      {}", events.is_attached());
    println!(
        "   Server: {} attachments, {} transactions, {} statements, {} blobs\n",
        driver.open_attachments(),
        driver.open_transactions(),
        driver.open_statements(),
        driver.open_blobs()
    );

    println!("6. Releasing the connection...");
    drop(db);
    println!("   ✓ Active connections: {}\n", client.active_connections());

    println!("=== Example completed successfully ===");
    Ok(())
}
