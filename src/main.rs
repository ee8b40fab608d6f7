use env_logger::Builder;
use log::{info, LevelFilter};
use std::path::PathBuf;

use simpledb_rust::{BlockId, SimpleDB};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    Builder::new().filter_level(LevelFilter::Info).init();

    info!("SimpleDB transaction engine in Rust");

    // Database directory from the command line, or a scratch one
    let (db_path, scratch) = match std::env::args().nth(1) {
        Some(path) => (PathBuf::from(path), false),
        None => (std::env::temp_dir().join("simpledb-demo"), true),
    };

    let db = SimpleDB::new(&db_path)?;
    let block = BlockId::new("demo.tbl", 1);

    let mut tx1 = db.new_tx()?;
    tx1.pin(&block)?;
    tx1.set_int(&block, 80, 1, false)?;
    tx1.set_string(&block, 40, "one", false)?;
    tx1.commit()?;
    info!("Transaction {} committed", tx1.txnum());

    let mut tx2 = db.new_tx()?;
    tx2.pin(&block)?;
    let int_value = tx2.get_int(&block, 80)?;
    let string_value = tx2.get_string(&block, 40)?;
    info!("Initial value at location 80 = {}", int_value);
    info!("Initial value at location 40 = {}", string_value);
    tx2.set_int(&block, 80, int_value + 1, true)?;
    tx2.set_string(&block, 40, &format!("{}!", string_value), true)?;
    tx2.commit()?;
    info!("Transaction {} committed", tx2.txnum());

    let mut tx3 = db.new_tx()?;
    tx3.pin(&block)?;
    tx3.set_int(&block, 80, 9999, true)?;
    info!("Pre-rollback value at location 80 = {}", tx3.get_int(&block, 80)?);
    tx3.rollback()?;
    info!("Transaction {} rolled back", tx3.txnum());

    let mut tx4 = db.new_tx()?;
    tx4.pin(&block)?;
    info!("Post-rollback value at location 80 = {}", tx4.get_int(&block, 80)?);
    tx4.commit()?;

    drop(db);
    // Clean up the scratch database
    if scratch && db_path.exists() {
        std::fs::remove_dir_all(&db_path)?;
    }

    Ok(())
}
