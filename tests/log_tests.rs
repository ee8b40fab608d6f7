mod common;

use std::sync::Arc;

use common::{create_log_record, read_block, BLOCK_SIZE, LOG_FILE};
use simpledb_rust::{storage::Page, BlockId, FileManager, LogManager, Lsn, Result};
use tempfile::TempDir;

fn setup() -> (Arc<FileManager>, LogManager) {
    common::init_logging();
    let file_manager = Arc::new(FileManager::in_memory(BLOCK_SIZE));
    let log_manager = LogManager::new(Arc::clone(&file_manager), LOG_FILE).unwrap();
    (file_manager, log_manager)
}

fn append_records(log_manager: &LogManager, start: i32, end: i32) {
    for i in start..=end {
        let record = create_log_record(&format!("record{}", i), i + 100);
        log_manager.append(&record).unwrap();
    }
}

#[test]
fn test_log_manager_basic() -> Result<()> {
    let (_file_manager, log_manager) = setup();

    // No records just after creation
    assert_eq!(log_manager.iterator()?.count(), 0);

    append_records(&log_manager, 1, 35);
    assert_eq!(log_manager.latest_lsn(), Lsn(35));
    assert!(log_manager.last_saved_lsn() < Lsn(35)); // not flushed yet
    log_manager.flush(Lsn(35))?;
    assert_eq!(log_manager.last_saved_lsn(), Lsn(35));

    append_records(&log_manager, 36, 70);
    let records = log_manager.iterator()?.collect::<Result<Vec<_>>>()?;
    assert_eq!(records.len(), 70);

    // Newest first
    for (record, expected) in records.iter().zip((1..=70).rev()) {
        let page = Page::from_bytes(record.clone());
        let s = page.get_string(0)?;
        assert_eq!(s, format!("record{}", expected));
        assert_eq!(page.get_int(Page::max_length(s.len()))?, expected + 100);
    }
    Ok(())
}

#[test]
fn test_append_packs_records_from_block_end() -> Result<()> {
    let (file_manager, log_manager) = setup();

    let lsn = log_manager.append(b"aaaaa")?;
    assert_eq!(lsn, Lsn(1));
    log_manager.flush(lsn)?;

    let page = read_block(&file_manager, &log_manager.current_block());
    let boundary = page.get_int(0)? as usize;
    assert_eq!(boundary, BLOCK_SIZE - 5 - 4);
    assert_eq!(page.get_bytes(boundary)?, b"aaaaa");
    Ok(())
}

#[test]
fn test_append_moves_to_new_block_when_full() -> Result<()> {
    let (file_manager, log_manager) = setup();

    // Initial block is almost full
    log_manager.append(&[b'a'; 390])?;
    assert_eq!(log_manager.current_block(), BlockId::new(LOG_FILE, 0));

    // New record must go to a new block
    let lsn = log_manager.append(&[b'b'; 10])?;
    assert_eq!(lsn, Lsn(2));
    assert_eq!(log_manager.current_block(), BlockId::new(LOG_FILE, 1));

    // The full block reached disk when it was retired
    assert_eq!(log_manager.last_saved_lsn(), Lsn(1));
    let first = read_block(&file_manager, &BlockId::new(LOG_FILE, 0));
    assert_eq!(first.get_bytes(first.get_int(0)? as usize)?, &[b'a'; 390][..]);
    Ok(())
}

#[test]
fn test_oversized_record_rejected() {
    let (_file_manager, log_manager) = setup();
    assert!(log_manager.append(&vec![0u8; BLOCK_SIZE - 7]).is_err());
    assert!(log_manager.append(&vec![0u8; BLOCK_SIZE - 8]).is_ok());
}

#[test]
fn test_flush_is_idempotent() -> Result<()> {
    let (file_manager, log_manager) = setup();

    let lsn = log_manager.append(b"testrecord")?;
    log_manager.flush(lsn)?;
    let written = file_manager.stats().blocks_written;
    let on_disk = read_block(&file_manager, &log_manager.current_block());

    log_manager.flush(lsn)?;
    log_manager.flush(Lsn(0))?;
    assert_eq!(file_manager.stats().blocks_written, written);
    assert_eq!(read_block(&file_manager, &log_manager.current_block()), on_disk);
    Ok(())
}

#[test]
fn test_lsns_strictly_increase() -> Result<()> {
    let (_file_manager, log_manager) = setup();
    let lsns = (0..50)
        .map(|i| log_manager.append(&create_log_record("x", i)))
        .collect::<Result<Vec<_>>>()?;
    assert!(lsns.windows(2).all(|pair| pair[0] < pair[1]));
    Ok(())
}

#[test]
fn test_iterator_restart() -> Result<()> {
    let (_file_manager, log_manager) = setup();
    append_records(&log_manager, 0, 99);

    let mut iter = log_manager.iterator()?;
    let first_pass = iter.by_ref().collect::<Result<Vec<_>>>()?;
    assert_eq!(first_pass.len(), 100);
    assert!(iter.next().is_none());

    iter.restart();
    let second_pass = iter.collect::<Result<Vec<_>>>()?;
    assert_eq!(first_pass, second_pass);
    Ok(())
}

#[test]
fn test_iterator_does_not_see_later_appends() -> Result<()> {
    let (_file_manager, log_manager) = setup();
    append_records(&log_manager, 1, 5);

    let iter = log_manager.iterator()?;
    append_records(&log_manager, 6, 10);
    assert_eq!(iter.count(), 5);
    Ok(())
}

#[test]
fn test_log_survives_reopen() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("db");

    {
        let file_manager = Arc::new(FileManager::new(&path, BLOCK_SIZE)?);
        let log_manager = LogManager::new(file_manager, LOG_FILE)?;
        append_records(&log_manager, 1, 40);
        log_manager.flush(log_manager.latest_lsn())?;
        append_records(&log_manager, 41, 42); // never flushed
    }

    let file_manager = Arc::new(FileManager::new(&path, BLOCK_SIZE)?);
    let log_manager = LogManager::new(file_manager, LOG_FILE)?;
    let records = log_manager.iterator()?.collect::<Result<Vec<_>>>()?;
    assert_eq!(records.len(), 40);

    // Appends continue after the surviving records
    log_manager.append(&create_log_record("record41", 141))?;
    assert_eq!(log_manager.iterator()?.count(), 41);
    Ok(())
}
