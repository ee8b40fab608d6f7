mod common;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use common::{read_block, setup_managers, test_config};
use simpledb_rust::{BlockId, Lsn, Result, SimpleDBError, TxNum};
use tempfile::TempDir;

#[test]
fn test_buffer_replacement() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let (_file_manager, _log_manager, buffer_manager) = setup_managers(&dir.path().join("db"), 3);

    let block = |n| BlockId::new("testfile", n);
    let buff0 = buffer_manager.pin(&block(0))?;
    let buff1 = buffer_manager.pin(&block(1))?;
    let buff2 = buffer_manager.pin(&block(2))?;
    assert_eq!(buffer_manager.available(), 0);

    buffer_manager.unpin(&buff1)?;
    assert_eq!(buffer_manager.available(), 1);

    // Block 0 is pinned twice; block 1 is still cached and gets its buffer back
    let buff3 = buffer_manager.pin(&block(0))?;
    let buff4 = buffer_manager.pin(&block(1))?;
    assert!(Arc::ptr_eq(&buff0, &buff3));
    assert!(Arc::ptr_eq(&buff1, &buff4));
    assert_eq!(buffer_manager.available(), 0);
    assert_eq!(buff0.lock().pin_count(), 2);

    // Pool exhausted: no buffer for block 3, and only after the full wait
    let started = Instant::now();
    assert!(matches!(
        buffer_manager.pin(&block(3)),
        Err(SimpleDBError::BufferAbort { .. })
    ));
    assert!(started.elapsed() >= test_config().buffer_wait_timeout);

    buffer_manager.unpin(&buff2)?;
    let buff5 = buffer_manager.pin(&block(3))?;
    assert!(Arc::ptr_eq(&buff2, &buff5));
    assert_eq!(buff5.lock().block(), Some(&block(3)));
    Ok(())
}

#[test]
fn test_unassigned_buffers_are_used_first() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let (_file_manager, _log_manager, buffer_manager) = setup_managers(&dir.path().join("db"), 2);

    let buff0 = buffer_manager.pin(&BlockId::new("testfile", 0))?;
    buffer_manager.unpin(&buff0)?;

    // Block 0 stays cached while a fresh buffer is free
    let buff1 = buffer_manager.pin(&BlockId::new("testfile", 1))?;
    assert!(!Arc::ptr_eq(&buff0, &buff1));
    assert_eq!(buff0.lock().block(), Some(&BlockId::new("testfile", 0)));
    Ok(())
}

#[test]
fn test_unpin_unpinned_buffer_fails() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let (_file_manager, _log_manager, buffer_manager) = setup_managers(&dir.path().join("db"), 2);

    let buffer = buffer_manager.pin(&BlockId::new("testfile", 0))?;
    buffer_manager.unpin(&buffer)?;
    assert!(buffer_manager.unpin(&buffer).is_err());
    assert_eq!(buffer_manager.available(), 2);
    Ok(())
}

#[test]
fn test_waiter_gets_buffer_after_unpin() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let (_file_manager, _log_manager, buffer_manager) = setup_managers(&dir.path().join("db"), 1);
    let buffer_manager = Arc::new(buffer_manager);

    let held = buffer_manager.pin(&BlockId::new("testfile", 0))?;

    let waiter = {
        let buffer_manager = Arc::clone(&buffer_manager);
        thread::spawn(move || buffer_manager.pin(&BlockId::new("testfile", 1)).map(|_| ()))
    };

    thread::sleep(Duration::from_millis(100));
    buffer_manager.unpin(&held)?;

    waiter.join().unwrap()?;
    assert_eq!(buffer_manager.available(), 0);
    Ok(())
}

#[test]
fn test_modified_page_written_on_replacement() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let (file_manager, _log_manager, buffer_manager) = setup_managers(&dir.path().join("db"), 1);
    let block0 = BlockId::new("testfile", 0);

    let buffer = buffer_manager.pin(&block0)?;
    {
        let mut guard = buffer.lock();
        guard.contents_mut().set_int(80, 4242)?;
        guard.set_modified(TxNum(1), None);
    }
    buffer_manager.unpin(&buffer)?;
    assert_eq!(read_block(&file_manager, &block0).get_int(80)?, 0);

    // Reusing the only buffer writes block 0 back first
    let other = buffer_manager.pin(&BlockId::new("testfile", 1))?;
    assert!(Arc::ptr_eq(&buffer, &other));
    assert_eq!(read_block(&file_manager, &block0).get_int(80)?, 4242);
    assert_eq!(other.lock().modifying_tx(), None);
    Ok(())
}

#[test]
fn test_flush_all_only_flushes_transaction_buffers() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let (file_manager, _log_manager, buffer_manager) = setup_managers(&dir.path().join("db"), 3);
    let block_a = BlockId::new("testfile", 0);
    let block_b = BlockId::new("testfile", 1);

    let buff_a = buffer_manager.pin(&block_a)?;
    let buff_b = buffer_manager.pin(&block_b)?;
    for (buffer, txnum, value) in [(&buff_a, TxNum(1), 11), (&buff_b, TxNum(2), 22)] {
        let mut guard = buffer.lock();
        guard.contents_mut().set_int(0, value)?;
        guard.set_modified(txnum, None);
    }

    buffer_manager.flush_all(TxNum(1))?;
    assert_eq!(read_block(&file_manager, &block_a).get_int(0)?, 11);
    assert_eq!(read_block(&file_manager, &block_b).get_int(0)?, 0);
    assert_eq!(buff_a.lock().modifying_tx(), None);
    assert_eq!(buff_b.lock().modifying_tx(), Some(TxNum(2)));

    buffer_manager.flush_all_modified()?;
    assert_eq!(read_block(&file_manager, &block_b).get_int(0)?, 22);
    Ok(())
}

#[test]
fn test_flush_forces_log_first() -> Result<()> {
    let dir = TempDir::new().unwrap();
    let (_file_manager, log_manager, buffer_manager) = setup_managers(&dir.path().join("db"), 2);

    // Some records so the one that matters is not the first in its block
    for _ in 0..3 {
        log_manager.append(b"filler")?;
    }
    log_manager.flush(log_manager.latest_lsn())?;
    let lsn = log_manager.append(b"change record")?;
    assert!(log_manager.last_saved_lsn() < lsn);

    let buffer = buffer_manager.pin(&BlockId::new("testfile", 0))?;
    {
        let mut guard = buffer.lock();
        guard.contents_mut().set_int(0, 7)?;
        guard.set_modified(TxNum(1), Some(lsn));
        assert_eq!(guard.lsn(), Some(lsn));

        // An unlogged change keeps the recorded LSN
        guard.set_modified(TxNum(1), None);
        assert_eq!(guard.lsn(), Some(lsn));
    }

    buffer_manager.flush_all(TxNum(1))?;
    assert!(log_manager.last_saved_lsn() >= lsn);
    assert_eq!(log_manager.last_saved_lsn(), Lsn(4));
    Ok(())
}
