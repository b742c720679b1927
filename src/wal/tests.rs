use super::*;
use std::io::Write as _;
use tempfile::tempdir;

fn open(dir: &std::path::Path, seq: u32) -> Wal {
    Wal::open(dir.join(segment_name(seq)), WalFsync::PerRecord).unwrap()
}

#[test]
fn segment_name_is_zero_padded() {
    assert_eq!(segment_name(0), "wal_000000.log");
    assert_eq!(segment_name(42), "wal_000042.log");
}

#[test]
fn parse_seq_round_trips_with_segment_name() {
    for seq in [0u32, 1, 42, 999_999] {
        let name = segment_name(seq);
        assert_eq!(parse_seq(Path::new(&name)), Some(seq));
    }
}

#[test]
fn parse_seq_rejects_foreign_names() {
    assert_eq!(parse_seq(Path::new("sst_000001.sst")), None);
    assert_eq!(parse_seq(Path::new("wal_abc.log")), None);
    assert_eq!(parse_seq(Path::new("wal_000001.txt")), None);
}

#[test]
fn append_then_replay_yields_same_records() {
    let dir = tempdir().unwrap();
    let wal = open(dir.path(), 0);

    let records = vec![
        Record::set(b"a".to_vec(), b"1".to_vec()),
        Record::set(b"b".to_vec(), b"2".to_vec()),
        Record::delete(b"a".to_vec()),
        Record::set(b"c".to_vec(), Vec::new()),
    ];
    for r in &records {
        wal.append(r).unwrap();
    }

    let replayed: Vec<Record> = wal.replay_iter().unwrap().map(|r| r.unwrap()).collect();
    assert_eq!(replayed, records);
}

#[test]
fn reopening_existing_segment_preserves_records() {
    let dir = tempdir().unwrap();
    let path = dir.path().join(segment_name(3));
    {
        let wal = Wal::open(&path, WalFsync::PerRecord).unwrap();
        wal.append(&Record::set(b"k".to_vec(), b"v".to_vec())).unwrap();
    }

    let wal = Wal::open(&path, WalFsync::PerRecord).unwrap();
    let replayed: Vec<Record> = wal.replay_iter().unwrap().map(|r| r.unwrap()).collect();
    assert_eq!(replayed, vec![Record::set(b"k".to_vec(), b"v".to_vec())]);
}

#[test]
fn open_rejects_misnamed_segment() {
    let dir = tempdir().unwrap();
    let bad = dir.path().join("not-a-wal.log");
    assert!(Wal::open(&bad, WalFsync::PerRecord).is_err());
}

#[test]
fn torn_tail_is_tolerated_silently() {
    let dir = tempdir().unwrap();
    let path = dir.path().join(segment_name(0));
    {
        let wal = Wal::open(&path, WalFsync::PerRecord).unwrap();
        wal.append(&Record::set(b"a".to_vec(), b"1".to_vec())).unwrap();
        wal.append(&Record::set(b"b".to_vec(), b"2".to_vec())).unwrap();
    }

    // Truncate off the last few bytes to simulate a crash mid-write of
    // the second record's trailing checksum.
    let full_len = std::fs::metadata(&path).unwrap().len();
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(full_len - 3).unwrap();
    drop(file);

    let wal = Wal::open(&path, WalFsync::PerRecord).unwrap();
    let replayed: Result<Vec<Record>, WalError> = wal.replay_iter().unwrap().collect();
    let replayed = replayed.unwrap();
    assert_eq!(replayed, vec![Record::set(b"a".to_vec(), b"1".to_vec())]);
}

#[test]
fn corrupt_middle_frame_is_reported() {
    let dir = tempdir().unwrap();
    let path = dir.path().join(segment_name(0));
    {
        let wal = Wal::open(&path, WalFsync::PerRecord).unwrap();
        wal.append(&Record::set(b"a".to_vec(), b"1".to_vec())).unwrap();
        wal.append(&Record::set(b"b".to_vec(), b"2".to_vec())).unwrap();
        wal.append(&Record::set(b"c".to_vec(), b"3".to_vec())).unwrap();
    }

    // Flip a byte inside the first record's payload, well before EOF.
    let mut file = OpenOptions::new().write(true).read(true).open(&path).unwrap();
    let flip_at = Header::DISK_SIZE as u64 + U32_SIZE as u64;
    file.seek(SeekFrom::Start(flip_at)).unwrap();
    let mut byte = [0u8; 1];
    file.read_exact(&mut byte).unwrap();
    file.seek(SeekFrom::Start(flip_at)).unwrap();
    file.write_all(&[byte[0] ^ 0xFF]).unwrap();
    drop(file);

    let wal = Wal::open(&path, WalFsync::PerRecord).unwrap();
    let result: Result<Vec<Record>, WalError> = wal.replay_iter().unwrap().collect();
    assert!(matches!(result, Err(WalError::Corrupt { .. })));
}

#[test]
fn record_too_large_is_rejected() {
    let dir = tempdir().unwrap();
    let wal = open(dir.path(), 0);
    let huge = vec![0u8; wal.max_record_size as usize + 1];
    let err = wal.append(&Record::set(b"k".to_vec(), huge)).unwrap_err();
    assert!(matches!(err, WalError::RecordTooLarge(_)));
}

#[test]
fn interval_fsync_does_not_sync_every_record() {
    let dir = tempdir().unwrap();
    let wal = Wal::open(
        dir.path().join(segment_name(0)),
        WalFsync::Interval(Duration::from_secs(3600)),
    )
    .unwrap();

    for i in 0..5 {
        wal.append(&Record::set(format!("k{i}").into_bytes(), b"v".to_vec()))
            .unwrap();
    }

    let replayed: Vec<Record> = wal.replay_iter().unwrap().map(|r| r.unwrap()).collect();
    assert_eq!(replayed.len(), 5);
}
