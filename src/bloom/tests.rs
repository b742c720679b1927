use super::*;

#[test]
fn no_false_negatives_over_many_keys() {
    let mut filter = BloomFilter::with_capacity(1000, 0.01);
    let keys: Vec<Vec<u8>> = (0..1000).map(|i| format!("key{i}").into_bytes()).collect();

    for key in &keys {
        filter.add(key);
    }

    for key in &keys {
        assert!(filter.contains(key), "false negative for {key:?}");
    }
}

#[test]
fn absent_key_usually_reported_absent() {
    let mut filter = BloomFilter::with_capacity(100, 0.01);
    for i in 0..100 {
        filter.add(format!("present{i}").as_bytes());
    }

    let mut false_positives = 0;
    for i in 0..1000 {
        if filter.contains(format!("absent{i}").as_bytes()) {
            false_positives += 1;
        }
    }

    // fp_rate = 0.01 over 1000 probes; allow generous slack for a tiny filter.
    assert!(
        false_positives < 100,
        "false positive rate too high: {false_positives}/1000"
    );
}

#[test]
fn serialization_round_trips() {
    let mut filter = BloomFilter::with_capacity(50, 0.05);
    for i in 0..50 {
        filter.add(format!("k{i}").as_bytes());
    }

    let bytes = filter.to_bytes();
    let restored = BloomFilter::from_bytes(&bytes).unwrap();

    assert_eq!(restored.k(), filter.k());
    assert_eq!(restored.m(), filter.m());
    for i in 0..50 {
        assert!(restored.contains(format!("k{i}").as_bytes()));
    }
}

#[test]
fn header_is_big_endian() {
    let filter = BloomFilter::with_capacity(10, 0.01);
    let bytes = filter.to_bytes();
    let k_be = u32::from_be_bytes(bytes[0..4].try_into().unwrap());
    let m_be = u32::from_be_bytes(bytes[4..8].try_into().unwrap());
    assert_eq!(k_be, filter.k());
    assert_eq!(m_be, filter.m());
}

#[test]
fn truncated_bytes_reject_cleanly() {
    let filter = BloomFilter::with_capacity(10, 0.01);
    let bytes = filter.to_bytes();
    assert!(BloomFilter::from_bytes(&bytes[..4]).is_err());
    assert!(BloomFilter::from_bytes(&bytes[..bytes.len() - 1]).is_err());
}

#[test]
fn empty_capacity_still_usable() {
    let mut filter = BloomFilter::with_capacity(0, 0.01);
    filter.add(b"only-key");
    assert!(filter.contains(b"only-key"));
}
