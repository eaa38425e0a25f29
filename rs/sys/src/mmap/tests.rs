use super::SharedMmap;
use std::io::Read;

const LEN: usize = 64 * 1024;

#[test]
fn fill_and_sync_reach_the_backing_file() {
    let tmp = tempfile::Builder::new()
        .prefix("shared_mmap")
        .tempfile()
        .unwrap();
    tmp.as_file().set_len(LEN as u64).unwrap();

    let mut mapping = SharedMmap::of_file(tmp.as_file(), LEN).unwrap();
    assert_eq!(mapping.len(), LEN);
    assert!(!mapping.is_empty());

    mapping.fill(0x42);
    mapping.sync().unwrap();
    assert!(mapping.as_slice().iter().all(|b| *b == 0x42));
    mapping.unmap().unwrap();

    let mut contents = Vec::new();
    tmp.reopen().unwrap().read_to_end(&mut contents).unwrap();
    assert_eq!(contents.len(), LEN);
    assert!(contents.iter().all(|b| *b == 0x42));
}

#[test]
fn mapping_is_not_longer_than_requested() {
    let tmp = tempfile::tempfile().unwrap();
    tmp.set_len((2 * LEN) as u64).unwrap();

    let mapping = SharedMmap::of_file(&tmp, LEN).unwrap();
    assert_eq!(mapping.len(), LEN);
    assert_eq!(mapping.as_slice().len(), LEN);
}

#[test]
fn zero_length_mapping_is_empty() {
    let tmp = tempfile::tempfile().unwrap();
    let mapping = SharedMmap::of_file(&tmp, 0).unwrap();
    assert!(mapping.is_empty());
    assert_eq!(mapping.len(), 0);
    mapping.unmap().unwrap();
}

#[test]
fn drop_unmaps_without_an_explicit_unmap() {
    let tmp = tempfile::tempfile().unwrap();
    tmp.set_len(LEN as u64).unwrap();
    {
        let mut mapping = SharedMmap::of_file(&tmp, LEN).unwrap();
        mapping.fill(0x01);
    }
    // The drop above must release the region without panicking.
}
