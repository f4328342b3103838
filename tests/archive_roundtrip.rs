use std::fs;
use std::io::{Read, Seek, SeekFrom};

use hfstage::archive::{pack_directory, read_index, write_index};

mod common;

#[test]
fn pack_then_index_exposes_every_file_by_range() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let source = temp.path().join("src");
    common::write_tree(&source, &[("a.txt", "hi"), ("sub/b.txt", "yo")]);

    let archive = temp.path().join("stage/images/src.tar");
    let index_path = temp.path().join("stage/index/src.json");

    pack_directory(&source, &archive).expect("pack");
    write_index(&archive, &index_path).expect("index");
    let index = read_index(&index_path).expect("read index");

    let names: Vec<&str> = index.files.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["a.txt", "sub/b.txt"]);

    let mut file = fs::File::open(&archive).expect("open archive");
    for (name, expected) in [("a.txt", "hi"), ("sub/b.txt", "yo")] {
        let entry = &index.files[name];
        assert_eq!(entry.length, expected.len() as u64);

        let mut buf = vec![0u8; entry.length as usize];
        file.seek(SeekFrom::Start(entry.offset)).expect("seek");
        file.read_exact(&mut buf).expect("read range");
        assert_eq!(buf, expected.as_bytes());
    }
}

#[test]
fn empty_directory_yields_empty_index() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let source = temp.path().join("empty");
    fs::create_dir(&source).expect("create source");

    let archive = temp.path().join("empty.tar");
    let index_path = temp.path().join("empty.json");
    pack_directory(&source, &archive).expect("pack");
    let index = write_index(&archive, &index_path).expect("index");

    assert!(index.files.is_empty());
    assert_eq!(index.filesize, fs::metadata(&archive).expect("stat").len());
    assert!(index_path.exists());
}

#[test]
fn larger_members_keep_exact_offsets() {
    let temp = tempfile::tempdir().expect("create temp dir");
    let source = temp.path().join("src");
    fs::create_dir_all(source.join("deep/er")).expect("create source");

    // Sizes straddling the 512-byte tar block boundary.
    let payloads: Vec<(String, Vec<u8>)> = [0usize, 1, 511, 512, 513, 4096]
        .iter()
        .enumerate()
        .map(|(i, &len)| {
            let bytes = (0..len).map(|b| (b % 251) as u8 ^ i as u8).collect();
            (format!("deep/er/blob_{i}.bin"), bytes)
        })
        .collect();
    for (name, bytes) in &payloads {
        fs::write(source.join(name), bytes).expect("write payload");
    }

    let archive = temp.path().join("blobs.tar");
    pack_directory(&source, &archive).expect("pack");
    let index = write_index(&archive, &temp.path().join("blobs.json")).expect("index");
    let raw = fs::read(&archive).expect("read archive");

    assert_eq!(index.files.len(), payloads.len());
    for (name, bytes) in &payloads {
        let entry = &index.files[name.as_str()];
        let start = entry.offset as usize;
        let end = start + entry.length as usize;
        assert_eq!(&raw[start..end], bytes.as_slice(), "member {name}");
    }
}
