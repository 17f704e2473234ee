mod common;

use std::fs;
use std::io::Write;

use assert_matches::assert_matches;
use flate2::Compression;
use flate2::write::GzEncoder;
use tempfile::TempDir;

use kira_refdata::error::KiraError;
use kira_refdata::extract::{self, ExtractSummary};
use kira_refdata::progress::NoopSink;

use common::{Recorder, build_tar_gz};

#[test]
fn tarball_members_land_under_destination() {
    let dir = TempDir::new().unwrap();
    let staging = dir.path().join("staging");
    fs::create_dir_all(&staging).unwrap();
    let mut files = Vec::new();
    for i in 0..12 {
        let path = staging.join(format!("part{i}.txt"));
        fs::write(&path, format!("member {i}\n")).unwrap();
        files.push((format!("bundle/part{i}.txt"), path));
    }
    let archive = dir.path().join("bundle.tar.gz");
    let members = files
        .iter()
        .map(|(name, path)| (name.as_str(), path.as_path()))
        .collect::<Vec<_>>();
    build_tar_gz(&archive, &members);

    let dest = dir.path().join("out");
    let sink = Recorder::default();
    let summary = extract::extract(&archive, &dest, &sink).unwrap();

    assert_eq!(summary.members, 12);
    assert_eq!(
        fs::read_to_string(dest.join("bundle/part11.txt")).unwrap(),
        "member 11\n"
    );
    let messages = sink.messages();
    let progress = messages
        .iter()
        .filter(|message| message.starts_with("bundle.tar.gz") && !message.contains("done"))
        .count();
    assert_eq!(progress, 2);
    assert!(messages.last().unwrap().contains("done: 12 items"));
}

#[test]
fn tarball_with_parent_segments_is_rejected() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("evil.tar.gz");
    let file = fs::File::create(&archive).unwrap();
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    let data = b"escaped";
    let mut header = tar::Header::new_gnu();
    let name = b"../escaped.txt";
    header.as_old_mut().name[..name.len()].copy_from_slice(name);
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append(&header, &data[..]).unwrap();
    builder.into_inner().unwrap().finish().unwrap();

    let dest = dir.path().join("out");
    let err = extract::extract(&archive, &dest, &NoopSink).unwrap_err();
    assert_matches!(err, KiraError::Archive(message) if message.contains("escapes"));
    assert!(!dir.path().join("escaped.txt").exists());
}

#[test]
fn zip_members_are_extracted() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("bundle.zip");
    let mut writer = zip::ZipWriter::new(fs::File::create(&archive).unwrap());
    let options = zip::write::SimpleFileOptions::default();
    writer.start_file("docs/readme.txt", options).unwrap();
    writer.write_all(b"hello").unwrap();
    writer.start_file("data.tsv", options).unwrap();
    writer.write_all(b"a\tb\n").unwrap();
    writer.finish().unwrap();

    let dest = dir.path().join("out");
    let summary = extract::extract(&archive, &dest, &NoopSink).unwrap();
    assert_eq!(
        summary,
        ExtractSummary {
            members: 2,
            bytes: 9
        }
    );
    assert_eq!(fs::read(dest.join("docs/readme.txt")).unwrap(), b"hello");
}

#[test]
fn corrupt_tarball_fails() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("broken.tar.gz");
    fs::write(&archive, b"definitely not gzip").unwrap();

    let err = extract::extract(&archive, &dir.path().join("out"), &NoopSink).unwrap_err();
    assert_matches!(err, KiraError::Archive(_));
}

#[test]
fn unknown_container_format() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("payload.rar");
    fs::write(&archive, b"x").unwrap();

    let err = extract::extract(&archive, &dir.path().join("out"), &NoopSink).unwrap_err();
    assert_matches!(err, KiraError::Archive(message) if message.contains("unsupported"));
}
