//! Integration tests for the par2gen binary

use par2gen::packets::{decode_body, decode_header, split_packets, verify_packet, RecoverySliceBody};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_par2gen"))
}

fn create_test_file(path: &Path, len: usize, seed: u8) {
    let content: Vec<u8> = (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect();
    fs::write(path, content).unwrap();
}

fn packet_types(bytes: &[u8]) -> Vec<[u8; 16]> {
    split_packets(bytes)
        .into_iter()
        .map(|p| decode_header(p).unwrap().type_of_packet)
        .collect()
}

#[test]
fn test_help() {
    let output = Command::new(binary())
        .arg("--help")
        .output()
        .expect("Failed to execute par2gen");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("PAR2 recovery set creator"));
    assert!(stdout.contains("create"));
}

#[test]
fn test_create_writes_index_and_volume() {
    let dir = TempDir::new().unwrap();
    create_test_file(&dir.path().join("one.bin"), 5000, 1);
    create_test_file(&dir.path().join("two.bin"), 10, 2);
    let base = dir.path().join("set");

    let output = Command::new(binary())
        .arg("create")
        .arg(&base)
        .arg(dir.path().join("one.bin"))
        .arg(dir.path().join("two.bin"))
        .args(["-s", "4096", "-c", "3", "--comment", "test set", "-q"])
        .output()
        .expect("Failed to execute par2gen");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let index = fs::read(dir.path().join("set.par2")).unwrap();
    let packets = split_packets(&index);
    assert_eq!(packets.iter().map(|p| p.len()).sum::<usize>(), index.len());
    assert!(packets.iter().all(|p| verify_packet(p)));

    let types = packet_types(&index);
    assert_eq!(&types[0], b"PAR 2.0\0Main\0\0\0\0");
    assert_eq!(types.iter().filter(|t| *t == b"PAR 2.0\0FileDesc").count(), 2);
    assert_eq!(types.iter().filter(|t| *t == b"PAR 2.0\0IFSC\0\0\0\0").count(), 2);
    assert!(types.contains(b"PAR 2.0\0Creator\0"));
    assert!(types.contains(b"PAR 2.0\0CommASCI"));

    let volume = fs::read(dir.path().join("set.vol000+03.par2")).unwrap();
    let packets = split_packets(&volume);
    assert_eq!(packets.len(), 3 + types.len());
    for (i, packet) in packets.iter().take(3).enumerate() {
        assert!(verify_packet(packet));
        let (_, body) = decode_body::<RecoverySliceBody>(packet).unwrap();
        assert_eq!(body.exponent, i as u32);
        assert_eq!(body.recovery_data.len(), 4096);
    }
    assert_eq!(&volume[volume.len() - index.len()..], index.as_slice());
}

#[test]
fn test_chunked_output_matches_whole_slices() {
    let dir = TempDir::new().unwrap();
    create_test_file(&dir.path().join("data.bin"), 9000, 7);
    let input = dir.path().join("data.bin");

    for (base, extra) in [("whole", vec![]), ("chunked", vec!["--chunk-size", "1000"])] {
        let status = Command::new(binary())
            .arg("create")
            .arg(dir.path().join(base))
            .arg(&input)
            .args(["-s", "2048", "-c", "4", "-q"])
            .args(extra)
            .status()
            .expect("Failed to execute par2gen");
        assert!(status.success());
    }

    let whole = fs::read(dir.path().join("whole.vol000+04.par2")).unwrap();
    let chunked = fs::read(dir.path().join("chunked.vol000+04.par2")).unwrap();
    assert_eq!(whole, chunked);
}

#[test]
fn test_invalid_slice_size_fails() {
    let dir = TempDir::new().unwrap();
    create_test_file(&dir.path().join("x.bin"), 100, 3);

    let output = Command::new(binary())
        .arg("create")
        .arg(dir.path().join("x"))
        .arg(dir.path().join("x.bin"))
        .args(["-s", "1001"])
        .output()
        .expect("Failed to execute par2gen");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("multiple of 4"));
}

#[test]
fn test_missing_input_fails() {
    let dir = TempDir::new().unwrap();
    let output = Command::new(binary())
        .arg("create")
        .arg(dir.path().join("y"))
        .arg(dir.path().join("does-not-exist"))
        .output()
        .expect("Failed to execute par2gen");

    assert!(!output.status.success());
    assert!(!dir.path().join("y.par2").exists());
}

#[test]
fn test_invalid_chunk_size_fails_before_writing() {
    let dir = TempDir::new().unwrap();
    create_test_file(&dir.path().join("z.bin"), 100, 4);

    for chunk_size in ["0", "7"] {
        let output = Command::new(binary())
            .arg("create")
            .arg(dir.path().join("z"))
            .arg(dir.path().join("z.bin"))
            .args(["-s", "64", "-c", "2", "--chunk-size", chunk_size])
            .output()
            .expect("Failed to execute par2gen");

        assert!(!output.status.success());
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("Chunk size"), "stderr: {}", stderr);
        assert!(!dir.path().join("z.par2").exists());
        assert!(!dir.path().join("z.vol000+02.par2").exists());
    }
}
