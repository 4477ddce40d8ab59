use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use sha1::Sha1;
use sha2::{Digest, Sha256};

pub fn sha1_hex(bytes: &[u8]) -> String {
    hex::encode(Sha1::digest(bytes))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Streams the file through SHA-1, the digest npm publishes as `dist.shasum`.
pub fn sha1_file_hex(path: &Path) -> Result<String> {
    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    digest_reader::<Sha1>(BufReader::new(file))
        .with_context(|| format!("failed to hash {}", path.display()))
}

pub fn sha256_file_hex(path: &Path) -> Result<String> {
    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    digest_reader::<Sha256>(BufReader::new(file))
        .with_context(|| format!("failed to hash {}", path.display()))
}

/// Hex digests compare case-insensitively; surrounding whitespace is ignored.
pub fn checksums_match(expected: &str, actual: &str) -> bool {
    expected.trim().eq_ignore_ascii_case(actual.trim())
}

fn digest_reader<D: Digest>(mut reader: impl Read) -> Result<String> {
    let mut hasher = D::new();
    let mut buffer = [0_u8; 64 * 1024];
    loop {
        let read = reader.read(&mut buffer).context("failed reading input")?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;

    #[test]
    fn sha1_matches_known_vector() {
        assert_eq!(sha1_hex(b"abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn sha256_matches_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn streaming_file_digest_matches_in_memory_digest() {
        let mut path = std::env::temp_dir();
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time")
            .as_nanos();
        path.push(format!(
            "regmirror-security-tests-{}-{}.bin",
            std::process::id(),
            nanos
        ));
        let payload: Vec<u8> = (0..200_000_u32).map(|value| (value % 251) as u8).collect();
        fs::write(&path, &payload).expect("must write payload");

        let streamed = sha1_file_hex(&path).expect("must hash file");
        assert_eq!(streamed, sha1_hex(&payload));
        assert_eq!(
            sha256_file_hex(&path).expect("must hash file"),
            sha256_hex(&payload)
        );

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = sha1_file_hex(Path::new("/nonexistent/regmirror/file.tgz"))
            .expect_err("must fail for missing file");
        assert!(err.to_string().contains("/nonexistent/regmirror/file.tgz"));
    }

    #[test]
    fn checksum_comparison_ignores_case_and_whitespace() {
        assert!(checksums_match("ABCDEF\n", "abcdef"));
        assert!(!checksums_match("abcdef", "abcdee"));
    }
}
