use sha2::{Digest, Sha256};
use std::io::Read;

const PREFIX: &str = "sha256:";

/// SHA-256 of `content`, formatted as `sha256:<hex>`
pub fn hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{}{:x}", PREFIX, hasher.finalize())
}

/// Streams `reader` through SHA-256 without buffering the whole input
pub fn hash_reader<R: Read>(mut reader: R) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{}{:x}", PREFIX, hasher.finalize()))
}

/// Check that a checksum string is `sha256:` followed by 64 hex chars
pub fn is_valid(checksum: &str) -> bool {
    match checksum.strip_prefix(PREFIX) {
        Some(hex) => hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}
