use xxhash_rust::xxh3::xxh3_64;
use xxhash_rust::xxh3::Xxh3;

/// The hasher used for every identifier the engine generates.
///
/// The hashes don't need to be incredibly fast, but they should be stable across
/// runs, machines, platforms and versions, as they end up in the persisted cache.
pub type IdentifierHasher = Xxh3;

pub fn hash_string(s: &str) -> String {
  hash_bytes(s.as_bytes())
}

pub fn hash_bytes(s: &[u8]) -> String {
  let res = xxh3_64(s);
  format!("{:016x}", res)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn hashes_are_sixteen_hex_digits() {
    let hash = hash_string("quarry");

    assert_eq!(hash.len(), 16);
    assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(hash, hash_bytes(b"quarry"));
  }
}
