use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of the full text. Equal hashes mean the index built
/// from that text can be reused as is.
pub fn content_hash(full_text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(full_text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::content_hash;

    #[test]
    fn hash_is_reproducible_and_hex_encoded() {
        let first = content_hash("[PAGE 1]\nabstract");
        let second = content_hash("[PAGE 1]\nabstract");
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|ch| ch.is_ascii_hexdigit() && !ch.is_ascii_uppercase()));
    }

    #[test]
    fn empty_text_matches_known_digest() {
        assert_eq!(
            content_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn any_change_changes_the_hash() {
        assert_ne!(content_hash("[PAGE 1]\nv1"), content_hash("[PAGE 1]\nv2"));
    }
}
