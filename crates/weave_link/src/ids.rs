use sha2::{Digest, Sha256};
use std::fmt::Write;

/// Deterministic identifier: `prefix` plus 32 hex digits of a SHA-256 over
/// the `|`-joined arguments.
pub fn generate_identifier(prefix: &str, args: &[&str]) -> String {
    let digest = Sha256::digest(args.join("|").as_bytes());
    let mut id = String::with_capacity(prefix.len() + 32);
    id.push_str(prefix);
    for byte in &digest[..16] {
        let _ = write!(id, "{:02x}", byte);
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_is_stable() {
        let a = generate_identifier("fls", &["INSTALLFOLDER", "a.txt"]);
        let b = generate_identifier("fls", &["INSTALLFOLDER", "a.txt"]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 3 + 32);
        assert!(a.starts_with("fls"));
    }

    #[test]
    fn test_identifier_depends_on_args() {
        assert_ne!(
            generate_identifier("fls", &["D", "a.txt"]),
            generate_identifier("fls", &["D", "b.txt"])
        );
        assert_ne!(generate_identifier("fls", &["ab", "c"]), generate_identifier("fls", &["a", "bc"]));
    }
}
