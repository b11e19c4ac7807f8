//! FNV-1a hashing used to derive stable numeric error codes.
//!
//! Error replies carry an `errorCode` that consumers group failures by. The
//! code is a pure function of the error classification and message, so the
//! same failure yields the same code across processes and restarts.

/// FNV-1a offset basis (32-bit).
const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;

/// FNV-1a prime (32-bit).
const FNV_PRIME: u32 = 0x0100_0193;

/// Computes a 32-bit FNV-1a hash over the UTF-8 bytes of a string.
///
/// # Examples
///
/// ```
/// use ledgerbridge_core::hash::fnv1a_hash;
///
/// assert_eq!(fnv1a_hash("hello"), 1_335_831_723);
/// assert_eq!(fnv1a_hash(""), 2_166_136_261); // FNV offset basis
/// ```
#[must_use]
pub fn fnv1a_hash(s: &str) -> u32 {
    fnv1a_extend(FNV_OFFSET_BASIS, s)
}

fn fnv1a_extend(mut hash: u32, s: &str) -> u32 {
    for byte in s.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Hashes several parts as one stream, separated by a NUL byte so that
/// `("ab", "c")` and `("a", "bc")` differ.
#[must_use]
pub fn fnv1a_hash_parts(parts: &[&str]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hash = fnv1a_extend(hash, "\0");
        }
        hash = fnv1a_extend(hash, part);
    }
    hash
}

/// Derives a non-negative error code from a classification label and a
/// human-readable message. The result always fits in an `i32`.
#[must_use]
pub fn error_code(label: &str, message: &str) -> i32 {
    // Masking the sign bit keeps the value in 0..=i32::MAX.
    i32::try_from(fnv1a_hash_parts(&[label, message]) & 0x7fff_ffff).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_hash_known_vectors() {
        assert_eq!(fnv1a_hash("hello"), 1_335_831_723);
        assert_eq!(fnv1a_hash("key1"), 927_623_783);
        assert_eq!(fnv1a_hash(""), 2_166_136_261);
    }

    #[test]
    fn fnv1a_hash_case_sensitive() {
        assert_ne!(fnv1a_hash("Hello"), fnv1a_hash("hello"));
    }

    #[test]
    fn parts_are_separated() {
        assert_ne!(fnv1a_hash_parts(&["ab", "c"]), fnv1a_hash_parts(&["a", "bc"]));
        assert_eq!(fnv1a_hash_parts(&["hello"]), fnv1a_hash("hello"));
    }

    #[test]
    fn error_code_is_stable_and_non_negative() {
        let a = error_code("ClassNotFound", "com.nowhere.SimpleFlow");
        let b = error_code("ClassNotFound", "com.nowhere.SimpleFlow");
        assert_eq!(a, b);
        assert!(a >= 0);
        assert_ne!(a, error_code("Timeout", "com.nowhere.SimpleFlow"));
    }

    #[test]
    fn error_code_distribution_1000_unique() {
        let mut set = std::collections::HashSet::new();
        for i in 0..1000 {
            set.insert(error_code("Invocation", &format!("failure-{i}")));
        }
        assert!(set.len() > 990);
    }
}
