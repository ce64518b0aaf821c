//! 访客指纹
//!
//! `hex(SHA-256(len(address) ‖ address ‖ user_agent))`，地址前带 8 字节
//! 大端长度前缀，保证 `(a, b)` 与 `(a + b, "")` 得到不同的输入。

use sha2::{Digest, Sha256};

/// 指纹长度（十六进制字符数）
pub const FINGERPRINT_LEN: usize = 64;

pub fn fingerprint(address: &str, user_agent: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update((address.len() as u64).to_be_bytes());
    hasher.update(address.as_bytes());
    hasher.update(user_agent.as_bytes());
    hex::encode(hasher.finalize())
}

/// 检查字符串是否为合法指纹（64 位小写十六进制）
pub fn is_fingerprint(value: &str) -> bool {
    value.len() == FINGERPRINT_LEN
        && value
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let a = fingerprint("203.0.113.7", "Mozilla/5.0");
        let b = fingerprint("203.0.113.7", "Mozilla/5.0");
        assert_eq!(a, b);
        assert_eq!(a.len(), FINGERPRINT_LEN);
        assert!(is_fingerprint(&a));
    }

    #[test]
    fn test_distinct_inputs_distinct_digests() {
        let base = fingerprint("203.0.113.7", "Mozilla/5.0");
        assert_ne!(base, fingerprint("203.0.113.8", "Mozilla/5.0"));
        assert_ne!(base, fingerprint("203.0.113.7", "curl/8.0"));
    }

    #[test]
    fn test_boundary_shift_does_not_collide() {
        assert_ne!(fingerprint("ab", "c"), fingerprint("abc", ""));
        assert_ne!(fingerprint("", "abc"), fingerprint("abc", ""));
    }

    fn random_ascii(max_len: usize) -> String {
        let len = rand::random_range(0..=max_len);
        (0..len)
            .map(|_| rand::random_range(b' '..=b'~') as char)
            .collect()
    }

    #[test]
    fn test_sampled_inputs_have_distinct_digests() {
        use std::collections::{HashMap, HashSet};

        let mut inputs: HashSet<(String, String)> = HashSet::new();
        for _ in 0..10_000 {
            let address = format!(
                "{}.{}.{}.{}",
                rand::random_range(0..=255u8),
                rand::random_range(0..=255u8),
                rand::random_range(0..=255u8),
                rand::random_range(0..=255u8)
            );
            let user_agent = random_ascii(40);
            let joined = format!("{}{}", address, user_agent);

            // 同一串字节的不同切分
            if !user_agent.is_empty() {
                let split = address.len() + 1;
                inputs.insert((joined[..split].to_string(), joined[split..].to_string()));
            }
            inputs.insert((joined.clone(), String::new()));
            inputs.insert((String::new(), joined));
            inputs.insert((address, user_agent));
        }

        let mut digests: HashMap<String, (String, String)> = HashMap::new();
        for (address, user_agent) in &inputs {
            let digest = fingerprint(address, user_agent);
            assert!(is_fingerprint(&digest));
            assert_eq!(digest, fingerprint(address, user_agent));
            if let Some(previous) = digests.insert(digest, (address.clone(), user_agent.clone())) {
                panic!(
                    "collision between {:?} and {:?}",
                    previous,
                    (address, user_agent)
                );
            }
        }
        assert_eq!(digests.len(), inputs.len());
        assert!(inputs.len() > 30_000);
    }

    #[test]
    fn test_is_fingerprint_rejects_malformed() {
        assert!(!is_fingerprint("abc"));
        assert!(!is_fingerprint(&"G".repeat(64)));
        assert!(!is_fingerprint(&"A".repeat(64)));
        assert!(is_fingerprint(&"0".repeat(64)));
    }
}
