use rand::Rng;
use sha2::{Digest, Sha256};

use crate::db::types::CourseRole;

const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub(crate) fn generate_invite_code(course_slug: &str, role: CourseRole) -> String {
    let role_prefix = match role {
        CourseRole::Teacher => "TEACH",
        CourseRole::Student => "STUD",
    };

    let normalized_slug = course_slug
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric())
        .take(6)
        .collect::<String>()
        .to_uppercase();

    let random = generate_suffix(8);
    format!("{}-{}-{}", normalized_slug, role_prefix, random)
}

pub(crate) fn hash_invite_code(invite_code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(invite_code.as_bytes());
    hex::encode(hasher.finalize())
}

fn generate_suffix(len: usize) -> String {
    let mut rng = rand::thread_rng();
    let mut output = String::with_capacity(len);
    for _ in 0..len {
        let index = rng.gen_range(0..ALPHABET.len());
        output.push(ALPHABET[index] as char);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invite_code_embeds_slug_and_role() {
        let code = generate_invite_code("rust-101", CourseRole::Student);
        assert!(code.starts_with("RUST10-STUD-"));
        assert_eq!(code.len(), "RUST10-STUD-".len() + 8);
    }

    #[test]
    fn hash_is_stable_and_hex() {
        let a = hash_invite_code("RUST10-STUD-ABCD2345");
        let b = hash_invite_code("RUST10-STUD-ABCD2345");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
    }
}
