//! Deterministic element identifier generation.

const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Longest identifier a single blake3 digest can produce.
pub const MAX_OID_LENGTH: usize = blake3::OUT_LEN;

/// Generates short lowercase alphanumeric identifiers.
///
/// Identifiers derive from the file path, an anchor byte offset and an attempt
/// counter, so re-running the mapper over identical input yields identical output.
#[derive(Debug, Clone)]
pub struct OidGenerator {
    length: usize,
}

impl OidGenerator {
    pub fn new(length: usize) -> Self {
        Self {
            length: length.clamp(1, MAX_OID_LENGTH),
        }
    }

    /// Candidate identifier for a given anchor and attempt.
    pub fn candidate(&self, path: &str, anchor: usize, attempt: u32) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(path.as_bytes());
        hasher.update(&[0]);
        hasher.update(&(anchor as u64).to_le_bytes());
        hasher.update(&attempt.to_le_bytes());
        let digest = hasher.finalize();

        digest.as_bytes()[..self.length]
            .iter()
            .map(|b| ALPHABET[(*b as usize) % ALPHABET.len()] as char)
            .collect()
    }

    /// First candidate for which `taken` is false.
    pub fn generate<F>(&self, path: &str, anchor: usize, taken: F) -> String
    where
        F: Fn(&str) -> bool,
    {
        let mut attempt = 0u32;
        loop {
            let oid = self.candidate(path, anchor, attempt);
            if !taken(&oid) {
                return oid;
            }
            attempt = attempt.wrapping_add(1);
        }
    }
}
