use rand::{thread_rng, Rng};

/// Generates a random identifier in UUIDv4 text format.
pub fn random_id() -> String {
    let mut bytes = [0u8; 16];
    thread_rng().fill(&mut bytes);
    // version 4, RFC 4122 variant
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    let h = hex::encode(bytes);
    format!("{}-{}-{}-{}-{}", &h[0..8], &h[8..12], &h[12..16], &h[16..20], &h[20..32])
}
