//! Epoch derivation: compressing a 128-bit unique id into a short,
//! filename-safe token.

use ahash::RandomState;

/// The reserved epoch meaning "pre-cloud-manifest database". A cloud
/// manifest created with this current epoch is a *legacy* manifest: no
/// roll has happened yet.
pub const LEGACY_EPOCH: &str = "";

/// Fixed, non-secret seeds. Determinism (not unpredictability) is what
/// matters here — uniqueness comes from the 128-bit input, not from the
/// hash.
const SEED_LO: RandomStateSeeds = (0x9E3779B97F4A7C15, 0xBF58476D1CE4E5B9, 0x94D049BB133111EB, 0x2545F4914F6CDD1D);
const SEED_HI: RandomStateSeeds = (0xC2B2AE3D27D4EB4F, 0x165667B19E3779F9, 0x27D4EB2F165667C5, 0x85EBCA77C2B2AE63);

type RandomStateSeeds = (u64, u64, u64, u64);

fn hash32(seeds: RandomStateSeeds, data: &[u8]) -> u32 {
    let hasher = RandomState::with_seeds(seeds.0, seeds.1, seeds.2, seeds.3);
    let h = hasher.hash_one(data);
    (h as u32) ^ ((h >> 32) as u32)
}

/// Derive a 16-hex-character epoch from a 128-bit unique id: split the id
/// into two 64-bit halves, hash each half with a fixed-seed, non-
/// cryptographic hasher down to 32 bits, and compose the two 32-bit
/// hashes into one 64-bit value — the first half's hash occupies the low
/// 32 bits, the second half's the high 32 bits — rendered as zero-padded
/// lowercase hex.
pub fn hash_shrink(unique_id: u128) -> String {
    let bytes = unique_id.to_be_bytes();
    let (first_half, second_half) = bytes.split_at(8);
    let low = hash32(SEED_LO, first_half);
    let high = hash32(SEED_HI, second_half);
    let combined: u64 = (low as u64) | ((high as u64) << 32);
    format!("{:016x}", combined)
}

/// Generate a fresh 128-bit unique id. Uniqueness, not unpredictability,
/// is the requirement — this is the `GenerateUniqueId` collaborator hook.
pub fn generate_unique_id() -> u128 {
    rand::random::<u128>()
}

/// Generate a fresh epoch in one step.
pub fn new_epoch() -> String {
    hash_shrink(generate_unique_id())
}
