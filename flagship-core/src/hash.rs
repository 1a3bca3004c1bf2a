//! Deterministic bucketing for percentage-based rollout.
//!
//! MurmurHash3 (x86, 32-bit) with a fixed zero seed, so a (flag, user)
//! pair lands in the same bucket across calls, processes, and restarts.

const C1: u32 = 0xcc9e_2d51;
const C2: u32 = 0x1b87_3593;

/// Compute the 32-bit MurmurHash3 of `key` with the given seed.
pub fn murmur3_32(key: &str, seed: u32) -> u32 {
    let data = key.as_bytes();
    let len = data.len();
    let nblocks = len / 4;

    let mut h1 = seed;

    for block in data[..nblocks * 4].chunks_exact(4) {
        let mut k1 = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);

        k1 = k1.wrapping_mul(C1);
        k1 = k1.rotate_left(15);
        k1 = k1.wrapping_mul(C2);

        h1 ^= k1;
        h1 = h1.rotate_left(13);
        h1 = h1.wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let tail = &data[nblocks * 4..];
    let mut k1: u32 = 0;
    if !tail.is_empty() {
        if tail.len() >= 3 {
            k1 ^= u32::from(tail[2]) << 16;
        }
        if tail.len() >= 2 {
            k1 ^= u32::from(tail[1]) << 8;
        }
        k1 ^= u32::from(tail[0]);
        k1 = k1.wrapping_mul(C1);
        k1 = k1.rotate_left(15);
        k1 = k1.wrapping_mul(C2);
        h1 ^= k1;
    }

    h1 ^= len as u32;
    fmix32(h1)
}

/// Assign a bucket in [0, 99] for percentage-based rollout.
///
/// The hash input is the byte-exact concatenation `flagKey:userID`; an
/// empty user id is valid and yields a bucket determined solely by the
/// flag key.
pub fn compute_bucket(flag_key: &str, user_id: &str) -> u32 {
    let combined = format!("{flag_key}:{user_id}");
    murmur3_32(&combined, 0) % 100
}

fn fmix32(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_answer_vectors() {
        assert_eq!(murmur3_32("", 0), 0);
        assert_eq!(murmur3_32("", 1), 0x514e_28b7);
        assert_eq!(murmur3_32("hello", 0), 613_153_351);
        assert_eq!(murmur3_32("test", 0), 0xba6b_d213);
    }

    #[test]
    fn hash_is_deterministic() {
        for input in ["feature-x:user-123", "feature-y:user-456", "my-flag:"] {
            assert_eq!(murmur3_32(input, 0), murmur3_32(input, 0));
        }
    }

    #[test]
    fn bucket_is_in_range_and_stable() {
        for (flag, user) in [
            ("feature-x", "user-123"),
            ("feature-y", "user-456"),
            ("my-flag", "user-789"),
            ("my-flag", ""),
        ] {
            let bucket = compute_bucket(flag, user);
            assert!(bucket < 100, "bucket {bucket} out of range");
            assert_eq!(bucket, compute_bucket(flag, user));
        }
    }

    #[test]
    fn buckets_spread_across_the_range() {
        let mut counts = [0u32; 100];
        for i in 0..10_000 {
            let user = format!("user-{i}");
            counts[compute_bucket("test-flag", &user) as usize] += 1;
        }
        let occupied = counts.iter().filter(|&&c| c > 0).count();
        assert!(occupied > 90, "only {occupied} buckets occupied");
    }

    #[test]
    fn separator_is_part_of_the_hashed_bytes() {
        assert_ne!(murmur3_32("dark-mode:", 0), murmur3_32("dark-mode", 0));
    }
}
