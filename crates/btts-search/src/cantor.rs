//! Cantor pairing for the single-index layout.
//!
//! Maps `(chat_id, message_id)` onto one primary key so documents from every
//! chat can share an index. Group chats carry negative ids, so signed ids are
//! zigzag folded onto the naturals before pairing.

use crate::error::SearchError;

/// Pair two non-negative integers into one.
pub fn pair(a: u64, b: u64) -> u64 {
    let (a, b) = (a as u128, b as u128);
    let sum = a + b;
    (sum * (sum + 1) / 2 + b) as u64
}

/// Inverse of [`pair`].
pub fn unpair(z: u64) -> (u64, u64) {
    let z = z as u128;
    // w = floor((sqrt(8z + 1) - 1) / 2)
    let w = (isqrt(8 * z + 1) - 1) / 2;
    let t = w * (w + 1) / 2;
    let b = z - t;
    let a = w - b;
    (a as u64, b as u64)
}

/// Zigzag fold: 0, -1, 1, -2, 2 ... onto 0, 1, 2, 3, 4 ...
fn fold(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

/// Checked pairing of signed ids.
///
/// Fails when the pair does not fit in a `u64`.
pub fn pair_ids(chat_id: i64, message_id: i64) -> Result<u64, SearchError> {
    let (a, b) = (fold(chat_id) as u128, fold(message_id) as u128);
    let sum = a + b;
    sum.checked_mul(sum + 1)
        .and_then(|t| u64::try_from(t / 2 + b).ok())
        .ok_or_else(|| {
            SearchError::InvalidRequest(format!(
                "ids too large to pair ({}, {})",
                chat_id, message_id
            ))
        })
}

/// Integer square root (floor).
fn isqrt(n: u128) -> u128 {
    if n < 2 {
        return n;
    }
    let mut x = (n as f64).sqrt() as u128;
    while x * x > n {
        x -= 1;
    }
    while (x + 1) * (x + 1) <= n {
        x += 1;
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_values() {
        assert_eq!(pair(0, 0), 0);
        assert_eq!(pair(1, 0), 1);
        assert_eq!(pair(0, 1), 2);
        assert_eq!(pair(2, 0), 3);
        assert_eq!(pair(47, 32), 3192);
    }

    #[test]
    fn test_unpair_inverts_pair() {
        let samples = [
            (0u64, 0u64),
            (1, 2),
            (100, 1),
            (1_234_567, 89),
            ((1 << 31) - 1, 0),
            (0, (1 << 31) - 1),
            ((1 << 31) - 1, (1 << 31) - 1),
        ];
        for (a, b) in samples {
            assert_eq!(unpair(pair(a, b)), (a, b), "pair({}, {})", a, b);
        }
    }

    #[test]
    fn test_pair_is_injective_on_small_grid() {
        let mut seen = std::collections::HashSet::new();
        for a in 0..64 {
            for b in 0..64 {
                assert!(seen.insert(pair(a, b)));
            }
        }
    }

    #[test]
    fn test_signed_ids_are_folded() {
        assert_eq!(pair_ids(0, 0).unwrap(), 0);
        assert_eq!(pair_ids(-1, 0).unwrap(), pair(1, 0));
        assert_eq!(pair_ids(1, 0).unwrap(), pair(2, 0));
        assert_ne!(pair_ids(-42, 7).unwrap(), pair_ids(42, 7).unwrap());
        assert!(pair_ids(i64::MAX, 1).is_err());
    }
}
