// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shamir secret sharing over GF(256).
//!
//! Field arithmetic uses the AES irreducible polynomial (0x11B). Each share
//! is laid out as `[x, y_0, y_1, ..., y_{len-1}]`, so a share is one byte
//! longer than the secret it protects.

use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::{RekeyError, Result};

/// Largest number of shares GF(256) can address (x-coordinates 1..=255).
pub const MAX_SHARES: u8 = 255;

mod gf256 {
    /// Russian Peasant multiplication, reducing by 0x11B after each doubling.
    pub const fn mul(mut a: u8, mut b: u8) -> u8 {
        let mut result: u8 = 0;
        let mut i = 0;
        while i < 8 {
            if b & 1 != 0 {
                result ^= a;
            }
            let carry = a & 0x80;
            a <<= 1;
            if carry != 0 {
                a ^= 0x1B;
            }
            b >>= 1;
            i += 1;
        }
        result
    }

    /// a^254, which is a^-1 for nonzero a. Zero maps to zero.
    pub const fn inv(a: u8) -> u8 {
        if a == 0 {
            return 0;
        }
        let a2 = mul(a, a);
        let a4 = mul(a2, a2);
        let a8 = mul(a4, a4);
        let a16 = mul(a8, a8);
        let a32 = mul(a16, a16);
        let a64 = mul(a32, a32);
        let a128 = mul(a64, a64);
        mul(mul(mul(mul(mul(mul(a128, a64), a32), a16), a8), a4), a2)
    }

    /// Horner evaluation; `coeffs[0]` is the constant term.
    pub fn eval_poly(coeffs: &[u8], x: u8) -> u8 {
        let mut result = 0u8;
        for &coeff in coeffs.iter().rev() {
            result = mul(result, x) ^ coeff;
        }
        result
    }
}

/// A single share produced by [`split`].
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyShare {
    /// Share index (1-based x-coordinate in GF(256)).
    pub index: u8,
    /// Raw share bytes: `[x, y_0, ..., y_{len-1}]`.
    pub data: Vec<u8>,
}

impl KeyShare {
    /// Rebuild a share from its raw encoding.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let Some(&index) = data.first() else {
            return Err(RekeyError::Crypto("empty share".to_string()));
        };
        Ok(Self {
            index,
            data: data.to_vec(),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl std::fmt::Debug for KeyShare {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyShare")
            .field("index", &self.index)
            .field("len", &self.data.len())
            .finish_non_exhaustive()
    }
}

/// Split `secret` into `total` shares, any `threshold` of which recover it.
///
/// For each secret byte a random polynomial of degree `threshold - 1` is
/// drawn with that byte as the constant term and evaluated at x = 1..=total.
pub fn split(secret: &[u8], total: u8, threshold: u8) -> Result<Vec<KeyShare>> {
    if secret.is_empty() {
        return Err(RekeyError::Crypto("cannot split an empty secret".to_string()));
    }
    if total == 0 {
        return Err(RekeyError::Crypto("total shares must be at least 1".to_string()));
    }
    if threshold == 0 {
        return Err(RekeyError::Crypto("threshold must be at least 1".to_string()));
    }
    if threshold > total {
        return Err(RekeyError::Crypto(
            "threshold cannot exceed total shares".to_string(),
        ));
    }

    let threshold = usize::from(threshold);
    let mut shares: Vec<Vec<u8>> = (1..=total)
        .map(|x| {
            let mut data = vec![0u8; secret.len() + 1];
            data[0] = x;
            data
        })
        .collect();

    let mut coeffs = Zeroizing::new(vec![0u8; threshold]);
    let mut rng = rand::thread_rng();

    for (byte_idx, &secret_byte) in secret.iter().enumerate() {
        coeffs[0] = secret_byte;
        rng.fill_bytes(&mut coeffs[1..]);

        for share in &mut shares {
            let x = share[0];
            share[byte_idx + 1] = gf256::eval_poly(&coeffs, x);
        }
    }

    Ok(shares
        .into_iter()
        .map(|data| KeyShare {
            index: data[0],
            data,
        })
        .collect())
}

/// Recover a secret by Lagrange interpolation at x = 0.
///
/// Supplying fewer shares than the original threshold yields garbage, not an
/// error; callers must check the result against something they trust.
pub fn combine(shares: &[KeyShare]) -> Result<Zeroizing<Vec<u8>>> {
    let Some(first) = shares.first() else {
        return Err(RekeyError::Crypto("no shares to combine".to_string()));
    };

    let expected_len = first.data.len();
    if expected_len < 2 {
        return Err(RekeyError::Crypto(format!(
            "invalid share length: {expected_len}"
        )));
    }
    for share in shares {
        if share.data.len() != expected_len {
            return Err(RekeyError::Crypto(format!(
                "invalid share length: {} (expected {expected_len})",
                share.data.len()
            )));
        }
        if share.data[0] == 0 {
            return Err(RekeyError::Crypto(
                "share x-coordinate cannot be zero".to_string(),
            ));
        }
    }

    let x_coords: Vec<u8> = shares.iter().map(|s| s.data[0]).collect();
    let mut sorted = x_coords.clone();
    sorted.sort_unstable();
    if sorted.windows(2).any(|w| w[0] == w[1]) {
        return Err(RekeyError::Crypto(
            "duplicate share x-coordinates".to_string(),
        ));
    }

    // L_j(0) = prod_{k != j} x_k / (x_j XOR x_k); subtraction is XOR in GF(2^8).
    let n = shares.len();
    let mut basis = vec![0u8; n];
    for j in 0..n {
        let mut num = 1u8;
        let mut den = 1u8;
        for k in 0..n {
            if k == j {
                continue;
            }
            num = gf256::mul(num, x_coords[k]);
            den = gf256::mul(den, x_coords[j] ^ x_coords[k]);
        }
        basis[j] = gf256::mul(num, gf256::inv(den));
    }

    let mut secret = Zeroizing::new(vec![0u8; expected_len - 1]);
    for (byte_idx, out) in secret.iter_mut().enumerate() {
        let mut value = 0u8;
        for (share, &b) in shares.iter().zip(&basis) {
            value ^= gf256::mul(share.data[byte_idx + 1], b);
        }
        *out = value;
    }

    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: [u8; 32] = [42u8; 32];

    #[test]
    fn test_gf256_mul_identity() {
        for a in 0..=255u8 {
            assert_eq!(gf256::mul(a, 1), a);
            assert_eq!(gf256::mul(0, a), 0);
        }
    }

    #[test]
    fn test_gf256_inv_exhaustive() {
        for a in 1..=255u8 {
            assert_eq!(gf256::mul(a, gf256::inv(a)), 1, "a={a}");
        }
        assert_eq!(gf256::inv(0), 0);
    }

    #[test]
    fn test_gf256_eval_poly_linear() {
        let coeffs = [5u8, 3u8];
        assert_eq!(gf256::eval_poly(&coeffs, 0), 5);
        assert_eq!(gf256::eval_poly(&coeffs, 1), 5 ^ 3);
    }

    #[test]
    fn test_split_and_combine_threshold_subset() {
        let shares = split(&SECRET, 5, 3).unwrap();
        assert_eq!(shares.len(), 5);

        for combo in [[0, 1, 2], [0, 2, 4], [1, 3, 4]] {
            let subset: Vec<_> = combo.iter().map(|&i| shares[i].clone()).collect();
            assert_eq!(combine(&subset).unwrap().as_slice(), &SECRET);
        }
        assert_eq!(combine(&shares).unwrap().as_slice(), &SECRET);
    }

    #[test]
    fn test_below_threshold_does_not_recover() {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        let shares = split(&secret, 5, 3).unwrap();
        let recovered = combine(&shares[..2]).unwrap();
        assert_ne!(recovered.as_slice(), &secret);
    }

    #[test]
    fn test_threshold_one_shares_carry_secret() {
        let shares = split(&SECRET, 3, 1).unwrap();
        for share in &shares {
            assert_eq!(&share.data[1..], &SECRET);
            let single = combine(std::slice::from_ref(share)).unwrap();
            assert_eq!(single.as_slice(), &SECRET);
        }
    }

    #[test]
    fn test_split_rejects_bad_parameters() {
        assert!(split(&SECRET, 0, 0).is_err());
        assert!(split(&SECRET, 3, 0).is_err());
        assert!(split(&SECRET, 3, 5).is_err());
        assert!(split(&[], 3, 2).is_err());
    }

    #[test]
    fn test_max_shares() {
        let shares = split(&SECRET, MAX_SHARES, 2).unwrap();
        assert_eq!(shares.len(), 255);
        assert_eq!(shares[254].index, 255);
        let pair = vec![shares[17].clone(), shares[254].clone()];
        assert_eq!(combine(&pair).unwrap().as_slice(), &SECRET);
    }

    #[test]
    fn test_share_layout() {
        let shares = split(&SECRET, 3, 2).unwrap();
        for (i, share) in shares.iter().enumerate() {
            assert_eq!(usize::from(share.index), i + 1);
            assert_eq!(share.data[0], share.index);
            assert_eq!(share.data.len(), SECRET.len() + 1);
        }
    }

    #[test]
    fn test_combine_rejects_duplicates() {
        let shares = split(&SECRET, 3, 2).unwrap();
        let dupes = vec![shares[0].clone(), shares[0].clone()];
        let err = combine(&dupes).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_combine_rejects_malformed() {
        assert!(combine(&[]).is_err());

        let mixed = vec![
            KeyShare::from_bytes(&[1, 2, 3]).unwrap(),
            KeyShare::from_bytes(&[2, 3]).unwrap(),
        ];
        assert!(combine(&mixed)
            .unwrap_err()
            .to_string()
            .contains("invalid share length"));

        let zero_x = vec![KeyShare::from_bytes(&[0; 33]).unwrap()];
        assert!(combine(&zero_x)
            .unwrap_err()
            .to_string()
            .contains("x-coordinate cannot be zero"));
    }

    #[test]
    fn test_from_bytes_roundtrip() {
        let shares = split(&SECRET, 2, 2).unwrap();
        let rebuilt = KeyShare::from_bytes(shares[1].as_bytes()).unwrap();
        assert_eq!(rebuilt.index, 2);
        assert!(KeyShare::from_bytes(&[]).is_err());
    }

    #[test]
    fn test_debug_hides_share_bytes() {
        let share = KeyShare::from_bytes(&[1, 0xAB, 0xCD]).unwrap();
        let debug = format!("{share:?}");
        assert!(!debug.contains("171"));
        assert!(debug.contains("index"));
    }
}
