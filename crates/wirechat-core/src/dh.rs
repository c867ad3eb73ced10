//! Finite-field Diffie-Hellman: group parameters, keypairs, and the
//! triple-DH combine that yields the session secret.
//!
//! The group lives in a params file and is loaded once at startup. Secret
//! exponents are wiped when a keypair is dropped.

use std::path::Path;

use hkdf::Hkdf;
use num_bigint::{BigUint, RandBigInt};
use num_traits::{One, Zero};
use sha2::Sha512;
use zeroize::{Zeroize, Zeroizing};

use crate::error::ChannelError;

/// Domain separator for the HKDF expand inside [`combine3`].
const COMBINE_INFO: &[u8] = b"wirechat-3dh-session-v1";

/// A DH group: prime modulus `p` and a generator `g` of the subgroup of
/// prime order `q`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhParams {
    p: BigUint,
    g: BigUint,
    q: BigUint,
}

impl DhParams {
    /// Build a group from raw components, checking that `g` actually
    /// generates a subgroup of order `q` modulo `p`.
    pub fn new(p: BigUint, g: BigUint, q: BigUint) -> Result<Self, ChannelError> {
        if p <= BigUint::from(3u32) || !p.bit(0) {
            return Err(ChannelError::BadParameters(
                "modulus must be an odd prime above 3".into(),
            ));
        }
        if g <= BigUint::one() || g >= p {
            return Err(ChannelError::BadParameters(
                "generator must lie strictly between 1 and p".into(),
            ));
        }
        if q <= BigUint::one() {
            return Err(ChannelError::BadParameters(
                "subgroup order must be above 1".into(),
            ));
        }
        if !g.modpow(&q, &p).is_one() {
            return Err(ChannelError::BadParameters(
                "generator does not have order q".into(),
            ));
        }
        Ok(Self { p, g, q })
    }

    /// Load the group from a params file: three whitespace-separated
    /// decimal integers, in the order `p q g`.
    pub fn from_file(path: &Path) -> Result<Self, ChannelError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ChannelError::BadParameters(format!("{}: {e}", path.display())))?;
        Self::parse(&text)
    }

    fn parse(text: &str) -> Result<Self, ChannelError> {
        let fields: Vec<&str> = text.split_whitespace().collect();
        if fields.len() != 3 {
            return Err(ChannelError::BadParameters(format!(
                "expected 3 integers (p q g), found {}",
                fields.len()
            )));
        }
        let p = parse_decimal(fields[0])?;
        let q = parse_decimal(fields[1])?;
        let g = parse_decimal(fields[2])?;
        Self::new(p, g, q)
    }

    pub fn modulus(&self) -> &BigUint {
        &self.p
    }

    pub fn generator(&self) -> &BigUint {
        &self.g
    }

    pub fn order(&self) -> &BigUint {
        &self.q
    }

    /// Whether `x` can be a peer's public element: strictly between 1 and
    /// `p - 1`, which rules out the trivial-subgroup values an attacker
    /// could use to force a known shared secret.
    pub fn contains(&self, x: &BigUint) -> bool {
        x > &BigUint::one() && *x < &self.p - 1u32
    }
}

fn parse_decimal(s: &str) -> Result<BigUint, ChannelError> {
    BigUint::parse_bytes(s.as_bytes(), 10)
        .ok_or_else(|| ChannelError::BadParameters(format!("not a decimal integer: {s:.40}")))
}

/// A DH keypair. The secret exponent is overwritten with zero on drop.
#[derive(Debug)]
pub struct DhKeyPair {
    secret: BigUint,
    public: BigUint,
}

impl DhKeyPair {
    /// Generate a fresh keypair: secret uniform in `[1, q)`,
    /// `public = g^secret mod p`.
    pub fn generate(params: &DhParams) -> Self {
        let mut rng = rand::thread_rng();
        let secret = rng.gen_biguint_range(&BigUint::one(), &params.q);
        let public = params.g.modpow(&secret, &params.p);
        Self { secret, public }
    }

    /// Reassemble a keypair from stored components (key-file loading).
    pub fn from_parts(secret: BigUint, public: BigUint) -> Self {
        Self { secret, public }
    }

    pub fn public(&self) -> &BigUint {
        &self.public
    }

    pub(crate) fn secret(&self) -> &BigUint {
        &self.secret
    }

    /// Overwrite the secret exponent with zero. Also runs on drop.
    pub fn zeroize(&mut self) {
        self.secret.set_zero();
    }
}

impl Drop for DhKeyPair {
    fn drop(&mut self) {
        self.zeroize();
    }
}

/// Derive `out_len` bytes of session secret from the triple-DH of both
/// peers' long-term and ephemeral keys.
///
/// The three shared elements (long-term x ephemeral in both pairings, plus
/// ephemeral x ephemeral) are serialized and sorted before hashing, so the
/// listener and the connector feed HKDF identical input without needing a
/// role flag. Callers treat the output as a pseudo-random function of both
/// peers' full key view.
pub fn combine3(
    params: &DhParams,
    own_long_term: &DhKeyPair,
    own_ephemeral: &DhKeyPair,
    peer_long_term_pk: &BigUint,
    peer_ephemeral_pk: &BigUint,
    out_len: usize,
) -> Result<Zeroizing<Vec<u8>>, ChannelError> {
    let p = &params.p;
    let mut lt_eph = peer_long_term_pk.modpow(own_ephemeral.secret(), p);
    let mut eph_lt = peer_ephemeral_pk.modpow(own_long_term.secret(), p);
    let mut eph_eph = peer_ephemeral_pk.modpow(own_ephemeral.secret(), p);

    let mut shares = [
        lt_eph.to_bytes_le(),
        eph_lt.to_bytes_le(),
        eph_eph.to_bytes_le(),
    ];
    lt_eph.set_zero();
    eph_lt.set_zero();
    eph_eph.set_zero();
    shares.sort();

    let mut ikm = Zeroizing::new(Vec::with_capacity(
        shares.iter().map(Vec::len).sum::<usize>(),
    ));
    for share in &mut shares {
        ikm.extend_from_slice(share);
        share.zeroize();
    }

    let mut okm = Zeroizing::new(vec![0u8; out_len]);
    Hkdf::<Sha512>::new(None, &ikm)
        .expand(COMBINE_INFO, &mut okm)
        .map_err(|_| {
            ChannelError::BadParameters(format!("cannot expand a {out_len}-byte session secret"))
        })?;
    Ok(okm)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// 512-bit safe prime `p = 2q + 1`; `g = 4` generates the order-`q`
    /// subgroup. Big enough to behave like a real group, small enough to
    /// keep debug-mode tests quick.
    pub const GROUP_P: &str = "13225910448659575397742054266040736164635486043714919403625771217981744861000131905905661375349173712549067973535895929922163519309531769386341778022726887";
    pub const GROUP_Q: &str = "6612955224329787698871027133020368082317743021857459701812885608990872430500065952952830687674586856274533986767947964961081759654765884693170889011363443";
    pub const GROUP_G: &str = "4";

    pub fn group() -> DhParams {
        DhParams::new(
            BigUint::parse_bytes(GROUP_P.as_bytes(), 10).unwrap(),
            BigUint::parse_bytes(GROUP_G.as_bytes(), 10).unwrap(),
            BigUint::parse_bytes(GROUP_Q.as_bytes(), 10).unwrap(),
        )
        .unwrap()
    }

    /// Tiny group (p = 227 = 2*113 + 1, g = 4) for validation tests where
    /// group size does not matter.
    pub fn small_group() -> DhParams {
        DhParams::new(
            BigUint::from(227u32),
            BigUint::from(4u32),
            BigUint::from(113u32),
        )
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{group, small_group};
    use super::*;

    #[test]
    fn rejects_even_modulus() {
        let err = DhParams::new(
            BigUint::from(226u32),
            BigUint::from(4u32),
            BigUint::from(113u32),
        )
        .unwrap_err();
        assert!(matches!(err, ChannelError::BadParameters(_)));
    }

    #[test]
    fn rejects_generator_outside_range() {
        for g in [1u32, 227] {
            let err = DhParams::new(
                BigUint::from(227u32),
                BigUint::from(g),
                BigUint::from(113u32),
            )
            .unwrap_err();
            assert!(matches!(err, ChannelError::BadParameters(_)));
        }
    }

    #[test]
    fn rejects_wrong_subgroup_order() {
        // 4 does not have order 7 mod 227.
        let err = DhParams::new(
            BigUint::from(227u32),
            BigUint::from(4u32),
            BigUint::from(7u32),
        )
        .unwrap_err();
        assert!(matches!(err, ChannelError::BadParameters(_)));
    }

    #[test]
    fn parses_params_text() {
        let text = format!(
            "{}\n{}\n{}\n",
            testing::GROUP_P,
            testing::GROUP_Q,
            testing::GROUP_G
        );
        let parsed = DhParams::new(
            BigUint::parse_bytes(testing::GROUP_P.as_bytes(), 10).unwrap(),
            BigUint::parse_bytes(testing::GROUP_G.as_bytes(), 10).unwrap(),
            BigUint::parse_bytes(testing::GROUP_Q.as_bytes(), 10).unwrap(),
        )
        .unwrap();
        assert_eq!(DhParams::parse(&text).unwrap(), parsed);
    }

    #[test]
    fn rejects_malformed_params_text() {
        for text in ["", "227 113", "227 113 4 9", "227 not-a-number 4"] {
            assert!(matches!(
                DhParams::parse(text).unwrap_err(),
                ChannelError::BadParameters(_)
            ));
        }
    }

    #[test]
    fn generated_public_is_a_group_element() {
        let params = small_group();
        for _ in 0..20 {
            let kp = DhKeyPair::generate(&params);
            assert!(!kp.secret().is_zero());
            assert!(kp.secret() < params.order());
            assert!(params.contains(kp.public()));
        }
    }

    #[test]
    fn contains_rejects_trivial_elements() {
        let params = small_group();
        assert!(!params.contains(&BigUint::zero()));
        assert!(!params.contains(&BigUint::one()));
        assert!(!params.contains(&(params.modulus() - 1u32)));
        assert!(!params.contains(params.modulus()));
        assert!(params.contains(&BigUint::from(4u32)));
    }

    #[test]
    fn both_sides_combine_to_the_same_secret() {
        let params = group();
        let a_lt = DhKeyPair::generate(&params);
        let a_eph = DhKeyPair::generate(&params);
        let b_lt = DhKeyPair::generate(&params);
        let b_eph = DhKeyPair::generate(&params);

        let ka = combine3(&params, &a_lt, &a_eph, b_lt.public(), b_eph.public(), 64).unwrap();
        let kb = combine3(&params, &b_lt, &b_eph, a_lt.public(), a_eph.public(), 64).unwrap();
        assert_eq!(ka, kb);
        assert_eq!(ka.len(), 64);
    }

    #[test]
    fn different_ephemeral_key_changes_the_secret() {
        let params = group();
        let a_lt = DhKeyPair::generate(&params);
        let a_eph = DhKeyPair::generate(&params);
        let b_lt = DhKeyPair::generate(&params);
        let b_eph = DhKeyPair::generate(&params);
        let b_eph2 = DhKeyPair::generate(&params);

        let k1 = combine3(&params, &a_lt, &a_eph, b_lt.public(), b_eph.public(), 64).unwrap();
        let k2 = combine3(&params, &a_lt, &a_eph, b_lt.public(), b_eph2.public(), 64).unwrap();
        assert_ne!(k1, k2);
    }

    #[test]
    fn wrong_long_term_key_changes_the_secret() {
        // The trust-file mismatch the handshake's confirmation token catches.
        let params = group();
        let a_lt = DhKeyPair::generate(&params);
        let a_eph = DhKeyPair::generate(&params);
        let b_lt = DhKeyPair::generate(&params);
        let b_eph = DhKeyPair::generate(&params);
        let imposter = DhKeyPair::generate(&params);

        let ka = combine3(&params, &a_lt, &a_eph, imposter.public(), b_eph.public(), 64).unwrap();
        let kb = combine3(&params, &b_lt, &b_eph, a_lt.public(), a_eph.public(), 64).unwrap();
        assert_ne!(ka, kb);
    }

    #[test]
    fn zeroize_clears_the_secret_exponent() {
        let params = small_group();
        let mut kp = DhKeyPair::generate(&params);
        kp.zeroize();
        assert!(kp.secret().is_zero());
    }
}
