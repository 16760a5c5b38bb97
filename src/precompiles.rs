//! Precompiled contracts at addresses 0x01..0x09. A failure here surfaces to
//! the caller as a failed child call that burnt its forwarded gas; the halt
//! taxonomy labels it PrecompileError.

use eyre::{Result, eyre};

use ark_bn254::{Bn254, Fq, Fq2, Fr, G1Affine, G1Projective, G2Affine};
use ark_ec::{AffineRepr, CurveGroup, pairing::Pairing};
use ark_ff::{BigInteger, PrimeField};
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use num_bigint::BigUint;
use num_traits::Zero;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use crate::{
    common::{Address, hash::keccak256},
    fork::Fork,
};

/// The precompile set grows with the fork: the four classics from the start,
/// modexp and the bn128 trio at Byzantium, blake2f at Istanbul.
pub fn is_precompile(fork: Fork, address: &Address) -> bool {
    let last = address.0[19];
    if address.0[0..19] != [0u8; 19] || last == 0 {
        return false;
    }
    let count = if fork.at_least(Fork::Istanbul) {
        9
    } else if fork.at_least(Fork::Byzantium) {
        8
    } else {
        4
    };
    last <= count
}

pub fn cost(address: &Address, input: &[u8]) -> u64 {
    match address.0[19] {
        1 => 3000,
        2 => 60 + 12 * input.len().div_ceil(32) as u64,
        3 => 600 + 120 * input.len().div_ceil(32) as u64,
        4 => 15 + 3 * input.len().div_ceil(32) as u64,
        5 => modexp_cost(input),
        6 => 150,
        7 => 6000,
        8 => 45000 + 34000 * (input.len() / 192) as u64,
        9 => blake2f_cost(input),
        _ => 0,
    }
}

pub fn execute(address: &Address, input: &[u8]) -> Result<Vec<u8>> {
    match address.0[19] {
        1 => ecrecover(input),
        2 => sha256(input),
        3 => ripemd160(input),
        4 => identity(input),
        5 => modexp(input),
        6 => bn128_add(input),
        7 => bn128_mul(input),
        8 => bn128_pairing(input),
        9 => blake2f(input),
        _ => Err(eyre!("not a precompile address")),
    }
}

/// Zero-extend `input` to `len` bytes; precompile inputs are implicitly
/// right-padded with zeros.
fn padded(input: &[u8], len: usize) -> Vec<u8> {
    let mut data = input.to_vec();
    if data.len() < len {
        data.resize(len, 0);
    }
    data
}

// 0x01: ECDSA public key recovery. Unrecoverable inputs yield an empty
// output, not a failure.
fn ecrecover(input: &[u8]) -> Result<Vec<u8>> {
    let input = padded(input, 128);

    let msg_hash = &input[0..32];
    let v = &input[32..64];
    let r = &input[64..96];
    let s = &input[96..128];

    if v[..31] != [0u8; 31] || (v[31] != 27 && v[31] != 28) {
        return Ok(vec![]);
    }
    let recovery_id = match RecoveryId::from_byte(v[31] - 27) {
        Some(id) => id,
        None => return Ok(vec![]),
    };

    let mut signature_bytes = [0u8; 64];
    signature_bytes[0..32].copy_from_slice(r);
    signature_bytes[32..64].copy_from_slice(s);
    let signature = match Signature::from_slice(&signature_bytes) {
        Ok(signature) => signature,
        Err(_) => return Ok(vec![]),
    };

    let key = match VerifyingKey::recover_from_prehash(msg_hash, &signature, recovery_id) {
        Ok(key) => key,
        Err(_) => return Ok(vec![]),
    };

    // keccak of the uncompressed key without its 0x04 tag; low 20 bytes are
    // the address, left-padded to a word.
    let encoded = key.to_encoded_point(false);
    let hash = keccak256(&encoded.as_bytes()[1..]);
    let mut output = vec![0u8; 32];
    output[12..32].copy_from_slice(&hash[12..32]);
    Ok(output)
}

// 0x02: SHA-256.
fn sha256(input: &[u8]) -> Result<Vec<u8>> {
    let mut hasher = Sha256::new();
    hasher.update(input);
    Ok(hasher.finalize().to_vec())
}

// 0x03: RIPEMD-160, left-padded to a word.
fn ripemd160(input: &[u8]) -> Result<Vec<u8>> {
    let mut hasher = Ripemd160::new();
    hasher.update(input);
    let hash = hasher.finalize();
    let mut output = vec![0u8; 32];
    output[12..32].copy_from_slice(&hash);
    Ok(output)
}

// 0x04: identity.
fn identity(input: &[u8]) -> Result<Vec<u8>> {
    Ok(input.to_vec())
}

// 0x05: modular exponentiation.
fn modexp(input: &[u8]) -> Result<Vec<u8>> {
    let head = padded(input, 96);
    let base_len = read_len(&head[0..32])?;
    let exp_len = read_len(&head[32..64])?;
    let mod_len = read_len(&head[64..96])?;

    let body = padded(
        input.get(96..).unwrap_or(&[]),
        base_len + exp_len + mod_len,
    );
    let base = BigUint::from_bytes_be(&body[0..base_len]);
    let exp = BigUint::from_bytes_be(&body[base_len..base_len + exp_len]);
    let modulus = BigUint::from_bytes_be(&body[base_len + exp_len..base_len + exp_len + mod_len]);

    if modulus.is_zero() {
        return Ok(vec![0u8; mod_len]);
    }

    let result = base.modpow(&exp, &modulus);
    let bytes = result.to_bytes_be();
    let mut output = vec![0u8; mod_len - bytes.len()];
    output.extend(bytes);
    Ok(output)
}

fn read_len(word: &[u8]) -> Result<usize> {
    if word[..24] != [0u8; 24] {
        return Err(eyre!("modexp length out of range"));
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&word[24..32]);
    let len = u64::from_be_bytes(bytes);
    if len > 1 << 20 {
        return Err(eyre!("modexp length out of range"));
    }
    Ok(len as usize)
}

fn modexp_cost(input: &[u8]) -> u64 {
    let head = padded(input, 96);
    let base_len = BigUint::from_bytes_be(&head[0..32]);
    let exp_len = BigUint::from_bytes_be(&head[32..64]);
    let mod_len = BigUint::from_bytes_be(&head[64..96]);

    let base_len: u64 = base_len.try_into().unwrap_or(u64::MAX);
    let exp_len: u64 = exp_len.try_into().unwrap_or(u64::MAX);
    let mod_len: u64 = mod_len.try_into().unwrap_or(u64::MAX);

    // EIP-2565 multiplication complexity over the wider of base and modulus.
    let max_len = base_len.max(mod_len);
    let words = max_len.div_ceil(8);
    let multiplication_complexity = words.saturating_mul(words);

    let iteration_count = if exp_len <= 32 {
        let exp_start = 96usize.saturating_add(base_len as usize);
        let exp_bytes = padded(input.get(exp_start..).unwrap_or(&[]), exp_len as usize);
        BigUint::from_bytes_be(&exp_bytes).bits().saturating_sub(1)
    } else {
        let head_bits = input
            .get(96usize.saturating_add(base_len as usize)..)
            .map(|tail| {
                let window = padded(tail, 32);
                BigUint::from_bytes_be(&window[..32]).bits().saturating_sub(1)
            })
            .unwrap_or(0);
        8u64.saturating_mul(exp_len - 32).saturating_add(head_bits)
    };

    (multiplication_complexity.saturating_mul(iteration_count.max(1)) / 3).max(200)
}

fn parse_fq(bytes: &[u8]) -> Result<Fq> {
    let value = BigUint::from_bytes_be(bytes);
    let modulus: BigUint = Fq::MODULUS.into();
    if value >= modulus {
        return Err(eyre!("bn128 coordinate exceeds the field modulus"));
    }
    Ok(Fq::from(value))
}

fn parse_g1(x_bytes: &[u8], y_bytes: &[u8]) -> Result<G1Affine> {
    let x = BigUint::from_bytes_be(x_bytes);
    let y = BigUint::from_bytes_be(y_bytes);
    if x.is_zero() && y.is_zero() {
        return Ok(G1Affine::zero());
    }
    let point = G1Affine::new_unchecked(parse_fq(x_bytes)?, parse_fq(y_bytes)?);
    if !point.is_on_curve() || !point.is_in_correct_subgroup_assuming_on_curve() {
        return Err(eyre!("bn128 point not on curve"));
    }
    Ok(point)
}

fn g1_to_bytes(point: G1Projective) -> Vec<u8> {
    let mut output = vec![0u8; 64];
    if !point.is_zero() {
        let affine = point.into_affine();
        let x = affine.x.into_bigint().to_bytes_be();
        let y = affine.y.into_bigint().to_bytes_be();
        output[32 - x.len()..32].copy_from_slice(&x);
        output[64 - y.len()..64].copy_from_slice(&y);
    }
    output
}

// 0x06: bn128 point addition.
fn bn128_add(input: &[u8]) -> Result<Vec<u8>> {
    let input = padded(input, 128);
    let p1: G1Projective = parse_g1(&input[0..32], &input[32..64])?.into();
    let p2: G1Projective = parse_g1(&input[64..96], &input[96..128])?.into();
    Ok(g1_to_bytes(p1 + p2))
}

// 0x07: bn128 scalar multiplication.
fn bn128_mul(input: &[u8]) -> Result<Vec<u8>> {
    let input = padded(input, 96);
    let point: G1Projective = parse_g1(&input[0..32], &input[32..64])?.into();
    let scalar = Fr::from(BigUint::from_bytes_be(&input[64..96]));
    Ok(g1_to_bytes(point * scalar))
}

// 0x08: bn128 pairing check over 192-byte (G1, G2) pairs.
fn bn128_pairing(input: &[u8]) -> Result<Vec<u8>> {
    if !input.len().is_multiple_of(192) {
        return Err(eyre!("pairing input must be a multiple of 192 bytes"));
    }

    let mut g1_points = Vec::with_capacity(input.len() / 192);
    let mut g2_points = Vec::with_capacity(input.len() / 192);
    for pair in input.chunks_exact(192) {
        g1_points.push(parse_g1(&pair[0..32], &pair[32..64])?);

        // G2 coordinates arrive with the imaginary component first.
        let x_c1 = BigUint::from_bytes_be(&pair[64..96]);
        let x_c0 = BigUint::from_bytes_be(&pair[96..128]);
        let y_c1 = BigUint::from_bytes_be(&pair[128..160]);
        let y_c0 = BigUint::from_bytes_be(&pair[160..192]);
        let g2 = if x_c0.is_zero() && x_c1.is_zero() && y_c0.is_zero() && y_c1.is_zero() {
            G2Affine::zero()
        } else {
            let x = Fq2::new(parse_fq(&pair[96..128])?, parse_fq(&pair[64..96])?);
            let y = Fq2::new(parse_fq(&pair[160..192])?, parse_fq(&pair[128..160])?);
            let point = G2Affine::new_unchecked(x, y);
            if !point.is_on_curve() || !point.is_in_correct_subgroup_assuming_on_curve() {
                return Err(eyre!("bn128 point not on curve"));
            }
            point
        };
        g2_points.push(g2);
    }

    let mut output = vec![0u8; 32];
    if g1_points.is_empty() || Bn254::multi_pairing(g1_points, g2_points).is_zero() {
        output[31] = 1;
    }
    Ok(output)
}

// 0x09: blake2 F compression function.
fn blake2f(input: &[u8]) -> Result<Vec<u8>> {
    if input.len() != 213 {
        return Err(eyre!("blake2f input must be exactly 213 bytes"));
    }
    let final_flag = input[212];
    if final_flag > 1 {
        return Err(eyre!("blake2f final flag must be boolean"));
    }

    let rounds = u32::from_be_bytes([input[0], input[1], input[2], input[3]]);
    let mut h = [0u64; 8];
    let mut m = [0u64; 16];
    let mut t = [0u64; 2];
    for (i, word) in h.iter_mut().enumerate() {
        *word = read_le_u64(&input[4 + i * 8..]);
    }
    for (i, word) in m.iter_mut().enumerate() {
        *word = read_le_u64(&input[68 + i * 8..]);
    }
    for (i, word) in t.iter_mut().enumerate() {
        *word = read_le_u64(&input[196 + i * 8..]);
    }

    let state = compress(h, m, t, final_flag == 1, rounds);

    let mut output = vec![0u8; 64];
    for (i, word) in state.iter().enumerate() {
        output[i * 8..(i + 1) * 8].copy_from_slice(&word.to_le_bytes());
    }
    Ok(output)
}

fn blake2f_cost(input: &[u8]) -> u64 {
    if input.len() < 4 {
        return 0;
    }
    u32::from_be_bytes([input[0], input[1], input[2], input[3]]) as u64
}

fn read_le_u64(bytes: &[u8]) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(word)
}

const BLAKE2_IV: [u64; 8] = [
    0x6a09e667f3bcc908,
    0xbb67ae8584caa73b,
    0x3c6ef372fe94f82b,
    0xa54ff53a5f1d36f1,
    0x510e527fade682d1,
    0x9b05688c2b3e6c1f,
    0x1f83d9abfb41bd6b,
    0x5be0cd19137e2179,
];

const SIGMA: [[usize; 16]; 10] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15],
    [14, 10, 4, 8, 9, 15, 13, 6, 1, 12, 0, 2, 11, 7, 5, 3],
    [11, 8, 12, 0, 5, 2, 15, 13, 10, 14, 3, 6, 7, 1, 9, 4],
    [7, 9, 3, 1, 13, 12, 11, 14, 2, 6, 5, 10, 4, 0, 15, 8],
    [9, 0, 5, 7, 2, 4, 10, 15, 14, 1, 11, 12, 6, 8, 3, 13],
    [2, 12, 6, 10, 0, 11, 8, 3, 4, 13, 7, 5, 15, 14, 1, 9],
    [12, 5, 1, 15, 14, 13, 4, 10, 0, 7, 6, 3, 9, 2, 8, 11],
    [13, 11, 7, 14, 12, 1, 3, 9, 5, 0, 15, 4, 8, 6, 2, 10],
    [6, 15, 14, 9, 11, 3, 0, 8, 12, 2, 13, 7, 1, 4, 10, 5],
    [10, 2, 8, 4, 7, 6, 1, 5, 15, 11, 9, 14, 3, 12, 13, 0],
];

fn compress(mut h: [u64; 8], m: [u64; 16], t: [u64; 2], last: bool, rounds: u32) -> [u64; 8] {
    let mut v = [0u64; 16];
    v[0..8].copy_from_slice(&h);
    v[8..16].copy_from_slice(&BLAKE2_IV);
    v[12] ^= t[0];
    v[13] ^= t[1];
    if last {
        v[14] = !v[14];
    }

    for round in 0..rounds as usize {
        let s = &SIGMA[round % 10];
        mix(&mut v, 0, 4, 8, 12, m[s[0]], m[s[1]]);
        mix(&mut v, 1, 5, 9, 13, m[s[2]], m[s[3]]);
        mix(&mut v, 2, 6, 10, 14, m[s[4]], m[s[5]]);
        mix(&mut v, 3, 7, 11, 15, m[s[6]], m[s[7]]);
        mix(&mut v, 0, 5, 10, 15, m[s[8]], m[s[9]]);
        mix(&mut v, 1, 6, 11, 12, m[s[10]], m[s[11]]);
        mix(&mut v, 2, 7, 8, 13, m[s[12]], m[s[13]]);
        mix(&mut v, 3, 4, 9, 14, m[s[14]], m[s[15]]);
    }

    for i in 0..8 {
        h[i] ^= v[i] ^ v[i + 8];
    }
    h
}

fn mix(v: &mut [u64; 16], a: usize, b: usize, c: usize, d: usize, x: u64, y: u64) {
    v[a] = v[a].wrapping_add(v[b]).wrapping_add(x);
    v[d] = (v[d] ^ v[a]).rotate_right(32);
    v[c] = v[c].wrapping_add(v[d]);
    v[b] = (v[b] ^ v[c]).rotate_right(24);
    v[a] = v[a].wrapping_add(v[b]).wrapping_add(y);
    v[d] = (v[d] ^ v[a]).rotate_right(16);
    v[c] = v[c].wrapping_add(v[d]);
    v[b] = (v[b] ^ v[c]).rotate_right(63);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::address::addr;

    fn precompile(n: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = n;
        Address(bytes)
    }

    #[test]
    fn test_fork_gated_set() {
        assert!(is_precompile(Fork::Frontier, &precompile(4)));
        assert!(!is_precompile(Fork::Frontier, &precompile(5)));
        assert!(is_precompile(Fork::Byzantium, &precompile(8)));
        assert!(!is_precompile(Fork::Byzantium, &precompile(9)));
        assert!(is_precompile(Fork::Istanbul, &precompile(9)));
        assert!(!is_precompile(Fork::Cancun, &precompile(0)));
        assert!(!is_precompile(Fork::Cancun, &precompile(10)));
        assert!(!is_precompile(
            Fork::Cancun,
            &addr("0x0100000000000000000000000000000000000001")
        ));
    }

    #[test]
    fn test_identity() {
        assert_eq!(execute(&precompile(4), b"abc").unwrap(), b"abc");
        assert_eq!(cost(&precompile(4), &[0u8; 33]), 15 + 3 * 2);
    }

    #[test]
    fn test_sha256_vector() {
        let output = execute(&precompile(2), b"abc").unwrap();
        assert_eq!(
            hex::encode(output),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_ripemd160_vector() {
        let output = execute(&precompile(3), b"abc").unwrap();
        assert_eq!(
            hex::encode(output),
            "0000000000000000000000008eb208f7e05d987a9b044a8e98c6b087f15a0bfc"
        );
    }

    #[test]
    fn test_ecrecover_known_vector() {
        // From the Yellow Paper's example transaction signature set.
        let mut input = vec![];
        input.extend(
            hex::decode("456e9aea5e197a1f1af7a3e85a3212fa4049a3ba34c2289b4c860fc0b0c64ef3")
                .unwrap(),
        );
        input.extend(
            hex::decode("000000000000000000000000000000000000000000000000000000000000001c")
                .unwrap(),
        );
        input.extend(
            hex::decode("9242685bf161793cc25603c231bc2f568eb630ea16aa137d2664ac8038825608")
                .unwrap(),
        );
        input.extend(
            hex::decode("4f8ae3bd7535248d0bd448298cc2e2071e56992d0774dc340c368ae950852ada")
                .unwrap(),
        );
        let output = execute(&precompile(1), &input).unwrap();
        assert_eq!(
            hex::encode(&output),
            "0000000000000000000000007156526fbd7a3c72969b54f64e42c10fbb768c8a"
        );
    }

    #[test]
    fn test_ecrecover_invalid_v_is_empty_success() {
        let input = [0u8; 128];
        assert!(execute(&precompile(1), &input).unwrap().is_empty());
    }

    #[test]
    fn test_modexp_simple() {
        // 3 ^ 5 mod 7 = 5, all lengths 1.
        let mut input = vec![0u8; 96];
        input[31] = 1;
        input[63] = 1;
        input[95] = 1;
        input.extend([3u8, 5, 7]);
        assert_eq!(execute(&precompile(5), &input).unwrap(), vec![5u8]);
    }

    #[test]
    fn test_modexp_zero_modulus() {
        let mut input = vec![0u8; 96];
        input[31] = 1;
        input[63] = 1;
        input[95] = 2;
        input.extend([3u8, 5]);
        assert_eq!(execute(&precompile(5), &input).unwrap(), vec![0u8, 0]);
    }

    #[test]
    fn test_bn128_add_identity() {
        // P + 0 = P for the generator (1, 2).
        let mut input = vec![0u8; 128];
        input[31] = 1;
        input[63] = 2;
        let output = execute(&precompile(6), &input).unwrap();
        assert_eq!(output[31], 1);
        assert_eq!(output[63], 2);
    }

    #[test]
    fn test_bn128_mul_by_one() {
        let mut input = vec![0u8; 96];
        input[31] = 1;
        input[63] = 2;
        input[95] = 1;
        let output = execute(&precompile(7), &input).unwrap();
        assert_eq!(output[31], 1);
        assert_eq!(output[63], 2);
    }

    #[test]
    fn test_bn128_point_off_curve_fails() {
        let mut input = vec![0u8; 128];
        input[31] = 1;
        input[63] = 3;
        assert!(execute(&precompile(6), &input).is_err());
    }

    #[test]
    fn test_bn128_pairing_empty_is_true() {
        let output = execute(&precompile(8), &[]).unwrap();
        assert_eq!(output[31], 1);
        assert_eq!(cost(&precompile(8), &[]), 45000);
    }

    #[test]
    fn test_blake2f_computes_blake2b_of_abc() {
        // EIP-152 test vector 5: 12 rounds over the one-block message "abc"
        // must produce the unkeyed blake2b-512 digest of "abc".
        let mut input = 12u32.to_be_bytes().to_vec();
        input.extend(
            hex::decode(
                "48c9bdf267e6096a3ba7ca8485ae67bb2bf894fe72f36e3cf1361d5f3af54fa5\
                 d182e6ad7f520e511f6c3e2b8c68059b6bbd41fbabd9831f79217e1319cde05b",
            )
            .unwrap(),
        );
        let mut message = b"abc".to_vec();
        message.resize(128, 0);
        input.extend(message);
        input.extend(3u64.to_le_bytes());
        input.extend(0u64.to_le_bytes());
        input.push(1);
        assert_eq!(input.len(), 213);

        let output = execute(&precompile(9), &input).unwrap();
        assert_eq!(
            hex::encode(&output),
            "ba80a53f981c4d0d6a2797b69f12f6e94c212f14685ac4b74b12bb6fdbffa2d1\
             7d87c5392aab792dc252d5de4533cc9518d38aa8dbf1925ab92386edd4009923"
        );
        assert_eq!(cost(&precompile(9), &input), 12);
    }

    #[test]
    fn test_blake2f_wrong_length_fails() {
        assert!(execute(&precompile(9), &[0u8; 212]).is_err());
    }
}
