use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::common::{decode, hash::keccak256, word::Word};

#[derive(Clone, Copy, Default, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub fn zero() -> Self {
        Self([0u8; 20])
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|byte| byte == &0)
    }

    /// Address of a contract created by this account at the given nonce:
    /// keccak256(rlp([sender, nonce]))[12:].
    pub fn create(&self, nonce: u64) -> Address {
        let nonce_bytes = nonce
            .to_be_bytes()
            .into_iter()
            .skip_while(|byte| byte == &0)
            .collect::<Vec<_>>();

        let mut buffer = Vec::with_capacity(2 + 20 + 1 + nonce_bytes.len());
        // Nonces below 128 are a single RLP byte, larger ones get a length
        // prefix; nonce zero encodes as the empty string (0x80).
        let nonce_rlp_len = if nonce < 128 { 1 } else { 1 + nonce_bytes.len() };
        buffer.push(0xc0u8 + (1 + 20 + nonce_rlp_len) as u8);
        buffer.push(0x80u8 + 20);
        buffer.extend_from_slice(&self.0);
        if nonce == 0 {
            buffer.push(0x80);
        } else if nonce < 128 {
            buffer.push(nonce as u8);
        } else {
            buffer.push(0x80u8 + nonce_bytes.len() as u8);
            buffer.extend_from_slice(&nonce_bytes);
        }

        let hash = keccak256(&buffer);
        let mut addr = [0u8; 20];
        addr.copy_from_slice(&hash[12..32]);
        Address(addr)
    }

    /// Salted creation address:
    /// keccak256(0xff ++ sender ++ salt ++ keccak256(init_code))[12:].
    pub fn create2(&self, salt: &Word, init_code_hash: &[u8; 32]) -> Address {
        let mut buffer = Vec::with_capacity(1 + 20 + 32 + 32);
        buffer.push(0xffu8);
        buffer.extend_from_slice(&self.0);
        buffer.extend_from_slice(&salt.into_bytes());
        buffer.extend_from_slice(init_code_hash);
        let hash = keccak256(&buffer);
        let mut addr = [0u8; 20];
        addr.copy_from_slice(&hash[12..32]);
        Address(addr)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Address(0x{})", hex::encode(self.0))
    }
}

impl From<&Address> for Word {
    fn from(value: &Address) -> Self {
        let mut bytes = [0u8; 32];
        bytes[12..].copy_from_slice(&value.0);
        Word::from_bytes(&bytes)
    }
}

impl From<&Word> for Address {
    fn from(value: &Word) -> Self {
        let bytes: [u8; 32] = value.into_bytes();
        let mut ret = Address::default();
        ret.0[..].copy_from_slice(&bytes[12..]);
        ret
    }
}

impl From<[u8; 20]> for Address {
    fn from(value: [u8; 20]) -> Self {
        Self(value)
    }
}

impl TryFrom<&[u8]> for Address {
    type Error = crate::common::error::Error;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        if value.len() != 20 {
            return Err(crate::common::error::Error::InvalidAddress);
        }
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(value);
        Ok(Address(bytes))
    }
}

impl TryFrom<&str> for Address {
    type Error = crate::common::error::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if value.len() != 40 && value.len() != 42 {
            return Err(crate::common::error::Error::InvalidAddress);
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(value.trim_start_matches("0x"), &mut bytes)
            .map_err(|_| crate::common::error::Error::InvalidAddress)?;
        Ok(Address(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(self.0)))
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Address, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;

        let hex: String = Deserialize::deserialize(deserializer)?;
        let hex = hex.trim_start_matches("0x");
        if hex.len() != 40 {
            return Err(D::Error::invalid_value(
                serde::de::Unexpected::Str(hex),
                &"Invalid hex length",
            ));
        }
        Ok(addr(hex))
    }
}

pub const fn addr(s: &str) -> Address {
    Address(decode(s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_address() {
        assert_eq!(
            addr("0x5bc1c1942f2333acb9ce156525bc079fad983f13").create(0x065b),
            addr("0xe77afefd5b7beb79d1843e65a0fd54963abc742f")
        );
    }

    #[test]
    fn test_create_address_zero_nonce() {
        // Known vector: first contract deployed by this well-known dev account.
        assert_eq!(
            addr("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266").create(0),
            addr("0x5fbdb2315678afecb367f032d93f642f64180aa3")
        );
    }

    #[test]
    fn test_create2_address() {
        // EIP-1014 example 0: sender 0x00..00, salt 0, init code 0x00.
        let hash = keccak256(&[0x00]);
        assert_eq!(
            Address::zero().create2(&Word::zero(), &hash),
            addr("0x4d1a2e2bb4f88f0250f26ffff098b0b30b26bf38")
        );
    }
}
