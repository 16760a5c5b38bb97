use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub mod address;
pub mod error;
pub mod hash;
pub mod word;

pub use address::Address;
pub use word::Word;

/// Byte buffer that renders as hex in debug output and serialized forms.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Hex(pub Vec<u8>);

impl From<Vec<u8>> for Hex {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl<const N: usize> From<[u8; N]> for Hex {
    fn from(value: [u8; N]) -> Self {
        Self(value.to_vec())
    }
}

impl std::fmt::Debug for Hex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl std::fmt::Display for Hex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl Serialize for Hex {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(&self.0)))
    }
}

impl<'de> Deserialize<'de> for Hex {
    fn deserialize<D>(deserializer: D) -> Result<Hex, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;

        let hex: &str = Deserialize::deserialize(deserializer)?;
        let bin = hex::decode(hex.trim_start_matches("0x")).map_err(|_| {
            D::Error::invalid_value(serde::de::Unexpected::Str(hex), &"Invalid hex string")
        })?;
        Ok(Hex(bin))
    }
}

/// Const hex decoder for literals in tests and fixtures; right-aligned into N
/// bytes, accepts an optional 0x prefix and odd digit counts.
pub(crate) const fn decode<const N: usize>(s: &str) -> [u8; N] {
    let s = s.as_bytes();
    let mut b = [0u8; N];
    let mut n = s.len();
    let parity = s.len() % 2;

    if s.is_empty() {
        return b;
    }
    let min = if s[0] == b'0' && s.len() > 1 && s[1] == b'x' {
        2
    } else {
        0
    };

    let mut i = N;
    while n > min {
        let c = s[n - 1];
        let c = match c {
            b'0'..=b'9' => c - b'0',
            b'a'..=b'f' => c - b'a' + 10,
            b'A'..=b'F' => c - b'A' + 10,
            _ => panic!("Invalid hex"),
        };

        if n % 2 == parity {
            b[i - 1] = c;
        } else {
            b[i - 1] += c << 4;
            i -= 1;
        }

        n -= 1;
    }
    b
}
