use std::fmt;
use std::str::FromStr;

use rand_core::CryptoRngCore;
use rsa::BigUint;
use x509_cert::serial_number::SerialNumber;

use crate::error::CaError;

/// Number of random bytes behind a serial number (128 bits).
pub const SERIAL_SIZE: usize = 16;

/// Certificate serial number: an unsigned integer, stored as a decimal string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Serial(BigUint);

impl Serial {
    /// Draws [`SERIAL_SIZE`] bytes from `rng`. Uniqueness is probabilistic only.
    pub fn generate(rng: &mut dyn CryptoRngCore) -> Self {
        let mut payload = [0u8; SERIAL_SIZE];
        rng.fill_bytes(&mut payload);
        Serial(BigUint::from_bytes_be(&payload))
    }

    pub fn from_u128(value: u128) -> Self {
        Serial(BigUint::from_bytes_be(&value.to_be_bytes()))
    }

    /// Big-endian magnitude without leading zeros (`[0]` for zero).
    pub fn to_bytes_be(&self) -> Vec<u8> {
        self.0.to_bytes_be()
    }

    /// DER serial number as used in certificates and revocation entries.
    pub fn to_x509(&self) -> Result<SerialNumber, CaError> {
        SerialNumber::new(&self.to_bytes_be())
            .map_err(|e| CaError::EncodingError(format!("serial number: {e}")))
    }

    pub fn from_x509(serial: &SerialNumber) -> Self {
        Serial(BigUint::from_bytes_be(serial.as_bytes()))
    }
}

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_str_radix(10))
    }
}

impl FromStr for Serial {
    type Err = CaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CaError::InvalidInput(format!("not a decimal serial: {s:?}")));
        }
        BigUint::parse_bytes(s.as_bytes(), 10)
            .map(Serial)
            .ok_or_else(|| CaError::InvalidInput(format!("not a decimal serial: {s:?}")))
    }
}
