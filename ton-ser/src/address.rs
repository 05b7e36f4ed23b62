//! Standard internal addresses
//!
//! An address is a workchain id and a 256-bit account id. Two textual forms
//! are accepted:
//!
//! * raw: `0:83dfd552e63729b472fcbcc8c45ebcc6691702558b68ec7527e1ba403a0f31a8`
//! * user-friendly: 48 characters of base64 (standard or url-safe) over
//!   36 bytes `tag | workchain | account id | crc16`.

use crate::builder::CellBuilder;
use crate::deser::{Deserialize, ReadError, Serialize, WriteError};
use crate::slice::CellSlice;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const TAG_BOUNCEABLE: u8 = 0x11;
const TAG_NON_BOUNCEABLE: u8 = 0x51;
const TAG_TESTNET: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    workchain: i8,
    account: [u8; 32],
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid workchain in '{0}'")]
    InvalidWorkchain(String),
    #[error("invalid account id in '{0}'")]
    InvalidAccountId(String),
    #[error("invalid base64 in '{0}'")]
    InvalidBase64(String),
    #[error("user-friendly address must be 36 bytes, got {0}")]
    InvalidLength(usize),
    #[error("unknown address tag {0:#x}")]
    InvalidTag(u8),
    #[error("address checksum mismatch")]
    InvalidChecksum,
}

/// Flags carried by the user-friendly form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FriendlyFlags {
    pub bounceable: bool,
    pub testnet: bool,
}

impl Address {
    pub fn new(workchain: i8, account: [u8; 32]) -> Self {
        Address { workchain, account }
    }

    pub fn workchain(&self) -> i8 {
        self.workchain
    }

    pub fn account(&self) -> &[u8; 32] {
        &self.account
    }

    pub fn to_raw(&self) -> String {
        format!("{}:{}", self.workchain, hex::encode(self.account))
    }

    pub fn to_friendly(&self, flags: FriendlyFlags) -> String {
        let mut bytes = Vec::with_capacity(36);
        let mut tag = if flags.bounceable {
            TAG_BOUNCEABLE
        } else {
            TAG_NON_BOUNCEABLE
        };
        if flags.testnet {
            tag |= TAG_TESTNET;
        }
        bytes.push(tag);
        bytes.push(self.workchain as u8);
        bytes.extend_from_slice(&self.account);
        bytes.extend_from_slice(&crc16(&bytes).to_be_bytes());
        base64::encode_config(bytes, base64::URL_SAFE)
    }

    /// Parse either textual form, returning the flags for the user-friendly one.
    pub fn parse_with_flags(s: &str) -> Result<(Self, Option<FriendlyFlags>), AddressError> {
        let s = s.trim();
        if let Some((wc, account)) = s.split_once(':') {
            let workchain = wc
                .parse::<i8>()
                .map_err(|_| AddressError::InvalidWorkchain(s.to_string()))?;
            let bytes =
                hex::decode(account).map_err(|_| AddressError::InvalidAccountId(s.to_string()))?;
            let account: [u8; 32] = bytes
                .try_into()
                .map_err(|_| AddressError::InvalidAccountId(s.to_string()))?;
            return Ok((Address::new(workchain, account), None));
        }

        let normalized = s.replace('-', "+").replace('_', "/");
        let bytes = base64::decode(normalized)
            .map_err(|_| AddressError::InvalidBase64(s.to_string()))?;
        if bytes.len() != 36 {
            return Err(AddressError::InvalidLength(bytes.len()));
        }
        let expected = u16::from_be_bytes([bytes[34], bytes[35]]);
        if crc16(&bytes[..34]) != expected {
            return Err(AddressError::InvalidChecksum);
        }
        let tag = bytes[0];
        let bounceable = match tag & !TAG_TESTNET {
            TAG_BOUNCEABLE => true,
            TAG_NON_BOUNCEABLE => false,
            _ => return Err(AddressError::InvalidTag(tag)),
        };
        let mut account = [0u8; 32];
        account.copy_from_slice(&bytes[2..34]);
        let flags = FriendlyFlags {
            bounceable,
            testnet: tag & TAG_TESTNET != 0,
        };
        Ok((Address::new(bytes[1] as i8, account), Some(flags)))
    }
}

/// CRC-16/XMODEM, the checksum of user-friendly addresses
fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0u16;
    for &b in data {
        crc ^= (b as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse_with_flags(s).map(|(address, _)| address)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_friendly(FriendlyFlags {
            bounceable: true,
            testnet: false,
        }))
    }
}

/* Ser/De ******************************************************************* */

impl Serialize for Address {
    fn serialize(&self, builder: &mut CellBuilder) -> Result<(), WriteError> {
        builder
            .store_uint(0b10, 2)?
            .store_bit(false)?
            .store_int(self.workchain as i128, 8)?
            .store_bytes(&self.account)?;
        Ok(())
    }
}

impl Deserialize for Address {
    fn deserialize(slice: &mut CellSlice) -> Result<Self, ReadError> {
        let tag = slice.load_uint(2)? as u32;
        if tag != 0b10 {
            return Err(ReadError::UnknownTag(tag));
        }
        if slice.load_bit()? {
            return Err(ReadError::StructureInvalid(
                "anycast addresses are not supported".to_string(),
            ));
        }
        let workchain = slice.load_int(8)? as i8;
        let mut account = [0u8; 32];
        account.copy_from_slice(&slice.load_bytes(32)?);
        Ok(Address::new(workchain, account))
    }
}

#[cfg(any(test, feature = "property-test-api"))]
mod tests {
    use super::*;
    use quickcheck::{Arbitrary, Gen};

    impl Arbitrary for Address {
        fn arbitrary<G: Gen>(g: &mut G) -> Self {
            let workchain = if bool::arbitrary(g) { 0 } else { -1 };
            let mut account = [0u8; 32];
            for b in account.iter_mut() {
                *b = u8::arbitrary(g);
            }
            Address::new(workchain, account)
        }
    }

}
