use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const VERI_DECIMALS: u32 = 9;
pub const VERI_BASE_UNIT: u64 = 1_000_000_000; // 10^9

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VeriAmount(u64);

impl VeriAmount {
    pub const ZERO: Self = Self(0);
    pub const MAX_SUPPLY: Self = Self(1_000_000_000 * VERI_BASE_UNIT); // 10^9 VERI

    pub fn from_veri(veri: f64) -> Self {
        Self((veri * VERI_BASE_UNIT as f64) as u64)
    }

    pub fn from_base_units(units: u64) -> Self {
        Self(units)
    }

    pub fn to_veri(&self) -> f64 {
        self.0 as f64 / VERI_BASE_UNIT as f64
    }

    pub fn to_base_units(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(&self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(&self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_add(&self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0).min(Self::MAX_SUPPLY.0))
    }

    pub fn saturating_sub(&self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }
}

impl fmt::Display for VeriAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.9} VERI", self.to_veri())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountAddress([u8; 32]);

impl AccountAddress {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn from_hex(address: &str) -> Result<Self> {
        let stripped = address.strip_prefix("0x").unwrap_or(address);
        let bytes = hex::decode(stripped)?;
        let array: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| anyhow::anyhow!("Address must be 32 bytes, got {}", bytes.len()))?;
        Ok(Self(array))
    }
}

impl fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}..", hex::encode(&self.0[..8]))
    }
}

/// Why a balance movement happened, attached to every transaction record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferReason {
    Genesis,
    BondRefund,
    EscrowAward,
    EscrowRelease,
}

impl fmt::Display for TransferReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransferReason::Genesis => "genesis",
            TransferReason::BondRefund => "bond_refund",
            TransferReason::EscrowAward => "escrow_award",
            TransferReason::EscrowRelease => "escrow_release",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_conversions() {
        let amount = VeriAmount::from_veri(0.5);
        assert_eq!(amount.to_base_units(), 500_000_000);
        assert_eq!(amount.to_veri(), 0.5);
        assert_eq!(VeriAmount::from_base_units(1_000_000_000), VeriAmount::from_veri(1.0));
    }

    #[test]
    fn test_amount_checked_math() {
        let a = VeriAmount::from_veri(0.1);
        let b = VeriAmount::from_veri(0.5);
        assert_eq!(a.checked_add(b), Some(VeriAmount::from_veri(0.6)));
        assert_eq!(a.checked_sub(b), None);
        assert_eq!(b.checked_sub(a), Some(VeriAmount::from_veri(0.4)));
        assert_eq!(a.saturating_sub(b), VeriAmount::ZERO);
    }

    #[test]
    fn test_address_hex_round_trip() {
        let addr = AccountAddress::from_bytes([7u8; 32]);
        let hex = addr.to_hex();
        assert!(hex.starts_with("0x"));
        assert_eq!(AccountAddress::from_hex(&hex).unwrap(), addr);
        assert!(AccountAddress::from_hex("0xdeadbeef").is_err());
    }
}
