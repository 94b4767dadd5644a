//! Network - IPv4 CIDR arithmetic and subnet partitioning
//!
//! Subnets are carved out of the VPC block by adding a fixed number of
//! prefix bits and selecting the Nth block, the same arithmetic as
//! Terraform's `cidrsubnet`.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SizingError;

/// Prefix bits added to the VPC block for every subnet
pub const SUBNET_NEW_BITS: u8 = 8;

/// Block number of the first public subnet
pub const PUBLIC_OFFSET: u32 = 1;

/// Block number of the first private subnet
pub const PRIVATE_OFFSET: u32 = 10;

/// An IPv4 network in CIDR notation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cidr {
    network: Ipv4Addr,
    prefix: u8,
}

impl Cidr {
    /// Build a block, clearing any host bits of `addr`
    pub fn new(addr: Ipv4Addr, prefix: u8) -> Result<Self, String> {
        if prefix > 32 {
            return Err("Prefix length must be between 0 and 32".to_string());
        }
        let network = Ipv4Addr::from(u32::from(addr) & mask(prefix));
        Ok(Self { network, prefix })
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    fn first(&self) -> u32 {
        u32::from(self.network)
    }

    fn last(&self) -> u32 {
        self.first() | !mask(self.prefix)
    }

    /// Compute the `index`th sub-block after adding `new_bits` to the prefix
    pub fn subnet(&self, new_bits: u8, index: u32) -> Result<Cidr, SizingError> {
        let new_prefix = u32::from(self.prefix) + u32::from(new_bits);
        if new_prefix > 32 {
            return Err(SizingError::CidrTooSmall {
                parent: self.to_string(),
                new_bits,
            });
        }
        if u64::from(index) >= 1u64 << new_bits {
            return Err(SizingError::SubnetOutOfRange {
                parent: self.to_string(),
                new_bits,
                index,
            });
        }

        let shift = 32 - new_prefix;
        let offset = if shift == 32 { 0 } else { index << shift };
        Ok(Cidr {
            network: Ipv4Addr::from(self.first() | offset),
            prefix: new_prefix as u8,
        })
    }

    /// Returns true if `other` lies entirely inside this block
    pub fn contains(&self, other: &Cidr) -> bool {
        other.prefix >= self.prefix && other.first() >= self.first() && other.last() <= self.last()
    }

    pub fn overlaps(&self, other: &Cidr) -> bool {
        self.first() <= other.last() && other.first() <= self.last()
    }
}

fn mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

impl FromStr for Cidr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| "CIDR block must be in format x.x.x.x/n".to_string())?;
        let addr: Ipv4Addr = addr
            .parse()
            .map_err(|_| "Invalid IP address in CIDR block".to_string())?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| "Invalid prefix length in CIDR block".to_string())?;
        Cidr::new(addr, prefix)
    }
}

impl TryFrom<String> for Cidr {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Cidr> for String {
    fn from(cidr: Cidr) -> Self {
        cidr.to_string()
    }
}

/// A subnet placed in one availability zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub index: usize,
    pub cidr: Cidr,
    pub availability_zone: String,
}

/// Public and private subnets, one of each per availability zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetPartitions {
    pub public: Vec<Subnet>,
    pub private: Vec<Subnet>,
}

impl SubnetPartitions {
    /// Partition `vpc` across `zones`
    ///
    /// Public blocks start at `PUBLIC_OFFSET`, private blocks at
    /// `PRIVATE_OFFSET`. The zone count is capped so the two ranges
    /// cannot meet.
    pub fn compute(vpc: &Cidr, zones: &[String]) -> Result<Self, SizingError> {
        if zones.is_empty() {
            return Err(SizingError::NoAvailabilityZones);
        }
        let capacity = (PRIVATE_OFFSET - PUBLIC_OFFSET) as usize;
        if zones.len() > capacity {
            return Err(SizingError::TooManyZones {
                zones: zones.len(),
                private_offset: PRIVATE_OFFSET,
            });
        }

        let mut public = Vec::with_capacity(zones.len());
        let mut private = Vec::with_capacity(zones.len());
        for (index, zone) in zones.iter().enumerate() {
            let n = index as u32;
            public.push(Subnet {
                index,
                cidr: vpc.subnet(SUBNET_NEW_BITS, PUBLIC_OFFSET + n)?,
                availability_zone: zone.clone(),
            });
            private.push(Subnet {
                index,
                cidr: vpc.subnet(SUBNET_NEW_BITS, PRIVATE_OFFSET + n)?,
                availability_zone: zone.clone(),
            });
        }

        log::debug!(
            "Partitioned {} into {} public and {} private subnets",
            vpc,
            public.len(),
            private.len()
        );

        Ok(Self { public, private })
    }
}
