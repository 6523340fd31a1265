//! Deterministic request-id to VM/IP allocation.
//!
//! The request id doubles as the provisioning VMID and as the offset into the
//! internal instance network. The mapping is a pure function of the id: it is
//! recomputed on every use and never stored independently, so the stored row
//! and the derived resources cannot drift apart.

use std::net::Ipv4Addr;

use thiserror::Error;

/// Ids at or below this value are reserved for infrastructure and templates.
/// The request id sequence is seeded to start above it (see the daemon's
/// initial migration), so allocated addresses never collide with
/// pre-existing hosts.
pub const SEQUENCE_FLOOR: i64 = 200;

/// Allocation failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AllocError {
    #[error("request id {0} is at or below the reserved sequence floor {SEQUENCE_FLOOR}")]
    BelowFloor(i64),

    #[error("request id {0} is outside the allocatable address space")]
    AddressSpaceExhausted(i64),
}

/// Resources derived from a request id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    /// Identifier handed to the provisioner; equal to the request id.
    pub vmid: i64,
    /// Internal address of the instance.
    pub ip: Ipv4Addr,
}

/// Maps request ids onto VMIDs and internal addresses.
#[derive(Debug, Clone, Copy)]
pub struct Allocator {
    base_network: Ipv4Addr,
}

impl Allocator {
    /// Create an allocator rooted at the given base network address
    /// (e.g. `10.0.10.0`).
    pub const fn new(base_network: Ipv4Addr) -> Self {
        Self { base_network }
    }

    /// Derive the VMID and internal IP for a request id.
    ///
    /// `vmid = id`; `ip = base_network + (id - SEQUENCE_FLOOR)` in plain
    /// u32 address arithmetic. Injective for all ids above the floor: two
    /// distinct ids can never share an address.
    pub fn allocate(&self, id: i64) -> Result<Allocation, AllocError> {
        if id <= SEQUENCE_FLOOR {
            return Err(AllocError::BelowFloor(id));
        }
        let offset =
            u32::try_from(id - SEQUENCE_FLOOR).map_err(|_| AllocError::AddressSpaceExhausted(id))?;
        let addr = u32::from(self.base_network)
            .checked_add(offset)
            .ok_or(AllocError::AddressSpaceExhausted(id))?;

        Ok(Allocation {
            vmid: id,
            ip: Ipv4Addr::from(addr),
        })
    }
}
