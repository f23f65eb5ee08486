//! The 64-bit service-flag bitset advertised during the peer handshake.

use bitflags::bitflags;

bitflags! {
    /// Capabilities a peer advertises in its `version` message.
    ///
    /// Bit positions follow the standard Bitcoin/Litecoin `NODE_*` constants
    /// so that whitelist masks taken from real deployments (and from the
    /// seeder's own default whitelist, see `seeder_dns::whitelist`) decode
    /// the way operators expect.
    #[derive(Default, serde::Serialize, serde::Deserialize)]
    pub struct ServiceFlags: u64 {
        const NODE_NETWORK          = 0x0000_0001;
        const NODE_GETUTXO          = 0x0000_0002;
        const NODE_BLOOM            = 0x0000_0004;
        const NODE_WITNESS          = 0x0000_0008;
        const NODE_XTHIN            = 0x0000_0010;
        const NODE_COMPACT_FILTERS  = 0x0000_0040;
        const NODE_NETWORK_LIMITED  = 0x0000_0400;
        const NODE_P2P_V2           = 0x0000_0800;
        const NODE_MWEB_LIGHT_CLIENT = 0x0080_0000;
        const NODE_MWEB             = 0x0100_0000;
    }
}

impl ServiceFlags {
    /// True iff every bit set in `mask` is also set in `self` — the
    /// `services & flags == flags` test used to match a peer against a
    /// requested capability set.
    pub fn satisfies(&self, mask: ServiceFlags) -> bool {
        self.bits() & mask.bits() == mask.bits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn satisfies_is_an_and_mask_equality() {
        let services = ServiceFlags::NODE_NETWORK | ServiceFlags::NODE_WITNESS;
        assert!(services.satisfies(ServiceFlags::NODE_NETWORK));
        assert!(!services.satisfies(ServiceFlags::NODE_BLOOM));
    }
}
