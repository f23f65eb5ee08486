//! The set of service-flag masks a DNS client may request via the
//! `x<HEX>.<host>` subdomain convention.

use std::collections::HashSet;

use seeder_chain::ServiceFlags;

#[derive(Clone, Debug, Default)]
pub struct Whitelist {
    masks: HashSet<u64>,
}

impl Whitelist {
    pub fn new(masks: impl IntoIterator<Item = ServiceFlags>) -> Self {
        Whitelist {
            masks: masks.into_iter().map(|f| f.bits()).collect(),
        }
    }

    pub fn allows(&self, flags: ServiceFlags) -> bool {
        self.masks.contains(&flags.bits())
    }

    pub fn len(&self) -> usize {
        self.masks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ServiceFlags> + '_ {
        self.masks.iter().map(|&bits| ServiceFlags::from_bits_truncate(bits))
    }

    /// The whitelist installed when `-w` isn't given, transcribed
    /// one-for-one from `main.cpp`'s `filter_whitelist.insert(...)` block
    /// (two of its 28 inserts repeat a combination already in the list,
    /// which a `HashSet` absorbs the same way `std::set` does, leaving 26
    /// distinct masks).
    pub fn default_masks() -> Self {
        use ServiceFlags as F;
        Whitelist::new([
            F::NODE_NETWORK,                                                                    // 0x1
            F::NODE_NETWORK | F::NODE_BLOOM,                                                     // 0x5
            F::NODE_NETWORK | F::NODE_WITNESS,                                                   // 0x9
            F::NODE_NETWORK | F::NODE_MWEB,                                                      // 0x1000000
            F::NODE_NETWORK | F::NODE_WITNESS | F::NODE_MWEB,                                    // 0x1000009
            F::NODE_NETWORK | F::NODE_WITNESS | F::NODE_COMPACT_FILTERS,                         // 0x49
            F::NODE_NETWORK | F::NODE_WITNESS | F::NODE_COMPACT_FILTERS | F::NODE_MWEB,          // 0x1000049
            F::NODE_NETWORK
                | F::NODE_WITNESS
                | F::NODE_COMPACT_FILTERS
                | F::NODE_MWEB
                | F::NODE_MWEB_LIGHT_CLIENT,                                                     // 0x1800049
            F::NODE_NETWORK | F::NODE_WITNESS | F::NODE_P2P_V2,                                  // 0x809
            F::NODE_NETWORK | F::NODE_WITNESS | F::NODE_P2P_V2 | F::NODE_COMPACT_FILTERS,        // 0x849
            F::NODE_NETWORK
                | F::NODE_WITNESS
                | F::NODE_P2P_V2
                | F::NODE_COMPACT_FILTERS
                | F::NODE_MWEB,                                                                  // 0x1000849
            F::NODE_NETWORK
                | F::NODE_WITNESS
                | F::NODE_P2P_V2
                | F::NODE_COMPACT_FILTERS
                | F::NODE_MWEB
                | F::NODE_MWEB_LIGHT_CLIENT,                                                     // 0x1800849
            F::NODE_NETWORK | F::NODE_WITNESS | F::NODE_BLOOM,                                   // 0xd
            F::NODE_NETWORK_LIMITED,                                                             // 0x400
            F::NODE_NETWORK_LIMITED | F::NODE_MWEB,                                              // 0x1000400
            F::NODE_NETWORK_LIMITED | F::NODE_BLOOM,                                              // 0x404
            F::NODE_NETWORK_LIMITED | F::NODE_WITNESS,                                           // 0x408
            F::NODE_NETWORK_LIMITED | F::NODE_WITNESS | F::NODE_MWEB,                            // 0x1000408
            F::NODE_NETWORK_LIMITED | F::NODE_WITNESS | F::NODE_COMPACT_FILTERS,                 // 0x448
            F::NODE_NETWORK_LIMITED
                | F::NODE_WITNESS
                | F::NODE_COMPACT_FILTERS
                | F::NODE_MWEB,                                                                  // 0x1000448
            F::NODE_NETWORK_LIMITED
                | F::NODE_WITNESS
                | F::NODE_COMPACT_FILTERS
                | F::NODE_MWEB
                | F::NODE_MWEB_LIGHT_CLIENT,                                                     // 0x1800448
            F::NODE_NETWORK_LIMITED | F::NODE_WITNESS | F::NODE_P2P_V2,                          // 0xc08
            F::NODE_NETWORK_LIMITED | F::NODE_WITNESS | F::NODE_P2P_V2 | F::NODE_COMPACT_FILTERS, // 0xc48
            F::NODE_NETWORK_LIMITED
                | F::NODE_WITNESS
                | F::NODE_P2P_V2
                | F::NODE_COMPACT_FILTERS
                | F::NODE_MWEB,                                                                  // 0x1000c48
            F::NODE_NETWORK_LIMITED
                | F::NODE_WITNESS
                | F::NODE_P2P_V2
                | F::NODE_COMPACT_FILTERS
                | F::NODE_MWEB
                | F::NODE_MWEB_LIGHT_CLIENT,                                                     // 0x1800c48
            F::NODE_NETWORK_LIMITED | F::NODE_WITNESS | F::NODE_BLOOM,                           // 0x40c
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_whitelist_allows_plain_network_but_not_getutxo() {
        let whitelist = Whitelist::default_masks();
        assert!(whitelist.allows(ServiceFlags::NODE_NETWORK));
        assert!(!whitelist.allows(ServiceFlags::NODE_GETUTXO));
    }

    #[test]
    fn default_whitelist_matches_the_common_example_masks() {
        let whitelist = Whitelist::default_masks();
        assert!(whitelist.allows(ServiceFlags::from_bits_truncate(0x400)));
        assert!(whitelist.allows(ServiceFlags::from_bits_truncate(0x1800049)));
    }

    #[test]
    fn default_whitelist_has_twenty_six_distinct_masks() {
        // main.cpp lists 28 inserts into a set; two repeat a combination
        // already present, so the installed set has 26 members.
        assert_eq!(Whitelist::default_masks().len(), 26);
    }

    #[test]
    fn default_whitelist_does_not_combine_network_and_network_limited() {
        // main.cpp never installs a mask with both NODE_NETWORK and
        // NODE_NETWORK_LIMITED set; a peer reporting 0x409 (spec §8
        // scenario 1) is selectable via `ReputationDb::get_ips` directly,
        // but a DNS client requesting exactly that mask gets NODATA.
        let whitelist = Whitelist::default_masks();
        assert!(!whitelist.allows(ServiceFlags::from_bits_truncate(0x409)));
    }
}
