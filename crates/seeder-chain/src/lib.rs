//! Shared address and wire-serialization types for the peer-discovery
//! seeder: IPv4/IPv6/onion endpoints, the service-flag bitset, and the
//! `addr`-message codec the prober and reputation database both depend on.

pub mod addr;
pub mod endpoint;
pub mod error;
pub mod serialization;
pub mod services;

pub use addr::{parse_addr_list, write_addr_list, AddrEntry, MAX_PROTOCOL_MESSAGE_LEN};
pub use endpoint::{Address, Endpoint, Network};
pub use error::SerializationError;
pub use serialization::{ReadWireExt, TrustedPreallocate, WireDeserialize, WireSerialize, WriteWireExt};
pub use services::ServiceFlags;
