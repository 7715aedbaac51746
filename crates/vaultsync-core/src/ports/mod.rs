//! Port definitions (trait seams for adapters)
//!
//! The engine depends on these interfaces, never on concrete backends.
//! `vaultsync-blob` implements [`ObjectStore`]; the device registry is an
//! external collaborator of the identity layer and only its read side is
//! modeled here.

pub mod device_registry;
pub mod object_store;

pub use device_registry::DeviceRegistry;
pub use object_store::ObjectStore;
