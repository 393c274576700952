//! Asset inventory: typed snapshots with authoritative bulk replacement.

pub mod api;
pub mod models;
pub mod store;

pub use models::{
    AssetInventoryOverview, AssetRecord, AssetStateResponse, HardwareInventory, InventorySnapshot,
    LocalGroup, LocalGroupsInventory, LocalUser, LocalUsersInventory, OsInventory,
    SoftwareInventory, SoftwareItem,
};
pub use store::InventoryStore;
