// Models module - license key records

pub mod license_key;

pub use license_key::{KeyRecord, KeyStatus};
