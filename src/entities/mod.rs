// Entity Models
// Identity persists (numeric id), values change (handle).

pub mod account;

pub use account::{Account, AccountDirectory};
