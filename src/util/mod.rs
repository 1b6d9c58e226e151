mod keychain;
pub mod logger;

pub use keychain::Keychain;
