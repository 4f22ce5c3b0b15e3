pub mod bst;
pub mod clock;
pub mod config;
pub mod error;
pub mod format;
pub mod net;
pub mod ntp;
pub mod scheduler;
pub mod status;
pub mod traits;
