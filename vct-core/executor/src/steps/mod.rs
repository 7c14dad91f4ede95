//! 内置步骤

pub mod dm12;
pub mod key_state;

pub use dm12::Dm12ActiveDtcStep;
pub use key_state::{KeyOffIntervalStep, KeyStateStep};
