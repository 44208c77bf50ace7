pub mod policy_control;

pub use policy_control::*;
