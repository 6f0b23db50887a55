//! Domain model: value objects, the attempt lifecycle, and the ports the
//! orchestrator talks through.

pub mod intent;
pub mod ports;
pub mod session;
pub mod state;
pub mod verification;
pub mod wallet;
