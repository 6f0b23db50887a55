//! Application layer containing the payment orchestration logic.
//!
//! This module defines the `PaymentOrchestrator`, the single entry point the
//! front-end uses to pay for an order, a subscription, or a wallet top-up.
//! It talks to the outside world only through the ports in `domain::ports`.

pub mod orchestrator;
