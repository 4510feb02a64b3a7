//! Domain layer: derived computations and the stateful recovery service.

pub mod recovery_service;
pub mod streak;

pub use recovery_service::RecoveryService;
