//! Servicemap Core — shared event-sourcing abstractions.
//!
//! This crate defines the event envelope, the event feed contract and the
//! error and clock types every other crate depends on. It contains no
//! infrastructure code.

pub mod clock;
pub mod error;
pub mod event;
pub mod repository;
