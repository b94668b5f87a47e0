//! Application layer containing the orchestration logic.
//!
//! Commands enter through the [`bus::CommandBus`], which hands each one to the
//! handler registered for its operation. Handlers run a [`activity::Pipeline`] of
//! phase activities over a context they own for the duration of the call.

pub mod activities;
pub mod activity;
pub mod bus;
pub mod handlers;
pub mod redrive;
pub mod sequence;
pub mod wiring;
