//! Domain layer: commands, orders, the transaction context and the ports the
//! pipeline talks to.

pub mod command;
pub mod context;
pub mod lock;
pub mod model;
pub mod money;
pub mod order;
pub mod phase;
pub mod ports;
