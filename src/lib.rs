// lib.rs
// Library surface so integration tests can drive the engine and state layer
// directly, mirroring what main.rs wires into the router.

pub mod billing;
pub mod models;
pub mod routes;
pub mod state;
