// Daemon Module - long-running HTTP service
//
// `procycla serve` wires an Orchestrator into the ApiServer. The same server
// is embedded by integration tests on an ephemeral port.

pub mod server;

pub use server::ApiServer;
