//! gRPC tool server
//!
//! Exposes the Tool Gateway as the `OpsService`, so the same three container
//! operations can be called by the triage controller (via `RpcGateway`) and by
//! a human operator (via the `sentinel-ops` CLI).

pub mod server;

pub mod ops {
    tonic::include_proto!("sentinel.ops");
}

pub use server::OpsServer;
