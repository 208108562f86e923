//! gRPC surface.

mod convert;
mod server;

pub use server::MailServiceGrpc;

/// Generated protocol types.
pub mod proto {
    tonic::include_proto!("mailgateway.v1");
}
