//! Generated gRPC types and server/client stubs for `IntrusionDetectionService`
//! (spec §6 "Ingress RPC"). See `proto/intrusion.proto`.

pub mod intrusion {
    tonic::include_proto!("intrusion");
}
