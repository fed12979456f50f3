pub mod client;
pub mod server;
pub mod thread;

pub use client::GrpcTransport;
pub use server::ChordGrpcServer;
pub use thread::GrpcThread;
