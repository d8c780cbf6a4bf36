pub mod accumulator;
pub mod framer;
pub mod session;
pub mod transport;

pub use self::framer::LineFramer;
pub use self::session::StreamSession;
pub use self::transport::{ ChatTransport, ChunkStream, HttpTransport, TransportConfig };
