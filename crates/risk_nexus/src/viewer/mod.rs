mod protocol;
mod server;

pub use protocol::{
    OutcomeSummary, ViewerRequest, ViewerResponse, ViewerStream, VIEWER_PROTOCOL_VERSION,
};
pub use server::{ViewerServer, ViewerServerConfig, ViewerServerError};
