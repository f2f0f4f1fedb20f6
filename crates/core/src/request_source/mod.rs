//! Request source: the remote API that lists open requests and accepts
//! challenge and proof publications.

mod http;
mod types;

pub use http::{HttpRequestSource, RequestSourceConfig};
pub use types::{
    ChallengePayload, OpenRequests, OutputPayload, Proof, RequestSource, RequestSourceError,
    SupplyReport,
};
