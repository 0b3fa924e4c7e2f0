//! Parallel JSON analysis service.
//!
//! Reads analysis requests, one JSON object per line, expands each into the
//! turns it asks about and searches them on a [`SessionPool`]. Results,
//! warnings and errors are written back as one JSON object per line.
//!
//! - [`request`]: request parsing and validation
//! - [`response`]: result, warning and error records
//! - [`pool`]: worker sessions and the output writer
//! - [`config`]: CLI and config.toml settings

pub mod config;
pub mod pool;
pub mod request;
pub mod response;

pub use config::Config;
pub use pool::{PoolConfig, PoolError, SessionPool};
pub use request::{
    parse_request_line, AnalysisRequest, ParsedRequest, Perspective, RequestDefaults, RequestError, RequestOverrides,
    RequestWarning,
};
pub use response::{AnalysisResult, MoveInfoRecord, OutputRecord};
