pub mod fetcher;
pub mod pools;

pub use self::fetcher::{Fetcher, FetchResult, ReqwestTransport, Transport, TransportError};
pub use self::pools::{ProxyPool, UserAgentPool};
