pub mod classifier;
pub mod engine;
pub mod preset;
pub mod prober;
pub mod result;

pub use classifier::{classify_connect_error, classify_error, ErrorKind};
pub use engine::{is_acceptable_status, ConfirmationEngine, TCP_RESPONSIVE_MESSAGE};
pub use preset::SensitivityPreset;
pub use prober::{
    HttpMethod, HttpProbeOutcome, HttpProbeRequest, HttpProbeResponse, NetworkProber, ProbeError,
    ProbeFailure, Prober, TcpProbeOutcome,
};
pub use result::{ProbeType, RetryAttempt, RetryResult};
