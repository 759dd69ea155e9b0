pub mod analysis;
pub mod credentials;
pub mod job_store;
pub mod locks;
pub mod models;
pub mod notifications;
pub mod orchestrator;
pub mod report;
pub mod retry;
pub mod servers;
pub mod workers;

pub use credentials::{Credentials, CredentialsPresence, CredentialsService};
pub use job_store::JobStore;
pub use models::{Job, JobId, JobStatus, JobType, LogReference};
pub use orchestrator::Orchestrator;
pub use report::Report;
pub use workers::JobRequest;
