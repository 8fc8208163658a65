pub mod client;
pub mod digest;

pub use client::{Delivery, Notifier, OpenClawClient, SendOptions};
pub use digest::{DigestDelivery, DigestJob, DigestReport, cron_jobs, format_digest};
