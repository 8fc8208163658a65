pub mod gateway;
pub mod migrations;
pub mod thought_store;

pub use gateway::{Row, RunResult, StorageGateway};
pub use migrations::{AppliedMigration, MigrationReport, MigrationRunner};
pub use thought_store::{DigestWindow, NewThought, Thought, ThoughtStore};
