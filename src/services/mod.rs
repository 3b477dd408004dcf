//! Dienste für MHF
//!
//! Geschäftslogik zwischen Datenbank und Oberfläche: die Zugriffsfassade,
//! Replikation, Editor und Dateiformate.

pub mod cache;
pub mod data_access;
pub mod editor;
pub mod events;
pub mod exchange;
pub mod liveness;
pub mod replication;
pub mod session;

pub use cache::Lookups;
pub use data_access::{DataAccess, ReplicationStatus};
pub use editor::QuestionnaireEditor;
pub use events::{ChangeBus, ChangeEvent};
pub use exchange::{export_questionnaire, import_questionnaire};
pub use liveness::LivenessProbe;
pub use replication::{resync_table, DirtyTables, Replication};
pub use session::SessionFile;
