pub mod config;
pub mod dates;
pub mod drag;
pub mod engine;
pub mod error;
pub mod logging;
pub mod model;
pub mod reconcile;
pub mod remote;
pub mod render;
pub mod sync;
pub mod undo;
pub mod window;

pub use config::{ConfigLoader, ConfigPaths, EngineConfig};
pub use engine::{Engine, EngineAction};
pub use error::{EngineError, EngineResult, IntegrityError, StoreError};
pub use model::{DateEntry, DateLabel, DateRange, PlanDate, PlanId, PlanRecord, PlanStyle};
pub use remote::{MemoryStore, RemoteStore, SqliteStore};
