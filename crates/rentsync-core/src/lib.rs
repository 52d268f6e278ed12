pub mod agreement;
pub mod projector;
pub mod reconcile;
pub mod record;
pub mod resolver;
pub mod segment;
pub mod window;

pub use agreement::{
    AccountScope, Agreement, AgreementStatus, Classified, Customer, ExternalAccount,
    StatusPartition, Vehicle, classify,
};
pub use projector::{Ineligibility, Projection, SkipList, SkippedAgreement, project};
pub use reconcile::{ReconcilePlan, ReconcileStats, reconcile};
pub use record::{CanonicalRecord, CompositeKey, normalize_plate};
pub use resolver::AccountResolver;
pub use segment::month_segments;
pub use window::{SyncWindow, WindowError};
