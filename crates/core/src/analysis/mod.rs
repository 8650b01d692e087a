pub mod market;
pub mod pacer;
pub mod prompt;
pub mod scheduler;

pub use market::summarize_market;
pub use pacer::{Pacer, PacerPermit};
pub use prompt::Strategy;
pub use scheduler::{
    AnalysisError, AnalysisScheduler, CycleReport, InstrumentFailure, RecomputeBusy,
    RecomputeHandle, TicketStatus,
};
