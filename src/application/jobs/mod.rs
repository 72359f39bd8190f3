mod dispatch;

pub use dispatch::{
    DispatchJobContext, DispatchScheduler, ScheduledDispatch, ScheduledJob,
    process_scheduled_dispatch,
};
