mod workspace;

pub use workspace::{PlanItem, Workspace};
