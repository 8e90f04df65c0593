//! Policy inputs to the coordination subsystem: the activation thresholds the
//! collector retunes at runtime, and the survivor rate statistics that inform
//! its pacing decisions.

pub mod surv_rate;
pub mod thresholds;
