//! spd-clients — talking to the components around SPD.
//!
//! The planner only sees the [`PlanningSources`] trait. [`HttpSources`]
//! implements it over plain HTTP/1.1 (hyper client connections, one per
//! request):
//!
//! | call | request |
//! |---|---|
//! | `performance_profiles` | `GET <performance_profiles.endpoint>` |
//! | `forecast` | `GET <forecasting.endpoint>` |
//! | `current_state` | `GET <scheduler.endpoint>/current-state` |
//! | `trigger_scheduler` | `POST <scheduler.endpoint>/api/states`, once per configuration |

pub mod error;
pub mod schedule;
pub mod sources;
pub mod transport;

pub use error::{ClientError, ClientResult};
pub use schedule::StateToSchedule;
pub use sources::{BoxFuture, HttpSources, PlanningSources};
