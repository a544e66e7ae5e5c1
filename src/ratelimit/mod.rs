//! Rate limiting logic and state management.

mod clock;
mod key;
mod limiter;
mod policy;
mod record;
mod rules;
mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use key::LimitKey;
pub use limiter::RateLimiter;
pub use policy::Policy;
pub use record::{Decision, RateRecord};
pub use rules::{PolicySet, RouteRule, RulesDocument};
pub use sweeper::{spawn_sweeper, DEFAULT_SWEEP_INTERVAL};
