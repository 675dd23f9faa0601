//! Outbound SMS abstractions (Twilio today; other carriers behind the same port).

pub mod dry_run;
pub mod port;
pub mod throttled;
pub mod types;
