pub mod clock;
pub mod credentials;
pub mod lockout;
pub mod service;
pub mod session;

pub use clock::{Clock, ManualClock, SystemClock};
pub use credentials::CredentialStore;
pub use lockout::{LockoutPolicy, LockoutTracker};
pub use service::{AuthPolicy, AuthService};
pub use session::{SessionStore, DEFAULT_TOKEN_TTL};
