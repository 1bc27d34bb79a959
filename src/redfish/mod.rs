pub mod auth;
pub mod collection;
pub mod entities;
pub mod payload;
pub mod redpath;
pub mod service;
pub mod transport;

pub use auth::{AuthConfig, AuthManager, Session};
pub use collection::CollectionWalker;
pub use entities::{ChassisType, Health, IndicatorLed, State};
pub use payload::Payload;
pub use redpath::RedPath;
pub use service::{RedfishService, ServiceBuilder, ServiceFlags, ServiceState};
pub use transport::{Response, Transport, TransportOptions};
