//! Async client for DMTF Redfish services.
//!
//! A [`RedfishService`] owns the HTTP transport and credentials for one
//! service. Resources come back as [`Payload`]s, which navigate lazily:
//! following a property or collection member that carries `@odata.id`
//! fetches the referenced resource on demand.
//!
//! # Example
//!
//! ```no_run
//! use futures_util::StreamExt;
//! use redfish::{AuthConfig, CollectionWalker, RedfishService, Result};
//!
//! # async fn example() -> Result<()> {
//! let service = RedfishService::builder("https://10.0.0.5")
//!     .auth(AuthConfig::Session {
//!         username: "root".into(),
//!         password: "calvin".into(),
//!     })
//!     .accept_invalid_certs(true)
//!     .connect()
//!     .await?;
//!
//! let systems = service.payload_by_path("/Systems").await?;
//! let walker = CollectionWalker::new(systems)?;
//! let mut members = Box::pin(walker.iter());
//! while let Some(system) = members.next().await {
//!     let system = system?;
//!     println!("{}", system.get_path("Status/Health").await?.string_value()?);
//! }
//!
//! service.close().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod redfish;

pub use config::{Config, ServiceConfig};
pub use error::{RedfishError, Result};
pub use redfish::{
    AuthConfig, AuthManager, ChassisType, CollectionWalker, Health, IndicatorLed, Payload,
    RedPath, RedfishService, Response, ServiceBuilder, ServiceFlags, ServiceState, Session, State,
    Transport, TransportOptions,
};
