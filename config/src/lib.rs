//! Gateway configuration: YAML loading with environment substitution, and a debounced
//! file watcher that emits reload events to the Channel Manager.

mod load;
mod model;
mod watch;

pub use load::{
    load, load_str, resolve_path, ConfigError, AUTH_TOKEN_ENV, CONFIG_PATH_ENV, HOST_ENV, PORT_ENV,
};
pub use model::{AuthConfig, ChannelConfig, GatewayConfig, GatewaySection, RateLimitConfig, SessionConfig};
pub use watch::ConfigWatcher;
