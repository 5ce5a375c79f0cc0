// Settings file, config directory and env overrides
pub mod config;

// Token records and on-disk token store
pub mod credentials;

// Authorization Code grant: provider table, redirect listener, token endpoint
pub mod oauth;

// Token broker and authenticated HTTP client
pub mod broker;

// Cursor-paginated list endpoints as streams
pub mod pagination;

// Concurrent fan-out with first-failure cancellation
pub mod parallel;

pub use broker::{AuthenticatedClient, BrokerError, TokenBroker};
pub use credentials::{Token, TokenStore};
pub use oauth::OAuthConfig;
