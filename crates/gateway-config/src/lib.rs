//! # gateway-config
//!
//! Configuration types and one-shot admission validation for the MCP federation
//! gateway. There is deliberately no file-watching or hot-reload here: a
//! [`GatewayConfig`] is parsed and validated once, then handed to the registry.
//!
//! ## Quick Start
//!
//! ```rust
//! use gateway_config::{parse_config_from_str, validate_config};
//!
//! let yaml = r#"
//! backends:
//!   - id: fs
//!     transport: child_process
//!     command: mcp-fs-server
//!     args: ["--root", "/tmp"]
//! "#;
//!
//! let config = parse_config_from_str(yaml).expect("valid config");
//! validate_config(&config).expect("validation passes");
//!
//! assert_eq!(config.backends.len(), 1);
//! assert_eq!(config.backends[0].id, "fs");
//! ```
//!
//! ## Validation Rules
//!
//! - Backend identifiers must be unique, letter-led, and match
//!   `^[A-Za-z][A-Za-z0-9_-]{0,63}$`
//! - Child-process environment overlay keys must be valid shell identifiers
//! - `request_timeout_secs` and `max_retries` are bounded

pub mod error;
pub mod parser;
pub mod types;
pub mod validator;

pub use error::{ConfigError, Result};
pub use parser::{load_config, parse_config, parse_config_from_str};
pub use types::*;
pub use validator::{validate_backend, validate_config};
