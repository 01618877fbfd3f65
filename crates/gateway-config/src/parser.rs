use crate::{validator, ConfigError, GatewayConfig, Result};
use std::path::Path;

/// Read and parse a gateway configuration file. Validation is separate (see
/// [`crate::validate_config`]) so callers can inspect an invalid config before
/// rejecting it outright.
pub fn parse_config(path: &Path) -> Result<GatewayConfig> {
    let content =
        std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;

    parse_config_from_str(&content)
}

pub fn parse_config_from_str(yaml: &str) -> Result<GatewayConfig> {
    serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Parse and validate in one step; this is what admission should call.
pub fn load_config(path: &Path) -> Result<GatewayConfig> {
    let config = parse_config(path)?;
    validator::validate_config(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let yaml = r#"
listen_addr: "127.0.0.1:9000"
backends:
  - id: fs
    transport: child_process
    command: mcp-fs-server
    args: ["--root", "/tmp"]
"#;
        let config = parse_config_from_str(yaml).expect("valid config");
        assert_eq!(config.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.backends.len(), 1);
        assert_eq!(config.backends[0].id, "fs");
        assert_eq!(config.backends[0].request_timeout_secs, 60);
    }

    #[test]
    fn parses_event_stream_backend_with_token() {
        let yaml = r#"
backends:
  - id: sse1
    transport: event_stream
    url: "https://upstream.example/mcp"
    token:
      token_url: "https://upstream.example/oauth/token"
      client_id: gw
      client_secret: shh
"#;
        let config = parse_config_from_str(yaml).expect("valid config");
        assert_eq!(config.backends.len(), 1);
    }

    #[test]
    fn rejects_invalid_yaml() {
        let yaml = "not: valid: yaml: [[[";
        let result = parse_config_from_str(yaml);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn parse_config_reports_missing_file() {
        let result = parse_config(Path::new("/nonexistent/gateway.yaml"));
        assert!(matches!(result, Err(ConfigError::IoError(_, _))));
    }

    #[test]
    fn load_config_rejects_invalid_backend_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.yaml");
        std::fs::write(
            &path,
            r#"
backends:
  - id: "1bad"
    transport: child_process
    command: mcp-fs-server
"#,
        )
        .unwrap();
        assert!(load_config(&path).is_err());
    }
}
