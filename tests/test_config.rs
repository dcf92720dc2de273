use clap::Parser;
use std::path::PathBuf;
use tunnelgate::cli::Cli;
use tunnelgate::config::{Config, EnvFile, RouterConfig, RoutingRules};
use tunnelgate::error::ConfigError;

fn temp_file(name: &str, contents: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tunnelgate-config-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

const MISSING_ENV_FILE: &str = "/nonexistent/tunnelgate/.env";

#[test]
fn test_config_defaults() {
    let cfg = Config::default();
    assert_eq!(cfg.server.listen_port, 2100);
    assert_eq!(cfg.backends.web_port, 3000);
    assert_eq!(cfg.backends.api_port, 8000);
    assert_eq!(cfg.tunnel.agent_binary, "ngrok");
    assert_eq!(cfg.tunnel.control_plane_url, "https://api.ngrok.com");
    assert_eq!(cfg.tunnel.discovery_attempts, 5);
    assert_eq!(cfg.tunnel.discovery_interval_ms, 1000);
    assert!(!cfg.tunnel.require_public_url);
    assert_eq!(cfg.routing, RoutingRules::default());
}

#[test]
fn test_env_file_parsing() {
    let env = EnvFile::parse(
        "# tunnel credentials\n\
         NGROK_API_KEY=\"abc123\"\n\
         NGROK_AUTH_TOKEN='tok'\n\
         export WEB_PORT=4000\n\
         \n\
         API_PORT = 9000 \n\
         EMPTY=\n",
    );

    assert_eq!(env.get("NGROK_API_KEY").as_deref(), Some("abc123"));
    assert_eq!(env.get("NGROK_AUTH_TOKEN").as_deref(), Some("tok"));
    assert_eq!(env.get("WEB_PORT").as_deref(), Some("4000"));
    assert_eq!(env.get("API_PORT").as_deref(), Some("9000"));
    assert_eq!(env.get("EMPTY"), None);
    assert_eq!(env.get("MISSING"), None);
}

#[test]
fn test_env_file_value_with_equals() {
    let env = EnvFile::parse("NGROK_API_KEY=ab=cd\n");
    assert_eq!(env.get("NGROK_API_KEY").as_deref(), Some("ab=cd"));
}

#[test]
fn test_yaml_config_partial() {
    let path = temp_file(
        "partial.yaml",
        "server:\n  listen_port: 9100\ntunnel:\n  api_key: yaml-key\n  auth_token: yaml-token\n  require_public_url: true\nrouting:\n  api_prefix: /rest\n",
    );

    let cfg = Config::from_yaml_file(&path).unwrap();
    assert_eq!(cfg.server.listen_port, 9100);
    assert_eq!(cfg.backends.web_port, 3000);
    assert_eq!(cfg.tunnel.api_key, "yaml-key");
    assert!(cfg.tunnel.require_public_url);
    assert_eq!(cfg.routing.api_prefix, "/rest");
    assert_eq!(cfg.routing.identity_prefix, "/api/v2");
}

#[test]
fn test_yaml_config_malformed() {
    let path = temp_file("broken.yaml", "server: [not, a, map\n");
    let err = Config::from_yaml_file(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[test]
fn test_yaml_config_missing_file() {
    let err = Config::from_yaml_file(std::path::Path::new("/nonexistent/tunnelgate.yaml"))
        .unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}

#[test]
fn test_validate_requires_credentials() {
    let mut cfg = Config::default();
    assert!(matches!(cfg.validate(), Err(ConfigError::Missing("NGROK_API_KEY"))));

    cfg.tunnel.api_key = "key".to_string();
    assert!(matches!(cfg.validate(), Err(ConfigError::Missing("NGROK_AUTH_TOKEN"))));

    cfg.tunnel.auth_token = "token".to_string();
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_router_config_projection() {
    let mut cfg = Config::default();
    cfg.backends.web_port = 3001;
    cfg.backends.api_port = 8001;
    cfg.tunnel.api_key = "key".to_string();
    cfg.tunnel.auth_token = "token".to_string();

    assert_eq!(
        cfg.router_config(),
        RouterConfig {
            web_port: 3001,
            api_port: 8001,
            api_key: "key".to_string(),
            auth_token: "token".to_string(),
        }
    );
}

#[test]
fn test_resolve_flags_win() {
    let cli = Cli::try_parse_from([
        "tunnelgate",
        "--listen",
        "2200",
        "--web",
        "3100",
        "--api",
        "8100",
        "--key",
        "flag-key",
        "--token",
        "flag-token",
        "--env",
        MISSING_ENV_FILE,
    ])
    .unwrap();

    let cfg = Config::resolve(&cli).unwrap();
    assert_eq!(cfg.server.listen_port, 2200);
    assert_eq!(cfg.backends.web_port, 3100);
    assert_eq!(cfg.backends.api_port, 8100);
    assert_eq!(cfg.tunnel.api_key, "flag-key");
    assert_eq!(cfg.tunnel.auth_token, "flag-token");
}

#[test]
fn test_resolve_falls_back_to_env_file() {
    let env = temp_file(
        "fallback.env",
        "NGROK_API_KEY=\"file-key\"\nNGROK_AUTH_TOKEN=\"file-token\"\nWEB_PORT=3200\nAPI_PORT=8200\n",
    );
    let cli = Cli::try_parse_from([
        "tunnelgate",
        "--web",
        "3300",
        "--env",
        env.to_str().unwrap(),
    ])
    .unwrap();

    let cfg = Config::resolve(&cli).unwrap();
    assert_eq!(cfg.server.listen_port, 2100);
    assert_eq!(cfg.backends.web_port, 3300);
    assert_eq!(cfg.backends.api_port, 8200);
    assert_eq!(cfg.tunnel.api_key, "file-key");
    assert_eq!(cfg.tunnel.auth_token, "file-token");
}

#[test]
fn test_resolve_invalid_port_in_env_file() {
    let env = temp_file(
        "badport.env",
        "NGROK_API_KEY=k\nNGROK_AUTH_TOKEN=t\nAPI_PORT=eighty\n",
    );
    let cli = Cli::try_parse_from([
        "tunnelgate",
        "--web",
        "3000",
        "--env",
        env.to_str().unwrap(),
    ])
    .unwrap();

    let err = Config::resolve(&cli).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidPort { key: "API_PORT", .. }));
}

#[test]
fn test_resolve_missing_credentials() {
    let cli = Cli::try_parse_from([
        "tunnelgate",
        "--token",
        "t",
        "--env",
        MISSING_ENV_FILE,
    ])
    .unwrap();

    if std::env::var("NGROK_API_KEY").is_err() {
        let err = Config::resolve(&cli).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("NGROK_API_KEY")));
    }
}

#[test]
fn test_resolve_layers_yaml_under_flags() {
    let yaml = temp_file(
        "layered.yaml",
        "backends:\n  web_port: 5000\n  api_port: 5001\ntunnel:\n  api_key: yaml-key\n  auth_token: yaml-token\n",
    );
    let cli = Cli::try_parse_from([
        "tunnelgate",
        "--config",
        yaml.to_str().unwrap(),
        "--api",
        "6001",
        "--env",
        MISSING_ENV_FILE,
    ])
    .unwrap();

    let cfg = Config::resolve(&cli).unwrap();
    assert_eq!(cfg.backends.api_port, 6001);
    assert_eq!(cfg.tunnel.api_key, "yaml-key");
    if std::env::var("WEB_PORT").is_err() {
        assert_eq!(cfg.backends.web_port, 5000);
    }
}

#[test]
fn test_debug_output_redacts_credentials() {
    let mut cfg = Config::default();
    cfg.tunnel.api_key = "ak_live_12345".to_string();
    cfg.tunnel.auth_token = "tok_secret_678".to_string();

    for rendered in [format!("{cfg:?}"), format!("{:?}", cfg.router_config())] {
        assert!(!rendered.contains("ak_live_12345"), "{rendered}");
        assert!(!rendered.contains("tok_secret_678"), "{rendered}");
        assert!(rendered.contains("<redacted>"), "{rendered}");
    }

    let unset = format!("{:?}", Config::default().tunnel);
    assert!(unset.contains("<unset>"), "{unset}");
}
