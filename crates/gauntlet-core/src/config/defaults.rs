//! Default configuration values

/// Default configuration file name (TOML)
pub const DEFAULT_CONFIG_TOML: &str = "gauntlet.toml";

/// Default configuration file name (YAML)
pub const DEFAULT_CONFIG_YAML: &str = "gauntlet.yaml";

/// Get list of config file names to search for
pub fn config_file_names() -> Vec<&'static str> {
    vec![
        DEFAULT_CONFIG_TOML,
        DEFAULT_CONFIG_YAML,
        ".gauntlet.toml",
        ".gauntlet.yaml",
    ]
}

/// Default configuration template
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Gauntlet suite configuration
name = "e2e"

[run]
workers = 4
max_retries = 2
timeout_ms = 300000
backoff_ms = 1000
sample_interval_ms = 1000
skip_unstarted = false
record_events = false

[report]
json = "test-results/gauntlet-report.json"
html = "test-results/gauntlet-report.html"

[[task]]
name = "prometheus-ready"
category = "metrics"
priority = 10
required = true
max_retries = 0
command = "curl -sf http://localhost:9090/-/ready"

[[task]]
name = "grafana-health"
category = "dashboards"
priority = 5
command = "curl -sf http://localhost:3000/api/health"

[[task]]
name = "loki-ready"
category = "logs"
priority = 5
max_retries = 3
command = "curl -sf http://localhost:3100/ready"
"#;
