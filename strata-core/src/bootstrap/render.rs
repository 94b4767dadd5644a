//! Render - Turn a pipeline into a host bootstrap script
//!
//! Rendering is a pure formatting step. The output contains no timestamps
//! or random identifiers; times only appear in log lines the script
//! produces when it runs.

use std::path::Path;

use crate::bootstrap::pipeline::{
    ConfigBody, ConfigFile, HealthCheckSpec, HealthTarget, Pipeline, Probe, PROBE_TIMEOUT_SECS,
    RestartPolicy, Unit,
};
use crate::error::RenderError;

/// Rendering options
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Directory receiving systemd unit files
    pub unit_dir: String,
    /// Runtime log of the bootstrap run
    pub log_file: String,
    /// Terminator of the quoted here-documents
    pub heredoc_marker: String,
    /// Number of spaces per indentation level
    pub indent_size: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            unit_dir: "/etc/systemd/system".to_string(),
            log_file: "/var/log/strata-bootstrap.log".to_string(),
            heredoc_marker: "STRATA_EOF".to_string(),
            indent_size: 4,
        }
    }
}

impl RenderConfig {
    fn indent(&self, level: usize) -> String {
        " ".repeat(self.indent_size * level)
    }
}

/// Render `pipeline` as a bash bootstrap script
pub fn render_pipeline(pipeline: &Pipeline, config: &RenderConfig) -> Result<String, RenderError> {
    let mut out = String::new();
    let units = pipeline.units();

    let names: Vec<&str> = units.iter().map(|u| u.name).collect();
    line(&mut out, "#!/bin/bash");
    line(
        &mut out,
        &format!(
            "# strata host bootstrap: {} ({}) in {}",
            pipeline.project_name, pipeline.environment, pipeline.region
        ),
    );
    line(&mut out, &format!("# Units: {}", names.join(", ")));
    line(&mut out, "set -uo pipefail");
    out.push('\n');
    line(&mut out, &format!("LOG_FILE={}", config.log_file));
    line(&mut out, &format!("PROBE_TIMEOUT={}", PROBE_TIMEOUT_SECS));
    line(&mut out, "FAILED_UNITS=()");
    out.push('\n');
    line(&mut out, "log() {");
    line(
        &mut out,
        &format!(
            "{}echo \"$(date -u +%Y-%m-%dT%H:%M:%SZ) [strata] $*\" | tee -a \"$LOG_FILE\"",
            config.indent(1)
        ),
    );
    line(&mut out, "}");
    out.push('\n');
    line(&mut out, "record_failure() {");
    line(&mut out, &format!("{}FAILED_UNITS+=(\"$1\")", config.indent(1)));
    line(&mut out, &format!("{}log \"WARN $1: $2\"", config.indent(1)));
    line(&mut out, "}");
    out.push('\n');
    write_probe_functions(&mut out, config);
    line(
        &mut out,
        &format!(
            "log \"Bootstrapping {} ({}) in {}\"",
            pipeline.project_name, pipeline.environment, pipeline.region
        ),
    );

    let mut previous: Option<&Unit> = None;
    for (i, unit) in units.iter().enumerate() {
        out.push('\n');
        write_unit(&mut out, unit, previous, i + 1, units.len(), config)?;
        previous = Some(unit);
    }

    out.push('\n');
    line(&mut out, "# --- Health summary ---");
    write_checks(&mut out, &pipeline.health_targets(), 0, config);
    line(
        &mut out,
        "log \"Bootstrap finished: ${HEALTHY}/${TOTAL} units healthy\"",
    );
    line(&mut out, "if [ \"${#FAILED_UNITS[@]}\" -gt 0 ]; then");
    line(
        &mut out,
        &format!(
            "{}log \"Units reporting errors: ${{FAILED_UNITS[*]}}\"",
            config.indent(1)
        ),
    );
    line(&mut out, "fi");
    line(&mut out, "exit 0");

    Ok(out)
}

fn line(out: &mut String, text: &str) {
    out.push_str(text);
    out.push('\n');
}

fn write_probe_functions(out: &mut String, config: &RenderConfig) {
    let ind = config.indent(1);
    line(out, "probe_http() {");
    line(
        out,
        &format!(
            "{}curl --silent --fail --max-time \"$PROBE_TIMEOUT\" --output /dev/null \"$1\"",
            ind
        ),
    );
    line(out, "}");
    out.push('\n');
    line(out, "probe_tcp() {");
    line(
        out,
        &format!(
            "{}timeout \"$PROBE_TIMEOUT\" bash -c \"exec 3<>/dev/tcp/$1/$2\" 2>/dev/null",
            ind
        ),
    );
    line(out, "}");
    out.push('\n');
}

fn write_unit(
    out: &mut String,
    unit: &Unit,
    previous: Option<&Unit>,
    position: usize,
    total: usize,
    config: &RenderConfig,
) -> Result<(), RenderError> {
    let ind = config.indent(1);
    line(
        out,
        &format!(
            "# --- [{}/{}] {}: {} ---",
            position, total, unit.name, unit.description
        ),
    );

    if !unit.install.is_empty() {
        line(out, &format!("log \"Installing {}\"", unit.name));
        line(out, "if ! (");
        line(out, &format!("{}set -e", ind));
        for command in &unit.install {
            line(out, &format!("{}{}", ind, command));
        }
        line(out, "); then");
        line(
            out,
            &format!("{}record_failure {} \"installation failed\"", ind, unit.name),
        );
        line(out, "fi");
    }

    if let Some(file) = &unit.config {
        let body = encode_config(unit.name, file, config)?;
        if let Some(dir) = Path::new(&file.path).parent() {
            line(out, &format!("mkdir -p {}", dir.display()));
        }
        write_heredoc(out, unit.name, &file.path, &body, config)?;
        line(out, &format!("chmod {:04o} {}", file.mode, file.path));
    }

    let unit_path = format!("{}/{}", config.unit_dir, unit.service_name());
    write_heredoc(out, unit.name, &unit_path, &systemd_unit(unit, previous), config)?;
    line(out, "systemctl daemon-reload");
    line(
        out,
        &format!("if ! systemctl enable --now {}; then", unit.service_name()),
    );
    line(
        out,
        &format!("{}record_failure {} \"failed to start\"", ind, unit.name),
    );
    line(out, "fi");
    Ok(())
}

/// Write `body` to `path` through a quoted here-document
///
/// Fails if any body line equals the terminator.
fn write_heredoc(
    out: &mut String,
    unit: &str,
    path: &str,
    body: &str,
    config: &RenderConfig,
) -> Result<(), RenderError> {
    if body.lines().any(|l| l == config.heredoc_marker) {
        return Err(RenderError::Encoding {
            unit: unit.to_string(),
            message: format!(
                "{} contains the heredoc terminator {}",
                path, config.heredoc_marker
            ),
        });
    }
    line(
        out,
        &format!("cat > {} <<'{}'", path, config.heredoc_marker),
    );
    out.push_str(body);
    if !body.ends_with('\n') {
        out.push('\n');
    }
    line(out, &config.heredoc_marker);
    Ok(())
}

/// Supervisor declaration for one unit
pub fn systemd_unit(unit: &Unit, previous: Option<&Unit>) -> String {
    let mut text = String::new();
    line(&mut text, "[Unit]");
    line(&mut text, &format!("Description={}", unit.description));
    match previous {
        Some(prev) => line(
            &mut text,
            &format!("After=network-online.target {}", prev.service_name()),
        ),
        None => line(&mut text, "After=network-online.target"),
    }
    line(&mut text, "Wants=network-online.target");
    line(&mut text, "StartLimitIntervalSec=0");
    text.push('\n');
    line(&mut text, "[Service]");
    if let Some(ConfigFile {
        path,
        body: ConfigBody::Environment(_),
        ..
    }) = &unit.config
    {
        line(&mut text, &format!("EnvironmentFile={}", path));
    }
    for command in &unit.exec_start_pre {
        line(&mut text, &format!("ExecStartPre={}", command));
    }
    line(&mut text, &format!("ExecStart={}", unit.exec_start));
    match unit.restart {
        RestartPolicy::Always { backoff_secs } => {
            line(&mut text, "Restart=always");
            line(&mut text, &format!("RestartSec={}", backoff_secs));
        }
    }
    text.push('\n');
    line(&mut text, "[Install]");
    line(&mut text, "WantedBy=multi-user.target");
    text
}

fn encode_config(
    unit: &str,
    file: &ConfigFile,
    config: &RenderConfig,
) -> Result<String, RenderError> {
    let encoding = |message: String| RenderError::Encoding {
        unit: unit.to_string(),
        message,
    };

    let body = match &file.body {
        ConfigBody::Prometheus(doc) => {
            serde_yaml::to_string(doc).map_err(|e| encoding(e.to_string()))?
        }
        ConfigBody::Xray(doc) => serde_yaml::to_string(doc).map_err(|e| encoding(e.to_string()))?,
        ConfigBody::LogForwarder(doc) => {
            serde_json::to_string_pretty(doc).map_err(|e| encoding(e.to_string()))?
        }
        ConfigBody::Environment(vars) => {
            let mut text = String::new();
            for (key, value) in vars {
                line(&mut text, &format!("{}={}", key, value));
            }
            text
        }
        ConfigBody::Script(script) => script.to_string(),
        ConfigBody::HealthCheck(spec) => health_check_script(spec, config),
    };
    Ok(body)
}

/// Standalone health-check loop
pub fn health_check_script(spec: &HealthCheckSpec, config: &RenderConfig) -> String {
    let mut out = String::new();
    line(&mut out, "#!/bin/bash");
    line(&mut out, "# Periodic health check of strata units");
    line(&mut out, "set -uo pipefail");
    out.push('\n');
    line(&mut out, &format!("INTERVAL={}", spec.interval_secs));
    line(&mut out, &format!("PROBE_TIMEOUT={}", spec.timeout_secs));
    out.push('\n');
    line(&mut out, "log() {");
    line(
        &mut out,
        &format!("{}echo \"[strata-health] $*\"", config.indent(1)),
    );
    line(&mut out, "}");
    out.push('\n');
    write_probe_functions(&mut out, config);
    line(&mut out, "run_checks() {");
    write_checks(&mut out, &spec.targets, 1, config);
    line(
        &mut out,
        &format!(
            "{}log \"${{HEALTHY}}/${{TOTAL}} units healthy\"",
            config.indent(1)
        ),
    );
    line(&mut out, "}");
    out.push('\n');
    line(&mut out, "while true; do");
    line(&mut out, &format!("{}run_checks", config.indent(1)));
    line(&mut out, &format!("{}sleep \"$INTERVAL\"", config.indent(1)));
    line(&mut out, "done");
    out
}

/// Up/down check for each target, with a reachability probe where one exists
///
/// Failures are logged and counted, never fatal.
fn write_checks(out: &mut String, targets: &[HealthTarget], level: usize, config: &RenderConfig) {
    let i0 = config.indent(level);
    let i1 = config.indent(level + 1);
    let i2 = config.indent(level + 2);

    line(out, &format!("{}HEALTHY=0", i0));
    line(out, &format!("{}TOTAL={}", i0, targets.len()));
    for target in targets {
        let service = format!("{}.service", target.unit);
        line(
            out,
            &format!("{}if systemctl is-active --quiet {}; then", i0, service),
        );
        match &target.probe {
            Some(probe) => {
                let call = match probe {
                    Probe::Http { url } => format!("probe_http \"{}\"", url),
                    Probe::Tcp { host, port } => format!("probe_tcp {} {}", host, port),
                };
                line(out, &format!("{}if {}; then", i1, call));
                line(out, &format!("{}log \"{}: up, probe ok\"", i2, target.unit));
                line(out, &format!("{}HEALTHY=$((HEALTHY + 1))", i2));
                line(out, &format!("{}else", i1));
                line(
                    out,
                    &format!("{}log \"{}: up, probe failed\"", i2, target.unit),
                );
                line(out, &format!("{}fi", i1));
            }
            None => {
                line(out, &format!("{}log \"{}: up\"", i1, target.unit));
                line(out, &format!("{}HEALTHY=$((HEALTHY + 1))", i1));
            }
        }
        line(out, &format!("{}else", i0));
        line(out, &format!("{}log \"{}: down\"", i1, target.unit));
        line(out, &format!("{}fi", i0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::context::BootstrapContext;
    use crate::input::InputSet;
    use crate::resolver::resolve;

    const ENDPOINT: &str = "https://aps-workspaces.us-east-1.amazonaws.com/workspaces/ws-1234/";

    fn pipeline() -> Pipeline {
        let config = resolve(&InputSet::new("demo", "development")).unwrap();
        Pipeline::build(&BootstrapContext::from_config(&config, ENDPOINT)).unwrap()
    }

    #[test]
    fn systemd_unit_declares_restart_policy() {
        let pipeline = pipeline();
        let units = pipeline.units();
        let text = systemd_unit(&units[1], Some(&units[0]));
        assert!(text.contains("Restart=always\nRestartSec=5\n"));
        assert!(text.contains("After=network-online.target node-exporter.service\n"));
        assert!(text.contains("StartLimitIntervalSec=0\n"));
    }

    #[test]
    fn environment_file_is_referenced() {
        let pipeline = pipeline();
        let proxy = pipeline.unit("sigv4-proxy").unwrap();
        let text = systemd_unit(proxy, None);
        assert!(text.contains("EnvironmentFile=/etc/default/sigv4-proxy\n"));
    }

    #[test]
    fn every_unit_gets_a_section() {
        let script = render_pipeline(&pipeline(), &RenderConfig::default()).unwrap();
        for unit in pipeline().units() {
            assert!(
                script.contains(&format!("cat > /etc/systemd/system/{} <<'STRATA_EOF'", unit.service_name())),
                "no unit file for {}",
                unit.name
            );
            assert!(script.contains(&format!("systemctl enable --now {}", unit.service_name())));
        }
        assert!(script.starts_with("#!/bin/bash\n"));
        assert!(script.ends_with("exit 0\n"));
    }

    #[test]
    fn script_is_not_fail_fast() {
        let script = render_pipeline(&pipeline(), &RenderConfig::default()).unwrap();
        assert!(script.contains("set -uo pipefail\n"));
        assert!(!script.contains("\nset -e\n"));
    }

    #[test]
    fn heredoc_collision_is_rejected() {
        let config = RenderConfig {
            heredoc_marker: "done".to_string(),
            ..Default::default()
        };
        let err = render_pipeline(&pipeline(), &config).unwrap_err();
        assert!(matches!(err, RenderError::Encoding { .. }));
    }

    #[test]
    fn unit_file_collision_is_rejected() {
        let config = RenderConfig {
            heredoc_marker: "[Service]".to_string(),
            ..Default::default()
        };
        match render_pipeline(&pipeline(), &config) {
            Err(RenderError::Encoding { unit, message }) => {
                assert_eq!(unit, "node-exporter");
                assert!(message.contains("node-exporter.service"));
            }
            other => panic!("expected encoding error, got {:?}", other),
        }
    }

    #[test]
    fn environment_file_lines() {
        let script = render_pipeline(&pipeline(), &RenderConfig::default()).unwrap();
        assert!(script.contains("AWS_REGION=us-east-1\n"));
    }

    #[test]
    fn health_script_loops_over_targets() {
        let spec = HealthCheckSpec {
            interval_secs: 30,
            timeout_secs: 2,
            targets: vec![
                HealthTarget {
                    unit: "node-exporter",
                    probe: Some(Probe::Http {
                        url: "http://127.0.0.1:9100/metrics".to_string(),
                    }),
                },
                HealthTarget {
                    unit: "cloudwatch-agent",
                    probe: None,
                },
            ],
        };
        let script = health_check_script(&spec, &RenderConfig::default());
        assert!(script.contains("INTERVAL=30\n"));
        assert!(script.contains("PROBE_TIMEOUT=2\n"));
        assert!(script.contains("    TOTAL=2\n"));
        assert!(script.contains("        if probe_http \"http://127.0.0.1:9100/metrics\"; then\n"));
        assert!(script.contains("        log \"cloudwatch-agent: up\"\n"));
        assert!(script.contains("while true; do\n"));
    }
}
