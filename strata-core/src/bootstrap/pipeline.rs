//! Pipeline - What gets installed on a host, and in what order
//!
//! The pipeline is plain data describing each supervised unit: how it is
//! installed, what configuration it receives, how it is restarted and how
//! its health is probed. Turning it into text is `render`'s job.

use std::collections::BTreeMap;

use crate::bootstrap::agents::{
    GlobalConfig, LOAD_GENERATOR_SCRIPT, LogForwarderConfig, PrometheusConfig, QueueConfig,
    RemoteWriteConfig, ScrapeConfig, XrayConfig, XrayLogging, XraySocket,
};
use crate::bootstrap::context::{BootstrapContext, RemoteWriteTarget};
use crate::error::RenderError;

pub const NODE_EXPORTER_VERSION: &str = "1.8.2";
pub const PROMETHEUS_VERSION: &str = "2.54.1";
pub const SIGV4_PROXY_VERSION: &str = "1.10";

pub const NODE_EXPORTER_PORT: u16 = 9100;
pub const PROMETHEUS_PORT: u16 = 9090;
pub const SIGV4_PROXY_PORT: u16 = 8005;
pub const XRAY_PORT: u16 = 2000;
pub const LOAD_GENERATOR_PORT: u16 = 8000;

/// Seconds between health-check passes
pub const HEALTH_CHECK_INTERVAL_SECS: u32 = 60;

/// Per-probe timeout in seconds
pub const PROBE_TIMEOUT_SECS: u32 = 5;

/// Seconds the supervisor waits before restarting a unit
pub const RESTART_BACKOFF_SECS: u32 = 5;

/// Service name used when signing remote-write requests
const SIGNING_SERVICE: &str = "aps";

/// What a unit does in the metrics pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitRole {
    MetricsExporter,
    MetricsAggregator,
    RemoteWriteForwarder,
    LogForwarder,
    TracingDaemon,
    LoadGenerator,
    HealthCheck,
}

/// Supervisor restart policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Restart on every exit after a fixed backoff
    Always { backoff_secs: u32 },
}

impl RestartPolicy {
    pub fn always() -> Self {
        RestartPolicy::Always {
            backoff_secs: RESTART_BACKOFF_SECS,
        }
    }
}

/// Reachability probe against a unit's own local endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    Http { url: String },
    Tcp { host: String, port: u16 },
}

impl Probe {
    fn http(port: u16, path: &str) -> Self {
        Probe::Http {
            url: format!("http://127.0.0.1:{}{}", port, path),
        }
    }

    fn tcp(port: u16) -> Self {
        Probe::Tcp {
            host: "127.0.0.1".to_string(),
            port,
        }
    }
}

/// A configuration file written before the unit starts
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub path: String,
    pub mode: u32,
    pub body: ConfigBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigBody {
    Prometheus(PrometheusConfig),
    Xray(XrayConfig),
    LogForwarder(LogForwarderConfig),
    /// `KEY=value` lines read by the supervisor
    Environment(BTreeMap<String, String>),
    /// Script shipped verbatim
    Script(&'static str),
    /// Health-check loop generated from the checked units
    HealthCheck(HealthCheckSpec),
}

/// One supervised process
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    pub name: &'static str,
    pub role: UnitRole,
    pub description: &'static str,
    pub install: Vec<String>,
    pub config: Option<ConfigFile>,
    pub exec_start_pre: Vec<String>,
    pub exec_start: String,
    pub restart: RestartPolicy,
    pub probe: Option<Probe>,
}

impl Unit {
    pub fn service_name(&self) -> String {
        format!("{}.service", self.name)
    }

    pub fn is_network_facing(&self) -> bool {
        self.probe.is_some()
    }
}

/// Unit checked by the health-check loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthTarget {
    pub unit: &'static str,
    pub probe: Option<Probe>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckSpec {
    pub interval_secs: u32,
    pub timeout_secs: u32,
    pub targets: Vec<HealthTarget>,
}

/// Ordered set of units for one host
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub project_name: String,
    pub environment: String,
    pub region: String,
    units: Vec<Unit>,
}

impl Pipeline {
    /// Describe the host pipeline for `ctx`
    ///
    /// Fails without producing anything when the context cannot yield a
    /// valid remote-write target.
    pub fn build(ctx: &BootstrapContext) -> Result<Self, RenderError> {
        let target = ctx.remote_write_target()?;
        log::debug!(
            "Building bootstrap pipeline for {} ({}) writing to {}",
            ctx.project_name,
            ctx.environment,
            target.host
        );

        let mut units = vec![
            node_exporter(),
            prometheus_agent(ctx, &target),
            sigv4_proxy(&target),
            log_forwarder(ctx),
            xray_daemon(ctx),
            load_generator(),
        ];

        let mut targets: Vec<HealthTarget> = units
            .iter()
            .map(|unit| HealthTarget {
                unit: unit.name,
                probe: unit.probe.clone(),
            })
            .collect();
        targets.push(HealthTarget {
            unit: HEALTH_CHECK_UNIT,
            probe: None,
        });
        units.push(health_check(HealthCheckSpec {
            interval_secs: HEALTH_CHECK_INTERVAL_SECS,
            timeout_secs: PROBE_TIMEOUT_SECS,
            targets,
        }));

        Ok(Self {
            project_name: ctx.project_name.clone(),
            environment: ctx.environment.to_string(),
            region: ctx.region.clone(),
            units,
        })
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn unit(&self, name: &str) -> Option<&Unit> {
        self.units.iter().find(|u| u.name == name)
    }

    /// Every unit with its probe, in installation order
    pub fn health_targets(&self) -> Vec<HealthTarget> {
        self.units
            .iter()
            .map(|unit| HealthTarget {
                unit: unit.name,
                probe: unit.probe.clone(),
            })
            .collect()
    }
}

const HEALTH_CHECK_UNIT: &str = "strata-health-check";

fn release_install(binary: &str, archive_url: String, archive_dir: &str) -> Vec<String> {
    vec![
        format!(
            "id -u {0} >/dev/null 2>&1 || useradd --system --no-create-home --shell /sbin/nologin {0}",
            binary
        ),
        format!("curl -fsSL {} | tar -xz -C /tmp", archive_url),
        format!(
            "install -m 0755 /tmp/{}/{} /usr/local/bin/{}",
            archive_dir, binary, binary
        ),
    ]
}

fn node_exporter() -> Unit {
    let dir = format!("node_exporter-{}.linux-amd64", NODE_EXPORTER_VERSION);
    Unit {
        name: "node-exporter",
        role: UnitRole::MetricsExporter,
        description: "Host metrics exporter",
        install: release_install(
            "node_exporter",
            format!(
                "https://github.com/prometheus/node_exporter/releases/download/v{}/{}.tar.gz",
                NODE_EXPORTER_VERSION, dir
            ),
            &dir,
        ),
        config: None,
        exec_start_pre: vec![],
        exec_start: format!(
            "/usr/local/bin/node_exporter --web.listen-address=127.0.0.1:{}",
            NODE_EXPORTER_PORT
        ),
        restart: RestartPolicy::always(),
        probe: Some(Probe::http(NODE_EXPORTER_PORT, "/metrics")),
    }
}

fn prometheus_agent(ctx: &BootstrapContext, target: &RemoteWriteTarget) -> Unit {
    let dir = format!("prometheus-{}.linux-amd64", PROMETHEUS_VERSION);
    let mut install = release_install(
        "prometheus",
        format!(
            "https://github.com/prometheus/prometheus/releases/download/v{}/{}.tar.gz",
            PROMETHEUS_VERSION, dir
        ),
        &dir,
    );
    install.push("install -d -o prometheus /var/lib/prometheus/agent".to_string());

    let mut external_labels = BTreeMap::new();
    external_labels.insert("project".to_string(), ctx.project_name.clone());
    external_labels.insert("environment".to_string(), ctx.environment.to_string());
    external_labels.insert("region".to_string(), ctx.region.clone());

    let config = PrometheusConfig {
        global: GlobalConfig {
            scrape_interval: ctx.scrape_interval.clone(),
            external_labels,
        },
        scrape_configs: vec![
            ScrapeConfig::single("prometheus", &format!("127.0.0.1:{}", PROMETHEUS_PORT)),
            ScrapeConfig::single("node", &format!("127.0.0.1:{}", NODE_EXPORTER_PORT)),
            ScrapeConfig::single(
                "load-generator",
                &format!("127.0.0.1:{}", LOAD_GENERATOR_PORT),
            ),
        ],
        remote_write: vec![RemoteWriteConfig {
            url: format!("http://127.0.0.1:{}{}", SIGV4_PROXY_PORT, target.path),
            queue_config: QueueConfig::default(),
        }],
    };

    Unit {
        name: "prometheus-agent",
        role: UnitRole::MetricsAggregator,
        description: "Local metrics agent buffering samples for remote write",
        install,
        config: Some(ConfigFile {
            path: "/etc/prometheus/prometheus.yml".to_string(),
            mode: 0o644,
            body: ConfigBody::Prometheus(config),
        }),
        exec_start_pre: vec![],
        exec_start: format!(
            "/usr/local/bin/prometheus --enable-feature=agent \
             --config.file=/etc/prometheus/prometheus.yml \
             --storage.agent.path=/var/lib/prometheus/agent \
             --web.listen-address=127.0.0.1:{}",
            PROMETHEUS_PORT
        ),
        restart: RestartPolicy::always(),
        probe: Some(Probe::http(PROMETHEUS_PORT, "/-/ready")),
    }
}

fn sigv4_proxy(target: &RemoteWriteTarget) -> Unit {
    let mut env = BTreeMap::new();
    env.insert("AWS_REGION".to_string(), target.signing_region.clone());
    env.insert("SIGNING_SERVICE".to_string(), SIGNING_SERVICE.to_string());
    env.insert("UPSTREAM_HOST".to_string(), target.host.clone());
    env.insert("REMOTE_WRITE_URL".to_string(), target.url.clone());
    env.insert(
        "LISTEN_ADDRESS".to_string(),
        format!("127.0.0.1:{}", SIGV4_PROXY_PORT),
    );

    Unit {
        name: "sigv4-proxy",
        role: UnitRole::RemoteWriteForwarder,
        description: "Signing proxy forwarding remote-write requests to the metrics workspace",
        install: vec![format!(
            "curl -fsSL -o /usr/local/bin/aws-sigv4-proxy \
             https://github.com/awslabs/aws-sigv4-proxy/releases/download/v{}/aws-sigv4-proxy-linux-amd64 \
             && chmod 0755 /usr/local/bin/aws-sigv4-proxy",
            SIGV4_PROXY_VERSION
        )],
        config: Some(ConfigFile {
            path: "/etc/default/sigv4-proxy".to_string(),
            mode: 0o644,
            body: ConfigBody::Environment(env),
        }),
        exec_start_pre: vec![],
        exec_start: "/usr/local/bin/aws-sigv4-proxy --name ${SIGNING_SERVICE} \
                     --region ${AWS_REGION} --host ${UPSTREAM_HOST} --port ${LISTEN_ADDRESS}"
            .to_string(),
        restart: RestartPolicy::always(),
        probe: Some(Probe::tcp(SIGV4_PROXY_PORT)),
    }
}

fn log_forwarder(ctx: &BootstrapContext) -> Unit {
    let ctl = "/opt/aws/amazon-cloudwatch-agent/bin/amazon-cloudwatch-agent-ctl";
    let local = "/opt/aws/amazon-cloudwatch-agent/etc/strata-logs.json";
    Unit {
        name: "cloudwatch-agent",
        role: UnitRole::LogForwarder,
        description: "Log forwarder shipping host logs",
        install: vec!["dnf install -y amazon-cloudwatch-agent".to_string()],
        config: Some(ConfigFile {
            path: local.to_string(),
            mode: 0o644,
            body: ConfigBody::LogForwarder(LogForwarderConfig::for_files(&ctx.log_group, &[
                ("/var/log/strata-bootstrap.log", "bootstrap"),
                ("/var/log/messages", "messages"),
            ])),
        }),
        exec_start_pre: vec![
            format!(
                "{} -a fetch-config -m ec2 -c ssm:{}",
                ctl, ctx.agent_config_parameter
            ),
            format!("{} -a append-config -m ec2 -c file:{}", ctl, local),
        ],
        exec_start: "/opt/aws/amazon-cloudwatch-agent/bin/start-amazon-cloudwatch-agent"
            .to_string(),
        restart: RestartPolicy::always(),
        probe: None,
    }
}

fn xray_daemon(ctx: &BootstrapContext) -> Unit {
    let address = format!("127.0.0.1:{}", XRAY_PORT);
    Unit {
        name: "xray-daemon",
        role: UnitRole::TracingDaemon,
        description: "Distributed tracing daemon",
        install: vec![format!(
            "dnf install -y https://s3.{0}.amazonaws.com/aws-xray-assets.{0}/xray-daemon/aws-xray-daemon-3.x.rpm",
            ctx.region
        )],
        config: Some(ConfigFile {
            path: "/etc/amazon/xray/cfg.yaml".to_string(),
            mode: 0o644,
            body: ConfigBody::Xray(XrayConfig {
                version: 2,
                region: ctx.region.clone(),
                socket: XraySocket {
                    udp_address: address.clone(),
                    tcp_address: address,
                },
                logging: XrayLogging {
                    log_level: "info".to_string(),
                },
                local_mode: false,
            }),
        }),
        exec_start_pre: vec![],
        exec_start: "/usr/bin/xray -c /etc/amazon/xray/cfg.yaml".to_string(),
        restart: RestartPolicy::always(),
        probe: Some(Probe::tcp(XRAY_PORT)),
    }
}

fn load_generator() -> Unit {
    Unit {
        name: "load-generator",
        role: UnitRole::LoadGenerator,
        description: "Synthetic traffic generator for demonstration metrics",
        install: vec!["dnf install -y python3".to_string()],
        config: Some(ConfigFile {
            path: "/opt/strata/load_generator.py".to_string(),
            mode: 0o755,
            body: ConfigBody::Script(LOAD_GENERATOR_SCRIPT),
        }),
        exec_start_pre: vec![],
        exec_start: format!(
            "/usr/bin/python3 /opt/strata/load_generator.py --port {}",
            LOAD_GENERATOR_PORT
        ),
        restart: RestartPolicy::always(),
        probe: Some(Probe::http(LOAD_GENERATOR_PORT, "/metrics")),
    }
}

fn health_check(spec: HealthCheckSpec) -> Unit {
    Unit {
        name: HEALTH_CHECK_UNIT,
        role: UnitRole::HealthCheck,
        description: "Periodic health check of strata units",
        install: vec![],
        config: Some(ConfigFile {
            path: "/opt/strata/health_check.sh".to_string(),
            mode: 0o755,
            body: ConfigBody::HealthCheck(spec),
        }),
        exec_start_pre: vec![],
        exec_start: "/bin/bash /opt/strata/health_check.sh".to_string(),
        restart: RestartPolicy::always(),
        probe: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::InputSet;
    use crate::resolver::resolve;

    const ENDPOINT: &str = "https://aps-workspaces.eu-west-1.amazonaws.com/workspaces/ws-42/";

    fn pipeline() -> Pipeline {
        let mut input = InputSet::new("demo", "staging").with_zones(["eu-west-1a"]);
        input.region = "eu-west-1".to_string();
        let config = resolve(&input).unwrap();
        Pipeline::build(&BootstrapContext::from_config(&config, ENDPOINT)).unwrap()
    }

    #[test]
    fn units_are_ordered() {
        let roles: Vec<UnitRole> = pipeline().units().iter().map(|u| u.role).collect();
        assert_eq!(
            roles,
            vec![
                UnitRole::MetricsExporter,
                UnitRole::MetricsAggregator,
                UnitRole::RemoteWriteForwarder,
                UnitRole::LogForwarder,
                UnitRole::TracingDaemon,
                UnitRole::LoadGenerator,
                UnitRole::HealthCheck,
            ]
        );
    }

    #[test]
    fn every_unit_restarts_always() {
        for unit in pipeline().units() {
            assert_eq!(
                unit.restart,
                RestartPolicy::Always {
                    backoff_secs: RESTART_BACKOFF_SECS
                },
                "{} has no restart policy",
                unit.name
            );
        }
    }

    #[test]
    fn remote_write_uses_bounded_queue() {
        let pipeline = pipeline();
        let unit = pipeline.unit("prometheus-agent").unwrap();
        let Some(ConfigFile {
            body: ConfigBody::Prometheus(config),
            ..
        }) = &unit.config
        else {
            panic!("Expected prometheus config");
        };

        assert_eq!(config.remote_write.len(), 1);
        let remote = &config.remote_write[0];
        assert_eq!(
            remote.url,
            "http://127.0.0.1:8005/workspaces/ws-42/api/v1/remote_write"
        );
        assert_eq!(remote.queue_config, QueueConfig::default());
        assert_eq!(config.global.scrape_interval, "15s");
        assert_eq!(
            config.global.external_labels.get("environment").map(String::as_str),
            Some("staging")
        );
    }

    #[test]
    fn forwarder_embeds_endpoint_and_region() {
        let pipeline = pipeline();
        let unit = pipeline.unit("sigv4-proxy").unwrap();
        let Some(ConfigFile {
            body: ConfigBody::Environment(env),
            ..
        }) = &unit.config
        else {
            panic!("Expected environment file");
        };
        assert_eq!(env["AWS_REGION"], "eu-west-1");
        assert_eq!(env["UPSTREAM_HOST"], "aps-workspaces.eu-west-1.amazonaws.com");
        assert_eq!(env["SIGNING_SERVICE"], "aps");
    }

    #[test]
    fn log_forwarder_fetches_agent_parameter() {
        let pipeline = pipeline();
        let unit = pipeline.unit("cloudwatch-agent").unwrap();
        assert!(unit.exec_start_pre[0].ends_with("-c ssm:/demo/staging/cloudwatch-agent/config"));
        assert!(!unit.is_network_facing());
    }

    #[test]
    fn health_check_enumerates_every_unit() {
        let pipeline = pipeline();
        let unit = pipeline.unit(HEALTH_CHECK_UNIT).unwrap();
        let Some(ConfigFile {
            body: ConfigBody::HealthCheck(spec),
            ..
        }) = &unit.config
        else {
            panic!("Expected health check spec");
        };

        assert_eq!(spec.targets, pipeline.health_targets());
        assert_eq!(spec.timeout_secs, PROBE_TIMEOUT_SECS);
        assert_eq!(spec.interval_secs, HEALTH_CHECK_INTERVAL_SECS);
    }

    #[test]
    fn network_facing_units_probe_themselves() {
        let pipeline = pipeline();
        let probed: Vec<&str> = pipeline
            .units()
            .iter()
            .filter(|u| u.is_network_facing())
            .map(|u| u.name)
            .collect();
        assert_eq!(
            probed,
            vec![
                "node-exporter",
                "prometheus-agent",
                "sigv4-proxy",
                "xray-daemon",
                "load-generator"
            ]
        );
        assert_eq!(
            pipeline.unit("node-exporter").unwrap().probe,
            Some(Probe::Http {
                url: "http://127.0.0.1:9100/metrics".to_string()
            })
        );
    }

    #[test]
    fn build_fails_without_endpoint() {
        let config = resolve(&InputSet::new("demo", "staging")).unwrap();
        let err = Pipeline::build(&BootstrapContext::from_config(&config, "")).unwrap_err();
        assert_eq!(err, RenderError::MissingField("metrics_endpoint"));
    }
}
