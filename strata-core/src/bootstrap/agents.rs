//! Typed configuration documents for the host agents

use std::collections::BTreeMap;

use serde::Serialize;

/// Outbound remote-write queue capacity (samples per shard)
pub const QUEUE_CAPACITY: u32 = 10_000;

/// Upper bound on parallel remote-write shards
pub const QUEUE_MAX_SHARDS: u32 = 50;

/// Largest batch sent in one remote-write request
pub const QUEUE_MAX_SAMPLES_PER_SEND: u32 = 2_000;

/// Local metrics agent configuration (`prometheus.yml`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrometheusConfig {
    pub global: GlobalConfig,
    pub scrape_configs: Vec<ScrapeConfig>,
    pub remote_write: Vec<RemoteWriteConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlobalConfig {
    pub scrape_interval: String,
    pub external_labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScrapeConfig {
    pub job_name: String,
    pub static_configs: Vec<StaticConfig>,
}

impl ScrapeConfig {
    pub fn single(job_name: &str, target: &str) -> Self {
        Self {
            job_name: job_name.to_string(),
            static_configs: vec![StaticConfig {
                targets: vec![target.to_string()],
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaticConfig {
    pub targets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteWriteConfig {
    pub url: String,
    pub queue_config: QueueConfig,
}

/// Bounded outbound queue; policy constants, not derived from inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueConfig {
    pub capacity: u32,
    pub max_shards: u32,
    pub max_samples_per_send: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: QUEUE_CAPACITY,
            max_shards: QUEUE_MAX_SHARDS,
            max_samples_per_send: QUEUE_MAX_SAMPLES_PER_SEND,
        }
    }
}

/// Tracing daemon configuration (`cfg.yaml`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XrayConfig {
    pub version: u32,
    pub region: String,
    pub socket: XraySocket,
    pub logging: XrayLogging,
    pub local_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct XraySocket {
    #[serde(rename = "UDPAddress")]
    pub udp_address: String,
    #[serde(rename = "TCPAddress")]
    pub tcp_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XrayLogging {
    pub log_level: String,
}

/// Log shipping section appended to the host agent configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogForwarderConfig {
    pub logs: LogsSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogsSection {
    pub logs_collected: LogsCollected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogsCollected {
    pub files: CollectedFiles,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectedFiles {
    pub collect_list: Vec<CollectedFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectedFile {
    pub file_path: String,
    pub log_group_name: String,
    pub log_stream_name: String,
}

impl LogForwarderConfig {
    /// Ship each file to `log_group`, one stream per instance and file
    pub fn for_files(log_group: &str, files: &[(&str, &str)]) -> Self {
        let collect_list = files
            .iter()
            .map(|(path, stream)| CollectedFile {
                file_path: path.to_string(),
                log_group_name: log_group.to_string(),
                log_stream_name: format!("{{instance_id}}/{}", stream),
            })
            .collect();
        Self {
            logs: LogsSection {
                logs_collected: LogsCollected {
                    files: CollectedFiles { collect_list },
                },
            },
        }
    }
}

/// Synthetic traffic generator exposing demonstration metrics
pub const LOAD_GENERATOR_SCRIPT: &str = r##"#!/usr/bin/env python3
"""Serve demonstration metrics and drive synthetic traffic against them."""
import argparse
import http.server
import random
import threading
import time
import urllib.request

REQUESTS = {}
LATENCY_SUM = 0.0
LATENCY_COUNT = 0
LOCK = threading.Lock()
ROUTES = ["/api/orders", "/api/users", "/api/search"]


def observe(route, status, seconds):
    global LATENCY_SUM, LATENCY_COUNT
    with LOCK:
        key = (route, status)
        REQUESTS[key] = REQUESTS.get(key, 0) + 1
        LATENCY_SUM += seconds
        LATENCY_COUNT += 1


def exposition():
    lines = ["# TYPE demo_requests_total counter"]
    with LOCK:
        for (route, status), count in sorted(REQUESTS.items()):
            lines.append(f'demo_requests_total{{route="{route}",status="{status}"}} {count}')
        lines.append("# TYPE demo_request_duration_seconds summary")
        lines.append(f"demo_request_duration_seconds_sum {LATENCY_SUM}")
        lines.append(f"demo_request_duration_seconds_count {LATENCY_COUNT}")
    return "\n".join(lines) + "\n"


class Handler(http.server.BaseHTTPRequestHandler):
    def do_GET(self):
        started = time.monotonic()
        if self.path == "/metrics":
            body = exposition().encode()
            self.send_response(200)
            self.send_header("Content-Type", "text/plain; version=0.0.4")
            self.end_headers()
            self.wfile.write(body)
            return
        status = 500 if random.random() < 0.05 else 200
        time.sleep(random.uniform(0.005, 0.05))
        self.send_response(status)
        self.end_headers()
        observe(self.path, status, time.monotonic() - started)

    def log_message(self, *args):
        pass


def drive(port):
    while True:
        route = random.choice(ROUTES)
        try:
            urllib.request.urlopen(f"http://127.0.0.1:{port}{route}", timeout=2).read()
        except Exception:
            pass
        time.sleep(random.uniform(0.1, 0.5))


def main():
    parser = argparse.ArgumentParser()
    parser.add_argument("--port", type=int, default=8000)
    args = parser.parse_args()
    server = http.server.ThreadingHTTPServer(("127.0.0.1", args.port), Handler)
    threading.Thread(target=drive, args=(args.port,), daemon=True).start()
    server.serve_forever()


if __name__ == "__main__":
    main()
"##;
