//! Bootstrap - Host agent pipeline and its rendered bootstrap script
//!
//! Generation happens in two steps. `Pipeline::build` decides which units
//! are installed, in what order, with which configuration. `render_pipeline`
//! formats that description as a shell script. Only the first step can
//! fail on bad input; a malformed metrics endpoint stops generation before
//! any text is produced.
//!
//! # Example
//!
//! ```
//! use strata_core::bootstrap::{self, BootstrapContext};
//! use strata_core::input::InputSet;
//! use strata_core::resolver::resolve;
//!
//! let config = resolve(&InputSet::new("demo", "development")).unwrap();
//! let ctx = BootstrapContext::from_config(
//!     &config,
//!     "https://aps-workspaces.us-east-1.amazonaws.com/workspaces/ws-1234/",
//! );
//! let script = bootstrap::render(&ctx).unwrap();
//!
//! assert!(script.as_str().contains("Restart=always"));
//! ```

pub mod agents;
mod context;
pub mod pipeline;
mod render;

use std::fmt;

pub use context::{BootstrapContext, RemoteWriteTarget};
pub use pipeline::{Pipeline, Probe, RestartPolicy, Unit, UnitRole};
pub use render::{RenderConfig, health_check_script, render_pipeline, systemd_unit};

use crate::error::RenderError;

/// Rendered bootstrap script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapScript(String);

impl BootstrapScript {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for BootstrapScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Render the bootstrap script for `ctx` with default options
pub fn render(ctx: &BootstrapContext) -> Result<BootstrapScript, RenderError> {
    render_with(ctx, &RenderConfig::default())
}

pub fn render_with(
    ctx: &BootstrapContext,
    config: &RenderConfig,
) -> Result<BootstrapScript, RenderError> {
    let pipeline = Pipeline::build(ctx)?;
    let text = render_pipeline(&pipeline, config)?;
    log::debug!(
        "Rendered bootstrap with {} units ({} bytes)",
        pipeline.units().len(),
        text.len()
    );
    Ok(BootstrapScript(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::InputSet;
    use crate::resolver::resolve;

    const ENDPOINT: &str = "https://aps-workspaces.us-east-1.amazonaws.com/workspaces/ws-1234/";

    fn context() -> BootstrapContext {
        let config = resolve(&InputSet::new("demo", "development")).unwrap();
        BootstrapContext::from_config(&config, ENDPOINT)
    }

    #[test]
    fn render_is_idempotent() {
        let ctx = context();
        let first = render(&ctx).unwrap();
        let second = render(&ctx).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn render_fails_closed_on_empty_endpoint() {
        let mut ctx = context();
        ctx.metrics_endpoint = String::new();
        assert_eq!(
            render(&ctx),
            Err(RenderError::MissingField("metrics_endpoint"))
        );
    }

    #[test]
    fn render_fails_closed_on_malformed_endpoint() {
        let mut ctx = context();
        ctx.metrics_endpoint = "ftp://example.com".to_string();
        assert!(matches!(
            render(&ctx),
            Err(RenderError::MalformedEndpoint { .. })
        ));
    }

    #[test]
    fn render_refuses_command_substitution_in_region() {
        let mut ctx = context();
        ctx.region = "us-east-1$(touch /tmp/x)".to_string();
        assert!(matches!(
            render(&ctx),
            Err(RenderError::MalformedField { field: "region", .. })
        ));
    }

    #[test]
    fn rendered_forwarder_config_embeds_endpoint_and_region() {
        let script = render(&context()).unwrap();
        let text = script.as_str();
        assert!(text.contains("AWS_REGION=us-east-1\n"));
        assert!(text.contains("UPSTREAM_HOST=aps-workspaces.us-east-1.amazonaws.com\n"));
        assert!(text.contains("http://127.0.0.1:8005/workspaces/ws-1234/api/v1/remote_write"));
        assert!(text.contains("capacity: 10000"));
        assert!(text.contains("max_shards: 50"));
        assert!(text.contains("max_samples_per_send: 2000"));
    }

    #[test]
    fn rendered_body_has_no_embedded_timestamps() {
        let text = render(&context()).unwrap().into_string();
        assert!(!text.contains("T00:"));
        assert_eq!(text.matches("$(date -u").count(), 1);
    }

    #[test]
    fn summary_enumerates_every_unit() {
        let ctx = context();
        let pipeline = Pipeline::build(&ctx).unwrap();
        let text = render(&ctx).unwrap().into_string();
        let summary = &text[text.find("# --- Health summary ---").unwrap()..];
        assert!(summary.contains(&format!("TOTAL={}", pipeline.units().len())));
        for unit in pipeline.units() {
            assert!(summary.contains(&format!("log \"{}: down\"", unit.name)));
        }
        assert!(summary.contains("Bootstrap finished"));
    }
}
