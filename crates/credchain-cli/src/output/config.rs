// SPDX-License-Identifier: Apache-2.0

use std::io::{self, Write};

use console::style;

use crate::cli::OutputContext;
use crate::commands::types::ConfigResult;

use super::Renderable;

fn or_unset(value: Option<&str>) -> &str {
    value.unwrap_or("(unset)")
}

impl Renderable for ConfigResult {
    fn render_text(&self, w: &mut dyn Write, _ctx: &OutputContext) -> io::Result<()> {
        let status = if self.exists {
            style("found").green()
        } else {
            style("not found, using defaults").yellow()
        };
        writeln!(w, "Config file: {} ({status})", self.path)?;

        let config = &self.config;
        writeln!(w)?;
        writeln!(w, "{}", style("[chain]").bold())?;
        writeln!(w, "  tenant_id: {}", or_unset(config.chain.tenant_id.as_deref()))?;
        writeln!(
            w,
            "  additionally_allowed_tenants: {}",
            config.chain.additionally_allowed_tenants.join(";")
        )?;
        writeln!(w, "  authority_host: {}", or_unset(config.chain.authority_host.as_deref()))?;
        writeln!(w, "{}", style("[managed_identity]").bold())?;
        writeln!(w, "  client_id: {}", or_unset(config.managed_identity.client_id.as_deref()))?;
        writeln!(
            w,
            "  resource_id: {}",
            or_unset(config.managed_identity.resource_id.as_deref())
        )?;
        writeln!(w, "  max_retries: {}", config.managed_identity.max_retries)?;
        writeln!(w, "{}", style("[workload_identity]").bold())?;
        writeln!(w, "  client_id: {}", or_unset(config.workload_identity.client_id.as_deref()))?;
        writeln!(w, "{}", style("[cli]").bold())?;
        writeln!(w, "  timeout_seconds: {}", config.cli.timeout_seconds)?;
        Ok(())
    }
}
