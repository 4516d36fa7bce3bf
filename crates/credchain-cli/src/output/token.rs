// SPDX-License-Identifier: Apache-2.0

use std::io::{self, Write};

use chrono::Utc;
use console::style;

use crate::cli::OutputContext;
use crate::commands::types::TokenResult;

use super::Renderable;

impl Renderable for TokenResult {
    fn render_text(&self, w: &mut dyn Write, ctx: &OutputContext) -> io::Result<()> {
        if let Some(token) = &self.access_token
            && !ctx.is_tty
        {
            // Piped: print only the token so `$(credchain token ...)` works.
            return writeln!(w, "{token}");
        }

        let source = self.source.as_deref().unwrap_or("unknown source");
        writeln!(w, "{} Token acquired from {}", style("*").green().bold(), style(source).cyan())?;
        writeln!(w, "  Scopes: {}", self.scopes.join(" "))?;
        writeln!(w, "  Type: {}", self.summary.token_type)?;
        let minutes = (self.summary.expires_on - Utc::now()).num_minutes();
        writeln!(
            w,
            "  Expires: {} (in {minutes} min)",
            self.summary.expires_on.to_rfc3339()
        )?;
        if ctx.verbose
            && let Some(refresh_on) = self.summary.refresh_on
        {
            writeln!(w, "  Refresh after: {}", refresh_on.to_rfc3339())?;
        }
        if let Some(token) = &self.access_token {
            writeln!(w)?;
            writeln!(w, "{token}")?;
        }
        Ok(())
    }
}
