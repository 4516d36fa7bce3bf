// SPDX-License-Identifier: Apache-2.0

use std::io::{self, Write};

use console::style;

use crate::cli::OutputContext;
use crate::commands::types::SourcesResult;

use super::Renderable;

impl Renderable for SourcesResult {
    fn render_text(&self, w: &mut dyn Write, _ctx: &OutputContext) -> io::Result<()> {
        writeln!(w, "{} tries, in order:", style(self.chain).bold())?;
        let mut position = 0;
        for source in &self.sources {
            if source.included {
                position += 1;
                writeln!(w, "  {position}. {}", source.name)?;
            } else {
                writeln!(w, "  -  {} {}", style(source.name).dim(), style("(excluded)").yellow())?;
            }
        }
        if self.reuse_on_success {
            writeln!(
                w,
                "{}",
                style("The first source that succeeds is reused for later requests.").dim()
            )?;
        }
        Ok(())
    }
}
