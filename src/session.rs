//! Line-oriented interactive session: each control event re-runs the pipeline

use crate::pipeline::{write_export, write_outputs, ControlEvent, Dashboard};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tracing::debug;

/// Where and what the session writes after each recompute
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub output_dir: PathBuf,
    /// Re-render charts on every control change
    pub render_charts: bool,
}

const HELP: &str = "commands: threshold <days> | range <low> <high> | reset | show | export | quit";

/// Read control events from `input` until `quit` or end of input
///
/// Unparseable lines are reported and skipped. Source failures are fatal and
/// end the session with an error.
pub fn run_session<R: BufRead, W: Write>(
    dashboard: &mut Dashboard,
    input: R,
    mut output: W,
    options: &SessionOptions,
) -> crate::Result<()> {
    let view = dashboard.refresh()?;
    write_outputs(&view, &options.output_dir, options.render_charts, false)?;
    write!(output, "{view}")?;
    writeln!(output, "{HELP}")?;

    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let event = match line.parse::<ControlEvent>() {
            Ok(event) => event,
            Err(err) => {
                writeln!(output, "error: {err}")?;
                continue;
            }
        };
        debug!(?event, "control event");

        if event == ControlEvent::Quit {
            break;
        }

        let view = dashboard.handle(&event)?;
        if event == ControlEvent::Export {
            let path = write_export(&view, &options.output_dir)?;
            writeln!(
                output,
                "Exported {} customers to {}",
                view.filtered.len(),
                path.display()
            )?;
            continue;
        }

        write_outputs(&view, &options.output_dir, options.render_charts, false)?;
        write!(output, "{view}")?;
    }

    output.flush()?;
    Ok(())
}
