//! Reference `show_pipeline` implementation.
//!
//! A real dispatcher would replace this with its own AST printer (that's
//! the whole point of `show_pipeline` being an external collaborator); this
//! one exists so `JobManager::show` has something to call in this crate's
//! own tests and demo binary, and so the job table's debug dump (spec.md
//! §6) is actually exercised end to end.

use std::fmt;

use super::Pipeline;

/// Renders a pipeline as `cmd1 arg1 arg2 | cmd2 | cmd3 < in > out`, the way
/// a shell would echo back what it's about to run.
pub fn render_pipeline<E: fmt::Display>(
    sink: &mut dyn std::io::Write,
    pipeline: &Pipeline<E>,
) -> std::io::Result<()> {
    for (i, cmd) in pipeline.commands.iter().enumerate() {
        if i > 0 {
            write!(sink, " | ")?;
        }
        for (j, arg) in cmd.args.iter().enumerate() {
            if j > 0 {
                write!(sink, " ")?;
            }
            write!(sink, "{arg}")?;
        }
    }
    if let Some(input) = &pipeline.input_file {
        write!(sink, " < {}", input.display())?;
    }
    if let Some(output) = &pipeline.output_file {
        write!(sink, " > {}", output.display())?;
    } else if pipeline.capture_output {
        write!(sink, " [capture]")?;
    }
    Ok(())
}
