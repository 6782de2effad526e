//! Output formatting utilities

use console::style;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use crate::cli::OutputFormat;

/// Determine the effective output format based on context
pub fn effective_format(format: OutputFormat, is_list: bool) -> OutputFormat {
    match format {
        OutputFormat::Auto => {
            if is_list {
                OutputFormat::Table
            } else {
                OutputFormat::Yaml
            }
        }
        other => other,
    }
}

/// Print rows as a table, structured data or CSV.
///
/// `ids` is used for `--format id`; callers pass the identifier of each row.
pub fn print_rows<T>(rows: &[T], ids: &[String], format: OutputFormat, empty: &str) -> Result<()>
where
    T: Serialize + Tabled,
{
    match effective_format(format, true) {
        OutputFormat::Yaml => print!("{}", serde_yml::to_string(rows).into_diagnostic()?),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(rows).into_diagnostic()?),
        OutputFormat::Csv => print_csv(rows)?,
        OutputFormat::Id => {
            for id in ids {
                println!("{}", id);
            }
        }
        OutputFormat::Table | OutputFormat::Auto => {
            if rows.is_empty() {
                println!("{}", style(empty).dim());
            } else {
                let mut table = Table::new(rows);
                table.with(Style::psql());
                println!("{}", table);
            }
        }
    }
    Ok(())
}

/// Print a single record; table and CSV fall back to YAML
pub fn print_single<T: Serialize>(data: &T, format: OutputFormat) -> Result<()> {
    match effective_format(format, false) {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(data).into_diagnostic()?),
        _ => print!("{}", serde_yml::to_string(data).into_diagnostic()?),
    }
    Ok(())
}

fn print_csv<T: Serialize>(rows: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(std::io::stdout());
    for row in rows {
        writer.serialize(row).into_diagnostic()?;
    }
    writer.flush().into_diagnostic()?;
    Ok(())
}

pub fn print_success(message: &str) {
    println!("{} {}", style("✓").green(), message);
}

pub fn print_warning(message: &str) {
    eprintln!("{} {}", style("!").yellow(), message);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_resolves_by_shape() {
        assert_eq!(effective_format(OutputFormat::Auto, true), OutputFormat::Table);
        assert_eq!(effective_format(OutputFormat::Auto, false), OutputFormat::Yaml);
        assert_eq!(effective_format(OutputFormat::Csv, false), OutputFormat::Csv);
    }
}
