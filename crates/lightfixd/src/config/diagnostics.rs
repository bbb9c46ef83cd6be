use std::collections::HashMap;
use std::ops::Range;
use std::path::PathBuf;

/// Source information for where a diagnostic came from
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub file_path: PathBuf,
    pub content: String,
}

/// Where a config field was defined
#[derive(Debug, Clone)]
pub struct FieldLocation {
    pub file_path: PathBuf,
    pub span: Range<usize>,
    pub content: String,
}

impl FieldLocation {
    pub fn new(source: &SourceInfo, span: Range<usize>) -> Self {
        Self {
            file_path: source.file_path.clone(),
            span,
            content: source.content.clone(),
        }
    }

    fn file_id(&self) -> String {
        self.file_path.to_string_lossy().to_string()
    }
}

/// A diagnostic message that can be either a warning or an error
#[derive(Debug, Clone)]
pub enum Diagnostic {
    Warning(Warning),
    Error(Error),
}

/// Warning messages that don't prevent config loading
#[derive(Debug, Clone)]
pub enum Warning {
    EmptyConfig { file_path: PathBuf },
}

/// Error messages that indicate problems with the config
#[derive(Debug, Clone)]
pub enum Error {
    Merge(MergeError),
    Validation(ValidationError),
}

/// The same field was set by more than one config file
#[derive(Debug, Clone)]
pub struct MergeError {
    pub field_path: String,
    pub message: String,
    pub conflicts: Vec<FieldLocation>,
}

/// A field holds a value the daemon cannot use
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field_path: String,
    pub message: String,
    pub location: Option<FieldLocation>,
}

/// Error type for config loading failures (parse errors, IO errors, etc.)
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to read '{}': {error}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("Failed to parse '{}': {error}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        error: toml::de::Error,
    },

    #[error("Import cycle detected at '{}': involves {} file(s)", path.display(), cycle.len())]
    ImportCycle { path: PathBuf, cycle: Vec<PathBuf> },
}

impl Diagnostic {
    /// Returns true if this diagnostic is an error
    pub fn is_error(&self) -> bool {
        matches!(self, Diagnostic::Error(_))
    }

    /// Returns true if this diagnostic is a warning
    pub fn is_warning(&self) -> bool {
        matches!(self, Diagnostic::Warning(_))
    }
}

/// Format all diagnostics for display using Ariadne
pub fn format_diagnostics(diagnostics: &[Diagnostic]) -> String {
    use ariadne::Label;
    use ariadne::Report;
    use ariadne::ReportKind;

    // toml spans are byte offsets
    let config = ariadne::Config::default()
        .with_color(false)
        .with_index_type(ariadne::IndexType::Byte);
    let mut output = Vec::new();

    for diagnostic in diagnostics {
        match diagnostic {
            Diagnostic::Warning(Warning::EmptyConfig { file_path }) => {
                let warning_msg = format!(
                    "Warning: Config file '{}' is empty and has no effect\n",
                    file_path.display()
                );
                output.extend_from_slice(warning_msg.as_bytes());
            }
            Diagnostic::Error(Error::Merge(merge_error)) => {
                let Some(first) = merge_error.conflicts.first() else {
                    let msg = format!(
                        "Merge conflict in field '{}': {}\n",
                        merge_error.field_path, merge_error.message
                    );
                    output.extend_from_slice(msg.as_bytes());
                    continue;
                };

                let mut report =
                    Report::build(ReportKind::Error, (first.file_id(), first.span.clone()))
                        .with_config(config)
                        .with_message(format!(
                            "Merge conflict in field '{}'",
                            merge_error.field_path
                        ))
                        .with_note(&merge_error.message);

                for (idx, conflict) in merge_error.conflicts.iter().enumerate() {
                    let label_msg = if idx == 0 {
                        "first definition here"
                    } else {
                        "conflicts with this definition"
                    };
                    report = report.with_label(
                        Label::new((conflict.file_id(), conflict.span.clone()))
                            .with_message(label_msg),
                    );
                }

                let sources: HashMap<String, String> = merge_error
                    .conflicts
                    .iter()
                    .map(|c| (c.file_id(), c.content.clone()))
                    .collect();
                report
                    .finish()
                    .write(ariadne::sources(sources), &mut output)
                    .ok();
            }
            Diagnostic::Error(Error::Validation(validation_error)) => {
                let Some(location) = &validation_error.location else {
                    let error_msg = format!(
                        "Validation error in '{}': {}\n",
                        validation_error.field_path, validation_error.message
                    );
                    output.extend_from_slice(error_msg.as_bytes());
                    continue;
                };

                Report::build(
                    ReportKind::Error,
                    (location.file_id(), location.span.clone()),
                )
                .with_config(config)
                .with_message(format!(
                    "Validation error in '{}'",
                    validation_error.field_path
                ))
                .with_label(
                    Label::new((location.file_id(), location.span.clone()))
                        .with_message(&validation_error.message),
                )
                .finish()
                .write(
                    ariadne::sources([(location.file_id(), location.content.clone())]),
                    &mut output,
                )
                .ok();
            }
        }
    }

    String::from_utf8_lossy(&output).to_string()
}
