use crate::error::ExecutionFailure;
use crate::executor::ExecutionResult;
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Plain,
    Json,
}

impl Default for OutputMode {
    fn default() -> Self {
        OutputMode::Human
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputOptions {
    pub mode: OutputMode,
    pub quiet: bool,
    pub print_url: bool,
    pub dry_run: bool,
}

#[derive(Serialize)]
struct Envelope<'a> {
    ok: bool,
    #[serde(skip_serializing_if = "str::is_empty")]
    action: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorInfo<'a>>,
}

#[derive(Serialize)]
struct ErrorInfo<'a> {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'a str>,
}

/// Renders executor results. Successes and JSON/plain failures go to `stdout`, human
/// failures to `stderr`.
pub struct Outputter<O, E> {
    options: OutputOptions,
    stdout: O,
    stderr: E,
}

impl<O: Write, E: Write> Outputter<O, E> {
    pub fn new(options: OutputOptions, stdout: O, stderr: E) -> Self {
        Outputter {
            options,
            stdout,
            stderr,
        }
    }

    pub fn write_success(&mut self, result: &ExecutionResult) -> io::Result<()> {
        match self.options.mode {
            OutputMode::Json => self.write_json(
                &result.action,
                &result.url,
                result.data.as_ref(),
                None,
            ),
            OutputMode::Plain => self.write_plain_success(result),
            OutputMode::Human => self.write_human(result),
        }
    }

    pub fn write_failure(&mut self, failure: &ExecutionFailure) -> io::Result<()> {
        let info = ErrorInfo {
            message: failure.error.to_string(),
            code: failure.error.code(),
        };
        match self.options.mode {
            OutputMode::Json => self.write_json(&failure.action, &failure.url, None, Some(info)),
            OutputMode::Plain => {
                self.write_plain_header(false, &failure.action, &failure.url)?;
                writeln!(self.stdout, "error={}", escape_plain(&info.message))?;
                if let Some(code) = info.code {
                    writeln!(self.stdout, "error_code={}", escape_plain(code))?;
                }
                Ok(())
            }
            OutputMode::Human => match info.code {
                Some(code) => writeln!(self.stderr, "error: {} ({})", info.message, code),
                None => writeln!(self.stderr, "error: {}", info.message),
            },
        }
    }

    fn write_json(
        &mut self,
        action: &str,
        url: &str,
        data: Option<&Map<String, Value>>,
        error: Option<ErrorInfo<'_>>,
    ) -> io::Result<()> {
        let envelope = Envelope {
            ok: error.is_none(),
            action,
            url,
            data: data.filter(|d| !d.is_empty()),
            error,
        };
        serde_json::to_writer(&mut self.stdout, &envelope)?;
        writeln!(self.stdout)
    }

    fn write_plain_header(&mut self, ok: bool, action: &str, url: &str) -> io::Result<()> {
        writeln!(self.stdout, "ok={}", ok)?;
        if !action.is_empty() {
            writeln!(self.stdout, "action={}", action)?;
        }
        if (self.options.print_url || self.options.dry_run) && !url.is_empty() {
            writeln!(self.stdout, "url={}", url)?;
        }
        Ok(())
    }

    fn write_plain_success(&mut self, result: &ExecutionResult) -> io::Result<()> {
        self.write_plain_header(true, &result.action, &result.url)?;
        let data = match &result.data {
            Some(data) => data,
            None => return Ok(()),
        };
        // serde_json's default map is ordered, so keys come out sorted.
        for (key, value) in data {
            match value {
                Value::Array(items) => {
                    for item in items {
                        writeln!(self.stdout, "{}={}", key, escape_plain(&value_line(item)))?;
                    }
                }
                other => writeln!(self.stdout, "{}={}", key, escape_plain(&value_line(other)))?,
            }
        }
        Ok(())
    }

    fn write_human(&mut self, result: &ExecutionResult) -> io::Result<()> {
        let opts = self.options;
        if opts.quiet && !opts.print_url && !opts.dry_run {
            return Ok(());
        }
        if (opts.print_url || opts.dry_run) && !result.url.is_empty() {
            writeln!(self.stdout, "{}", result.url)?;
            if opts.dry_run {
                return Ok(());
            }
        }

        let data = match &result.data {
            Some(data) if !data.is_empty() => data,
            _ => {
                if !opts.quiet {
                    writeln!(self.stdout, "OK")?;
                }
                return Ok(());
            }
        };

        if let Some(Value::String(note)) = data.get("note") {
            write!(self.stdout, "{}", note)?;
            if !note.ends_with('\n') {
                writeln!(self.stdout)?;
            }
            return Ok(());
        }
        let tags = data.get("tags").map(tag_names).unwrap_or_default();
        if !tags.is_empty() {
            for tag in tags {
                writeln!(self.stdout, "{}", tag)?;
            }
            return Ok(());
        }
        let notes = data.get("notes").map(note_lines).unwrap_or_default();
        if !notes.is_empty() {
            for note in notes {
                writeln!(self.stdout, "{}", note)?;
            }
            return Ok(());
        }

        let text = |key: &str| data.get(key).and_then(Value::as_str).filter(|s| !s.is_empty());
        match (text("title"), text("identifier")) {
            (Some(title), Some(id)) => writeln!(self.stdout, "{} ({})", title, id),
            (Some(title), None) => writeln!(self.stdout, "{}", title),
            (None, Some(id)) => writeln!(self.stdout, "{}", id),
            (None, None) => {
                for (key, value) in data {
                    writeln!(self.stdout, "{}: {}", key, value_line(value))?;
                }
                Ok(())
            }
        }
    }
}

fn value_line(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Escapes characters that would break the one-entry-per-line plain format.
pub fn escape_plain(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}

fn tag_names(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) if !s.is_empty() => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Object(tag) => tag.get("name").and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn note_lines(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) if !s.is_empty() => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_object)
            .map(|note| {
                let field = |key: &str| note.get(key).and_then(Value::as_str).filter(|s| !s.is_empty());
                match (field("title"), field("identifier")) {
                    (Some(title), Some(id)) => format!("{}\t{}", title, id),
                    (Some(title), None) => title.to_string(),
                    (None, Some(id)) => id.to_string(),
                    (None, None) => Value::Object(note.clone()).to_string(),
                }
            })
            .collect(),
        _ => Vec::new(),
    }
}
