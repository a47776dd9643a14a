//! List command implementation
//!
//! Show the declared hooks in declaration order.

use clap::Args;
use lintel_config::{ConfigRegistry, HookDefinition};
use owo_colors::OwoColorize;
use serde::Serialize;
use std::fmt::Write as _;

use super::OutputFormat;
use crate::command::Command;
use crate::common::RuntimeContext;
use crate::error::Result;

/// List configured hooks
#[derive(Debug, Default, Args)]
pub struct ListCommand {
    /// Output format
    #[arg(long, value_enum, default_value_t)]
    pub format: OutputFormat,
}

#[derive(Debug, Serialize)]
struct HookEntry<'a> {
    id: &'a str,
    name: &'a str,
    language: &'static str,
    repo: &'a str,
    serial: bool,
    always_run: bool,
    pass_filenames: bool,
    files: Option<&'a str>,
    exclude: Option<&'a str>,
    types: Vec<&'a str>,
    additional_dependencies: &'a [String],
    timeout_secs: Option<u64>,
}

impl<'a> From<&'a HookDefinition> for HookEntry<'a> {
    fn from(hook: &'a HookDefinition) -> Self {
        Self {
            id: &hook.id,
            name: &hook.name,
            language: hook.language.name(),
            repo: &hook.source.repo,
            serial: hook.require_serial,
            always_run: hook.always_run,
            pass_filenames: hook.pass_filenames,
            files: hook.filter.files_pattern().map(|r| r.as_str()),
            exclude: hook.filter.exclude_pattern().map(|r| r.as_str()),
            types: hook.types.iter().map(String::as_str).collect(),
            additional_dependencies: &hook.additional_dependencies,
            timeout_secs: hook.timeout.map(|t| t.as_secs()),
        }
    }
}

fn render_text(registry: &ConfigRegistry) -> String {
    let mut out = String::new();
    if registry.is_empty() {
        let _ = writeln!(out, "{}", "No hooks configured.".yellow());
        return out;
    }

    let _ = writeln!(out, "{} ({} hooks)", "Hooks:".bold(), registry.len());
    let mut repo = None;
    for hook in registry.hooks() {
        if repo != Some(hook.source.repo.as_str()) {
            repo = Some(hook.source.repo.as_str());
            let rev = hook
                .source
                .rev
                .as_deref()
                .map(|r| format!(" @ {r}"))
                .unwrap_or_default();
            let _ = writeln!(out, "\n{}{}", hook.source.repo.cyan(), rev.dimmed());
        }

        let mut flags = Vec::new();
        if hook.require_serial {
            flags.push("serial");
        }
        if hook.always_run {
            flags.push("always_run");
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(", "))
        };

        let _ = write!(out, "  • {} ({})", hook.id.green(), hook.language.name());
        if hook.name != hook.id {
            let _ = write!(out, " {}", hook.name.dimmed());
        }
        let _ = writeln!(out, "{}", flags.yellow());
    }
    out
}

impl Command for ListCommand {
    type Output = ();

    fn execute(&self, context: &RuntimeContext) -> Result<()> {
        let registry = context.load_registry()?;

        match self.format {
            OutputFormat::Json => {
                let hooks: Vec<HookEntry<'_>> =
                    registry.hooks().iter().map(|h| HookEntry::from(h.as_ref())).collect();
                println!("{}", serde_json::to_string_pretty(&hooks)?);
            }
            OutputFormat::Text => print!("{}", render_text(&registry)),
        }
        Ok(())
    }
}
