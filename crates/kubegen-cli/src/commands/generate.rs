//! `kubegen generate`: assemble the project and publish it.

use std::path::Path;

use chrono::Local;
use serde_json::json;
use tracing::{debug, info, instrument};

use kubegen_adapters::values::{load_patch_rules, load_values};
use kubegen_adapters::{DirectoryDriver, StreamDriver, YamlSerializer};
use kubegen_core::application::WrittenFile;
use kubegen_core::domain::{FileKind, LocationMap, OutputProject, ProviderKind};

use crate::{
    cli::{GenerateArgs, OutputFormat, Stack},
    config::AppConfig,
    error::{CliResult, IntoCli},
    output::OutputManager,
    pipeline::{self, Settings},
};

#[instrument(skip_all)]
pub fn execute(args: GenerateArgs, config: AppConfig, output: OutputManager) -> CliResult<()> {
    let provider: ProviderKind = args
        .provider
        .as_deref()
        .unwrap_or(&config.generate.provider)
        .parse()?;

    let parent = args.output.clone().unwrap_or(config.generate.output_dir.clone());
    let timestamp = config.generate.timestamp && !args.no_timestamp;
    let target = pipeline::target_dir(&parent, provider, timestamp.then(Local::now));
    let storage_dir = std::path::absolute(target.join("storage"))
        .with_cli_context(|| format!("Failed to resolve '{}'", target.display()))?;

    let settings = Settings {
        provider,
        stack: args.stack.unwrap_or(config.generate.stack),
        cluster_name: args.cluster_name.clone().or(config.generate.cluster_name.clone()),
        storage_dir: storage_dir.display().to_string(),
        values: args
            .values
            .iter()
            .map(|path| load_values(path))
            .collect::<Result<_, _>>()?,
        patches: args
            .patches
            .iter()
            .map(|path| load_patch_rules(path))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .flatten()
            .collect(),
        strict: args.strict || config.generate.strict,
    };
    debug!(?settings, "Generation settings resolved");

    let project = pipeline::assemble(&settings)?;

    if args.stdout {
        project.materialize(&StreamDriver::stdout(), &YamlSerializer)?;
        return Ok(());
    }

    if args.dry_run {
        return dry_run(&project, &target, provider, &output);
    }

    let driver = DirectoryDriver::new(&target);
    let written = project.materialize(&driver, &YamlSerializer)?;
    info!(target = %target.display(), files = written.len(), "Generation finished");
    report(&written, &target, provider, settings.stack, &output)
}

fn dry_run(
    project: &OutputProject,
    target: &Path,
    provider: ProviderKind,
    output: &OutputManager,
) -> CliResult<()> {
    let locations: LocationMap = project
        .files()
        .map(|(id, file)| (id, target.join(file.name()).display().to_string().into()))
        .collect();
    let rendered = project.render_with(&locations, &YamlSerializer)?;

    if output.format() == OutputFormat::Json {
        let files: Vec<_> = rendered
            .iter()
            .map(|(id, text)| json!({ "location": locations[id].as_str(), "size": text.len() }))
            .collect();
        output.json(&json!({ "provider": provider, "dry_run": true, "files": files }))?;
        return Ok(());
    }

    output.header(&format!("Dry run: {} would be written to {}", provider, target.display()))?;
    let rows: Vec<Vec<String>> = rendered
        .iter()
        .map(|(id, text)| vec![locations[id].to_string(), format!("{} bytes", text.len())])
        .collect();
    output.table(&["FILE", "SIZE"], &rows)?;
    Ok(())
}

fn report(
    written: &[WrittenFile],
    target: &Path,
    provider: ProviderKind,
    stack: Stack,
    output: &OutputManager,
) -> CliResult<()> {
    if output.format() == OutputFormat::Json {
        let files: Vec<_> = written
            .iter()
            .map(|w| {
                json!({
                    "name": w.name,
                    "kind": w.kind,
                    "location": w.location.as_str(),
                    "size": w.size,
                })
            })
            .collect();
        output.json(&json!({
            "provider": provider,
            "stack": stack,
            "target": target.display().to_string(),
            "files": files,
        }))?;
        return Ok(());
    }

    output.success(&format!(
        "Generated {} files for {} ({} stack) in {}",
        written.len(),
        provider.display_name(),
        stack,
        target.display()
    ))?;
    for file in written {
        output.print(&format!("  {}", file.name))?;
    }
    if let Some(script) = written.iter().rfind(|w| w.kind == FileKind::Script) {
        output.info(&format!("Apply with: bash {}", script.location))?;
    }
    Ok(())
}
