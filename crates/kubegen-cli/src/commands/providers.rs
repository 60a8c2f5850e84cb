//! `kubegen providers`

use serde_json::json;

use kubegen_adapters::provider_for;
use kubegen_core::domain::ProviderKind;

use crate::{
    cli::{ListFormat, ProvidersArgs},
    error::CliResult,
    output::OutputManager,
};

pub fn execute(args: ProvidersArgs, output: OutputManager) -> CliResult<()> {
    match args.format {
        ListFormat::List => {
            for kind in ProviderKind::ALL {
                output.print(kind.as_str())?;
            }
        }
        ListFormat::Table => {
            let rows = ProviderKind::ALL
                .iter()
                .map(|kind| row(*kind))
                .collect::<CliResult<Vec<_>>>()?;
            output.table(&["NAME", "DESCRIPTION", "INGRESS PATH"], &rows)?;
        }
        ListFormat::Json => {
            let providers = ProviderKind::ALL
                .iter()
                .map(|kind| {
                    let provider = provider_for(*kind)?;
                    Ok(json!({
                        "name": kind.as_str(),
                        "description": kind.display_name(),
                        "ingress_path": provider.target().ingress_http_path(),
                    }))
                })
                .collect::<CliResult<Vec<_>>>()?;
            output.json(&json!(providers))?;
        }
    }
    Ok(())
}

fn row(kind: ProviderKind) -> CliResult<Vec<String>> {
    let provider = provider_for(kind)?;
    Ok(vec![
        kind.as_str().to_string(),
        kind.display_name().to_string(),
        provider.target().ingress_http_path().to_string(),
    ])
}
