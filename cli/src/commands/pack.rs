use anyhow::Result;
use std::process;

use platecost_core::service::{CostService, PackParseOutcome};

pub(crate) fn cmd_pack_parse(svc: &CostService, description: &str, json: bool) -> Result<()> {
    let outcome = svc.parse_pack(description);

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    match outcome {
        PackParseOutcome::Parsed {
            display,
            total_base_units,
            base_unit,
            ..
        } => {
            println!("{description} → {display} = {total_base_units:.3} {base_unit}");
        }
        PackParseOutcome::NeedsManualEntry { .. } => {
            eprintln!("No pack pattern matched '{description}' — needs manual entry");
            process::exit(2);
        }
    }
    Ok(())
}
